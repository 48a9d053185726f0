//! Shared, immutable graph definitions.

mod builder;
pub mod document;
mod topo;

pub use builder::GraphBuilder;
pub use document::GraphDocument;

use hashbrown::HashMap;

use crate::attribute::Attribute;
use crate::error::GraphError;
use crate::ids::{NodeIndex, ParameterIndex, PortIndex};
use crate::node::{NodeKind, PortKind, PortSpec};
use crate::parameter::ValueParameter;
use crate::Result;

/// Directed edge feeding one input port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub source: NodeIndex,
    pub source_port: PortIndex,
}

#[derive(Clone, Debug)]
pub struct NodeDef {
    pub name: String,
    pub kind: NodeKind,
    /// Owning composite (state machine or blend tree).
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    pub inputs: &'static [PortSpec],
    pub outputs: &'static [PortSpec],
    /// One slot per input port.
    pub connections: Vec<Option<Connection>>,
    /// Authored disabled flag; instances start from it.
    pub disabled: bool,
    output_offset: usize,
}

impl NodeDef {
    #[inline]
    pub fn input(&self, port: PortIndex) -> Option<Connection> {
        self.connections.get(port).copied().flatten()
    }
}

/// A validated node network. Shared between instances through `Arc`.
#[derive(Clone, Debug)]
pub struct Graph {
    name: String,
    nodes: Vec<NodeDef>,
    root: NodeIndex,
    parameters: Vec<ValueParameter>,
    node_lookup: HashMap<String, NodeIndex>,
    parameter_lookup: HashMap<String, ParameterIndex>,
    num_internal_attributes: usize,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Panics on an index from another graph.
    #[inline]
    pub fn node(&self, index: NodeIndex) -> &NodeDef {
        &self.nodes[index.index()]
    }

    pub fn get_node(&self, index: NodeIndex) -> Option<&NodeDef> {
        self.nodes.get(index.index())
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &NodeDef)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeIndex(i as u32), n))
    }

    pub fn find_node(&self, name: &str) -> Option<NodeIndex> {
        self.node_lookup.get(name).copied()
    }

    pub fn require_node(&self, name: &str) -> Result<NodeIndex> {
        self.find_node(name).ok_or_else(|| GraphError::NodeNotFound {
            name: name.to_string(),
        })
    }

    pub fn node_name(&self, index: NodeIndex) -> &str {
        self.get_node(index).map_or("", |n| n.name.as_str())
    }

    pub fn parameters(&self) -> &[ValueParameter] {
        &self.parameters
    }

    pub fn parameter(&self, index: ParameterIndex) -> Option<&ValueParameter> {
        self.parameters.get(index.index())
    }

    pub fn find_parameter_index(&self, name: &str) -> Result<ParameterIndex> {
        self.parameter_lookup
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::ParameterNotFound {
                name: name.to_string(),
            })
    }

    pub fn find_parameter(&self, name: &str) -> Result<&ValueParameter> {
        let index = self.find_parameter_index(name)?;
        Ok(&self.parameters[index.index()])
    }

    /// Parent of `node` if that parent is a state machine.
    pub fn parent_state_machine(&self, node: NodeIndex) -> Option<NodeIndex> {
        let parent = self.get_node(node)?.parent?;
        self.node(parent).kind.caps().is_state_machine.then_some(parent)
    }

    /// Connected source of `node`'s input `port`.
    #[inline]
    pub fn input_node(&self, node: NodeIndex, port: PortIndex) -> Option<NodeIndex> {
        self.node(node).input(port).map(|c| c.source)
    }

    /// Slot in the instance's internal attribute store for an output port.
    #[inline]
    pub fn output_attribute_index(&self, node: NodeIndex, port: PortIndex) -> usize {
        self.node(node).output_offset + port
    }

    pub fn num_internal_attributes(&self) -> usize {
        self.num_internal_attributes
    }

    /// Initial values for every output port, in store order.
    pub fn internal_attribute_defaults(&self) -> Vec<Attribute> {
        let mut values = Vec::with_capacity(self.num_internal_attributes);
        for node in &self.nodes {
            for port in node.outputs {
                values.push(match port.kind {
                    PortKind::Number => Attribute::Float(0.0),
                    PortKind::Pose => Attribute::Pose(None),
                    PortKind::MotionInstance => Attribute::MotionInstance(None),
                    PortKind::Vector => Attribute::Vector3([0.0; 3]),
                    PortKind::Rotation => Attribute::Rotation(crate::math::QUAT_IDENTITY),
                });
            }
        }
        values
    }
}
