//! Incremental construction and validation of a [`Graph`].

use hashbrown::HashMap;

use super::topo::topo_order;
use super::{Connection, Graph, NodeDef};
use crate::error::GraphError;
use crate::ids::{NodeIndex, ParameterIndex, PortIndex};
use crate::node::{NodeKind, PortKind, Transition, TransitionCondition};
use crate::parameter::ValueParameter;
use crate::Result;

#[derive(Debug)]
struct PendingNode {
    name: String,
    kind: NodeKind,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
    connections: Vec<Option<Connection>>,
    disabled: bool,
}

/// Collects nodes, parameters and connections, then validates them into a [`Graph`].
#[derive(Debug)]
pub struct GraphBuilder {
    name: String,
    nodes: Vec<PendingNode>,
    parameters: Vec<ValueParameter>,
    node_lookup: HashMap<String, NodeIndex>,
    parameter_lookup: HashMap<String, ParameterIndex>,
    root: Option<NodeIndex>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            parameters: Vec::new(),
            node_lookup: HashMap::new(),
            parameter_lookup: HashMap::new(),
            root: None,
        }
    }

    pub fn add_parameter(&mut self, parameter: ValueParameter) -> Result<ParameterIndex> {
        if self.parameter_lookup.contains_key(&parameter.name) {
            return Err(GraphError::DuplicateParameter {
                name: parameter.name,
            });
        }
        let index = ParameterIndex(self.parameters.len() as u32);
        self.parameter_lookup.insert(parameter.name.clone(), index);
        self.parameters.push(parameter);
        Ok(index)
    }

    /// Add a top-level node.
    pub fn add_node(&mut self, name: impl Into<String>, kind: NodeKind) -> Result<NodeIndex> {
        let name = name.into();
        if self.node_lookup.contains_key(&name) {
            return Err(GraphError::DuplicateNode { name });
        }
        let index = NodeIndex(self.nodes.len() as u32);
        let num_inputs = kind.input_ports().len();
        self.node_lookup.insert(name.clone(), index);
        self.nodes.push(PendingNode {
            name,
            kind,
            parent: None,
            children: Vec::new(),
            connections: vec![None; num_inputs],
            disabled: false,
        });
        Ok(index)
    }

    /// Add a node inside a state machine (as a state) or a blend tree.
    pub fn add_child(
        &mut self,
        parent: NodeIndex,
        name: impl Into<String>,
        kind: NodeKind,
    ) -> Result<NodeIndex> {
        let parent_node = self.pending(parent)?;
        if !matches!(parent_node.kind, NodeKind::StateMachine(_) | NodeKind::BlendTree) {
            return Err(GraphError::InvalidNode {
                name: parent_node.name.clone(),
                reason: "only state machines and blend trees hold child nodes".into(),
            });
        }
        let child = self.add_node(name, kind)?;
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
        Ok(child)
    }

    /// Feed `source`'s output `source_port` into `target`'s input `target_port`.
    pub fn connect(
        &mut self,
        source: NodeIndex,
        source_port: PortIndex,
        target: NodeIndex,
        target_port: PortIndex,
    ) -> Result<()> {
        self.pending(source)?;
        let node = self.pending_mut(target)?;
        let invalid = |reason: &str| GraphError::InvalidConnection {
            target: node.name.clone(),
            port: target_port,
            reason: reason.to_string(),
        };
        let slot = match node.connections.get(target_port) {
            None => return Err(invalid("unknown input port")),
            Some(Some(_)) => return Err(invalid("input already connected")),
            Some(None) => target_port,
        };
        if source == target {
            return Err(invalid("node cannot feed itself"));
        }
        node.connections[slot] = Some(Connection {
            source,
            source_port,
        });
        Ok(())
    }

    pub fn set_entry_state(&mut self, machine: NodeIndex, state: NodeIndex) -> Result<()> {
        self.require_state(machine, state)?;
        if let NodeKind::StateMachine(def) = &mut self.nodes[machine.index()].kind {
            def.entry_state = Some(state);
        }
        Ok(())
    }

    /// Author a transition. `source: None` allows it from any state of the machine.
    pub fn add_transition(
        &mut self,
        machine: NodeIndex,
        source: Option<NodeIndex>,
        target: NodeIndex,
        blend_time: f32,
        conditions: Vec<TransitionCondition>,
    ) -> Result<()> {
        if let Some(source) = source {
            self.require_state(machine, source)?;
        }
        self.require_state(machine, target)?;
        if let NodeKind::StateMachine(def) = &mut self.nodes[machine.index()].kind {
            def.transitions.push(Transition {
                source,
                target,
                blend_time: blend_time.max(0.0),
                conditions,
            });
        }
        Ok(())
    }

    pub fn set_root(&mut self, root: NodeIndex) {
        self.root = Some(root);
    }

    pub fn set_disabled(&mut self, node: NodeIndex, disabled: bool) -> Result<()> {
        self.pending_mut(node)?.disabled = disabled;
        Ok(())
    }

    pub fn find_node(&self, name: &str) -> Option<NodeIndex> {
        self.node_lookup.get(name).copied()
    }

    fn pending(&self, index: NodeIndex) -> Result<&PendingNode> {
        self.nodes
            .get(index.index())
            .ok_or_else(|| GraphError::NodeNotFound {
                name: format!("#{}", index.0),
            })
    }

    fn pending_mut(&mut self, index: NodeIndex) -> Result<&mut PendingNode> {
        self.nodes
            .get_mut(index.index())
            .ok_or_else(|| GraphError::NodeNotFound {
                name: format!("#{}", index.0),
            })
    }

    fn require_state(&self, machine: NodeIndex, state: NodeIndex) -> Result<()> {
        let machine_node = self.pending(machine)?;
        if !matches!(machine_node.kind, NodeKind::StateMachine(_)) {
            return Err(GraphError::InvalidNode {
                name: machine_node.name.clone(),
                reason: "not a state machine".into(),
            });
        }
        let state_node = self.pending(state)?;
        if state_node.parent != Some(machine) {
            return Err(GraphError::NotAState {
                name: state_node.name.clone(),
            });
        }
        Ok(())
    }

    /// Resolve names, check port types and acyclicity, and lay out internal attributes.
    pub fn build(self) -> Result<Graph> {
        let GraphBuilder {
            name,
            nodes: pending,
            parameters,
            node_lookup,
            parameter_lookup,
            root,
        } = self;

        let mut nodes = Vec::with_capacity(pending.len());
        let mut offset = 0;
        for p in pending {
            let mut kind = p.kind;
            resolve_parameters(&p.name, &mut kind, &parameter_lookup);
            let outputs = kind.output_ports(&parameters);
            nodes.push(NodeDef {
                name: p.name,
                inputs: kind.input_ports(),
                outputs,
                kind,
                parent: p.parent,
                children: p.children,
                connections: p.connections,
                disabled: p.disabled,
                output_offset: offset,
            });
            offset += outputs.len();
        }

        let mut edges = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            for (port, conn) in node.connections.iter().enumerate() {
                let Some(conn) = conn else { continue };
                let source = &nodes[conn.source.index()];
                let invalid = |reason: String| GraphError::InvalidConnection {
                    target: node.name.clone(),
                    port,
                    reason,
                };
                let Some(out) = source.outputs.get(conn.source_port) else {
                    return Err(invalid(format!(
                        "'{}' has no output port {}",
                        source.name, conn.source_port
                    )));
                };
                let expected = node.inputs[port].kind;
                if !port_accepts(expected, out.kind) {
                    return Err(invalid(format!(
                        "expected {:?}, '{}' provides {:?}",
                        expected, source.name, out.kind
                    )));
                }
                edges.push((conn.source, NodeIndex(i as u32)));
            }
        }
        topo_order(nodes.len(), &edges)?;

        for node in &nodes {
            if let Some(parent) = node.parent {
                let is_state = nodes[parent.index()].kind.caps().is_state_machine;
                if is_state && !node.kind.caps().has_output_pose {
                    return Err(GraphError::InvalidNode {
                        name: node.name.clone(),
                        reason: "states must output a pose".into(),
                    });
                }
            }
        }

        let root = match root {
            Some(r) if r.index() < nodes.len() => r,
            Some(_) => return Err(GraphError::MissingRoot),
            None => nodes
                .iter()
                .position(|n| n.parent.is_none() && n.kind.caps().has_output_pose)
                .map(|i| NodeIndex(i as u32))
                .ok_or(GraphError::MissingRoot)?,
        };
        let root_node = &nodes[root.index()];
        if !root_node.kind.caps().has_output_pose {
            return Err(GraphError::InvalidNode {
                name: root_node.name.clone(),
                reason: "root must output a pose".into(),
            });
        }

        log::debug!(
            "graph '{}' built: {} nodes, {} parameters, {} internal attributes",
            name,
            nodes.len(),
            parameters.len(),
            offset
        );
        Ok(Graph {
            name,
            nodes,
            root,
            parameters,
            node_lookup,
            parameter_lookup,
            num_internal_attributes: offset,
        })
    }
}

fn port_accepts(input: PortKind, output: PortKind) -> bool {
    input == output
}

fn resolve_parameters(
    node_name: &str,
    kind: &mut NodeKind,
    lookup: &HashMap<String, ParameterIndex>,
) {
    match kind {
        NodeKind::Parameter(def) => {
            def.index = lookup.get(&def.parameter).copied();
            if def.index.is_none() {
                log::warn!("{node_name}: unknown parameter '{}'", def.parameter);
            }
        }
        NodeKind::StateMachine(def) => {
            for condition in def.transitions.iter_mut().flat_map(|t| t.conditions.iter_mut()) {
                if let TransitionCondition::Parameter {
                    parameter, index, ..
                } = condition
                {
                    *index = lookup.get(parameter.as_str()).copied();
                    if index.is_none() {
                        log::warn!("{node_name}: transition condition on unknown parameter '{parameter}'");
                    }
                }
            }
        }
        _ => {}
    }
}
