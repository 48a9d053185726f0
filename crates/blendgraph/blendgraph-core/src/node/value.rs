//! Value sources: graph parameters and constants.

use serde::{Deserialize, Serialize};

use super::{port, PortKind, PortSpec};
use crate::attribute::Attribute;
use crate::evaluation::Evaluation;
use crate::ids::{NodeIndex, ParameterIndex};

pub(crate) const VECTOR_OUT: [PortSpec; 1] = [port("Value", PortKind::Vector)];
pub(crate) const ROTATION_OUT: [PortSpec; 1] = [port("Value", PortKind::Rotation)];

/// Exposes one graph parameter on the node's output port.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterNodeDef {
    pub parameter: String,
    /// Resolved when the graph is built.
    #[serde(skip)]
    pub index: Option<ParameterIndex>,
}

impl ParameterNodeDef {
    pub fn new(parameter: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            index: None,
        }
    }
}

pub(crate) fn update_parameter(ev: &mut Evaluation<'_>, node: NodeIndex, def: &ParameterNodeDef) {
    let value = def
        .index
        .and_then(|i| ev.state.params.get(i.index()).cloned());
    match value {
        Some(v) => {
            ev.set_output_value(node, 0, v);
            ev.set_has_error(node, false);
        }
        None => {
            ev.set_output_value(node, 0, Attribute::Float(0.0));
            ev.set_has_error(node, true);
        }
    }
}

pub(crate) fn update_constant(ev: &mut Evaluation<'_>, node: NodeIndex, value: f32) {
    ev.set_output_value(node, 0, Attribute::Float(value));
}
