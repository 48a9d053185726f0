//! Node kinds, their ports and the per-pass dispatch.
//!
//! Node behaviour is a closed set: each pass matches on [`NodeKind`] once and calls the
//! kind's module. Generic concerns (once-per-frame guards, disabled nodes) live in
//! [`crate::evaluation::Evaluation`].

pub mod blend;
pub mod motion;
pub mod pose_switch;
pub mod set_transform;
pub mod state_machine;
pub mod value;

use serde::{Deserialize, Serialize};

use crate::evaluation::{Evaluation, InstanceState};
use crate::graph::Graph;
use crate::ids::NodeIndex;
use crate::parameter::{ParameterKind, ValueParameter};

pub use blend::{BlendNDef, BlendTwoDef, SyncMode, MAX_BLEND_POSES};
pub use motion::MotionNodeDef;
pub use set_transform::SetTransformDef;
pub use state_machine::{CompareOp, StateMachineDef, Transition, TransitionCondition};
pub use value::ParameterNodeDef;

/// Data carried by a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Number,
    Pose,
    MotionInstance,
    Vector,
    Rotation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortSpec {
    pub name: &'static str,
    pub kind: PortKind,
}

const fn port(name: &'static str, kind: PortKind) -> PortSpec {
    PortSpec { name, kind }
}

const POSE_OUT: [PortSpec; 1] = [port("Pose", PortKind::Pose)];
const VALUE_OUT: [PortSpec; 1] = [port("Value", PortKind::Number)];

/// Capability set of a node kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeCaps {
    pub has_output_pose: bool,
    pub supports_disable: bool,
    pub supports_visualization: bool,
    pub is_state_machine: bool,
}

impl NodeCaps {
    const POSE: NodeCaps = NodeCaps {
        has_output_pose: true,
        supports_disable: true,
        supports_visualization: true,
        is_state_machine: false,
    };
    const VALUE: NodeCaps = NodeCaps {
        has_output_pose: false,
        supports_disable: false,
        supports_visualization: false,
        is_state_machine: false,
    };
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Motion(MotionNodeDef),
    StateMachine(StateMachineDef),
    /// Composite holding a sub-network; outputs whatever reaches its final pose port.
    BlendTree,
    BlendTwo(BlendTwoDef),
    BlendN(BlendNDef),
    PoseSwitch,
    SetTransform(SetTransformDef),
    Parameter(ParameterNodeDef),
    FloatConstant(f32),
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Motion(_) => "motion",
            NodeKind::StateMachine(_) => "state_machine",
            NodeKind::BlendTree => "blend_tree",
            NodeKind::BlendTwo(_) => "blend_two",
            NodeKind::BlendN(_) => "blend_n",
            NodeKind::PoseSwitch => "pose_switch",
            NodeKind::SetTransform(_) => "set_transform",
            NodeKind::Parameter(_) => "parameter",
            NodeKind::FloatConstant(_) => "float_constant",
        }
    }

    pub fn caps(&self) -> NodeCaps {
        match self {
            NodeKind::StateMachine(_) => NodeCaps {
                supports_disable: false,
                is_state_machine: true,
                ..NodeCaps::POSE
            },
            NodeKind::BlendTree => NodeCaps {
                supports_disable: false,
                ..NodeCaps::POSE
            },
            NodeKind::Parameter(_) | NodeKind::FloatConstant(_) => NodeCaps::VALUE,
            _ => NodeCaps::POSE,
        }
    }

    pub fn input_ports(&self) -> &'static [PortSpec] {
        match self {
            NodeKind::Motion(_) => &motion::INPUTS,
            NodeKind::StateMachine(_) => &[],
            NodeKind::BlendTree => &blend::TREE_INPUTS,
            NodeKind::BlendTwo(_) => &blend::BLEND_TWO_INPUTS,
            NodeKind::BlendN(_) => &blend::BLEND_N_INPUTS,
            NodeKind::PoseSwitch => &pose_switch::INPUTS,
            NodeKind::SetTransform(_) => &set_transform::INPUTS,
            NodeKind::Parameter(_) | NodeKind::FloatConstant(_) => &[],
        }
    }

    /// Output ports. A parameter node's port type follows its parameter.
    pub fn output_ports(&self, parameters: &[ValueParameter]) -> &'static [PortSpec] {
        match self {
            NodeKind::Motion(_) => &motion::OUTPUTS,
            NodeKind::Parameter(def) => {
                match def.index.and_then(|i| parameters.get(i.index())).map(|p| &p.kind) {
                    Some(ParameterKind::Vector2 { .. })
                    | Some(ParameterKind::Vector3 { .. })
                    | Some(ParameterKind::Vector4 { .. }) => &value::VECTOR_OUT,
                    Some(ParameterKind::Rotation { .. }) => &value::ROTATION_OUT,
                    _ => &VALUE_OUT,
                }
            }
            NodeKind::FloatConstant(_) => &VALUE_OUT,
            _ => &POSE_OUT,
        }
    }
}

/// Pose output port shared by every pose-producing kind.
pub const POSE_OUTPUT_PORT: usize = 0;

pub(crate) fn update(ev: &mut Evaluation<'_>, node: NodeIndex, dt: f32) {
    let graph = ev.graph;
    match &graph.node(node).kind {
        NodeKind::Motion(def) => motion::update(ev, node, def, dt),
        NodeKind::StateMachine(def) => state_machine::update(ev, node, def, dt),
        NodeKind::BlendTree => blend::update_pass_through(ev, node, blend::TREE_POSE_PORT, dt),
        NodeKind::BlendTwo(def) => blend::update_two(ev, node, def, dt),
        NodeKind::BlendN(def) => blend::update_n(ev, node, def, dt),
        NodeKind::PoseSwitch => pose_switch::update(ev, node, dt),
        NodeKind::SetTransform(_) => set_transform::update(ev, node, dt),
        NodeKind::Parameter(def) => value::update_parameter(ev, node, def),
        NodeKind::FloatConstant(v) => value::update_constant(ev, node, *v),
    }
}

pub(crate) fn top_down_update(ev: &mut Evaluation<'_>, node: NodeIndex, dt: f32) {
    let graph = ev.graph;
    match &graph.node(node).kind {
        NodeKind::Motion(def) => motion::top_down_update(ev, node, def),
        NodeKind::StateMachine(_) => state_machine::top_down_update(ev, node, dt),
        NodeKind::BlendTwo(BlendTwoDef { sync, .. }) | NodeKind::BlendN(BlendNDef { sync, .. }) => {
            blend::top_down_update(ev, node, *sync, dt)
        }
        NodeKind::BlendTree | NodeKind::PoseSwitch | NodeKind::SetTransform(_) => {
            blend::top_down_update(ev, node, SyncMode::None, dt)
        }
        NodeKind::Parameter(_) | NodeKind::FloatConstant(_) => {}
    }
}

pub(crate) fn post_update(ev: &mut Evaluation<'_>, node: NodeIndex, dt: f32) {
    let graph = ev.graph;
    match &graph.node(node).kind {
        NodeKind::Motion(def) => motion::post_update(ev, node, def),
        NodeKind::StateMachine(_) => state_machine::post_update(ev, node, dt),
        NodeKind::BlendTree
        | NodeKind::BlendTwo(_)
        | NodeKind::BlendN(_)
        | NodeKind::PoseSwitch
        | NodeKind::SetTransform(_) => blend::post_update(ev, node, dt),
        NodeKind::Parameter(_) | NodeKind::FloatConstant(_) => {}
    }
}

pub(crate) fn output(ev: &mut Evaluation<'_>, node: NodeIndex) {
    let graph = ev.graph;
    match &graph.node(node).kind {
        NodeKind::Motion(def) => motion::output(ev, node, def),
        NodeKind::StateMachine(_) => state_machine::output(ev, node),
        NodeKind::BlendTree | NodeKind::BlendTwo(_) | NodeKind::BlendN(_) | NodeKind::PoseSwitch => {
            blend::output(ev, node);
        }
        NodeKind::SetTransform(def) => set_transform::output(ev, node, def),
        NodeKind::Parameter(_) | NodeKind::FloatConstant(_) => {}
    }
}

/// Reset playback state of `node` (not its inputs).
pub(crate) fn rewind(graph: &Graph, state: &mut InstanceState, node: NodeIndex) {
    match &graph.node(node).kind {
        NodeKind::Motion(def) => motion::rewind(graph, state, node, def),
        NodeKind::StateMachine(_) => state_machine::rewind(graph, state, node),
        _ => {}
    }
}
