//! Per-node, per-instance mutable state.

use crate::ids::NodeIndex;
use crate::motion_instance::MotionInstance;
use crate::node::NodeKind;
use crate::pool::RefDataHandle;

/// Play position reported upward by every pose node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timing {
    /// Time before this frame's update (the pre-sync time).
    pub previous_time: f32,
    pub current_time: f32,
    pub duration: f32,
    pub play_speed: f32,
    /// Loop points crossed by this frame's advance.
    pub wraps: u32,
    pub has_looped: bool,
    pub has_ended: bool,
}

impl Timing {
    pub fn clear(&mut self) {
        *self = Timing::default();
    }

    pub fn normalized(&self) -> f32 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

pub(crate) struct MotionState {
    pub instance: Option<MotionInstance>,
    pub active_index: Option<usize>,
    /// Recreate the playback instance before the next update.
    pub reload: bool,
    /// Unresolved clip already reported since the last reload.
    pub warned: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct MachineState {
    pub current: Option<NodeIndex>,
    pub target: Option<NodeIndex>,
    /// Index into the machine's authored transitions while blending.
    pub transition: Option<usize>,
    pub elapsed: f32,
    /// Weight of the last or current transition.
    pub weight: f32,
    /// Set by `stop`; an idle machine does not auto-enter its entry state.
    pub stopped: bool,
}

impl MachineState {
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        self.target.is_some()
    }
}

/// Inputs chosen during update and reused by the later passes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct BlendState {
    pub a: Option<NodeIndex>,
    pub b: Option<NodeIndex>,
    /// Weight of `b` against `a`.
    pub weight: f32,
}

pub(crate) enum NodeState {
    None,
    Motion(MotionState),
    StateMachine(MachineState),
    Blend(BlendState),
}

pub(crate) struct UniqueData {
    pub pose_refs: u32,
    /// Pose refs collected during update, restored before every output pass.
    pub pose_ref_budget: u32,
    pub ref_data_refs: u32,
    pub ref_data: Option<RefDataHandle>,
    pub global_weight: f32,
    pub local_weight: f32,
    pub timing: Timing,
    pub state: NodeState,
}

impl UniqueData {
    pub fn new(kind: &NodeKind) -> Self {
        let state = match kind {
            NodeKind::Motion(_) => NodeState::Motion(MotionState {
                instance: None,
                active_index: None,
                reload: true,
                warned: false,
            }),
            NodeKind::StateMachine(_) => NodeState::StateMachine(MachineState::default()),
            NodeKind::BlendTree
            | NodeKind::BlendTwo(_)
            | NodeKind::BlendN(_)
            | NodeKind::PoseSwitch
            | NodeKind::SetTransform(_) => NodeState::Blend(BlendState::default()),
            NodeKind::Parameter(_) | NodeKind::FloatConstant(_) => NodeState::None,
        };
        Self {
            pose_refs: 0,
            pose_ref_budget: 0,
            ref_data_refs: 0,
            ref_data: None,
            global_weight: 0.0,
            local_weight: 0.0,
            timing: Timing::default(),
            state,
        }
    }

    pub fn motion(&mut self) -> Option<&mut MotionState> {
        match &mut self.state {
            NodeState::Motion(m) => Some(m),
            _ => None,
        }
    }

    pub fn machine(&self) -> Option<&MachineState> {
        match &self.state {
            NodeState::StateMachine(m) => Some(m),
            _ => None,
        }
    }

    pub fn machine_mut(&mut self) -> Option<&mut MachineState> {
        match &mut self.state {
            NodeState::StateMachine(m) => Some(m),
            _ => None,
        }
    }

    pub fn blend(&self) -> BlendState {
        match &self.state {
            NodeState::Blend(b) => *b,
            _ => BlendState::default(),
        }
    }

    pub fn set_blend(&mut self, blend: BlendState) {
        if let NodeState::Blend(b) = &mut self.state {
            *b = blend;
        }
    }

    /// Clear per-frame counters at the start of an update.
    pub fn reset_frame(&mut self) {
        self.pose_refs = 0;
        self.pose_ref_budget = 0;
        self.ref_data_refs = 0;
        self.global_weight = 0.0;
        self.local_weight = 0.0;
    }
}
