//! Timed motion events, per-node transient data and listener notifications.

use serde::{Deserialize, Serialize};

use crate::ids::NodeIndex;
use crate::math::Transform;

/// Where in a ranged event the playhead crossed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPhase {
    /// Zero-length event.
    Tick,
    Start,
    End,
}

/// One event emitted during an update.
#[derive(Clone, Debug, PartialEq)]
pub struct EventInfo {
    /// Motion-local time of the crossed marker.
    pub time: f32,
    pub event_type: String,
    pub parameters: String,
    pub phase: EventPhase,
    /// Node that emitted the event.
    pub emitter: NodeIndex,
    pub global_weight: f32,
    pub local_weight: f32,
}

/// Ordered collection of events gathered during one update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventBuffer {
    events: Vec<EventInfo>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, event: EventInfo) {
        self.events.push(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventInfo> {
        self.events.iter()
    }

    pub fn extend_from(&mut self, other: &EventBuffer) {
        self.events.extend_from_slice(&other.events);
    }

    /// Scale every event's local weight, used when merging a blended input.
    pub fn scale_local_weights(&mut self, from: usize, factor: f32) {
        for e in self.events.iter_mut().skip(from) {
            e.local_weight *= factor;
        }
    }

    /// Refresh global weights from the emitting nodes.
    pub fn update_weights(&mut self, mut global_weight_of: impl FnMut(NodeIndex) -> f32) {
        for e in &mut self.events {
            e.global_weight = global_weight_of(e.emitter);
        }
    }
}

impl<'a> IntoIterator for &'a EventBuffer {
    type Item = &'a EventInfo;
    type IntoIter = std::slice::Iter<'a, EventInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Per-node, per-frame transient data produced in the post-update pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RefCountedData {
    pub events: EventBuffer,
    pub trajectory_delta: Transform,
    pub trajectory_delta_mirrored: Transform,
}

impl RefCountedData {
    pub fn zero_trajectory_delta(&mut self) {
        self.trajectory_delta = Transform::IDENTITY;
        self.trajectory_delta_mirrored = Transform::IDENTITY;
    }

    /// Clear events and zero the deltas.
    pub fn reset(&mut self) {
        self.events.clear();
        self.zero_trajectory_delta();
    }
}

/// State machine notification queued during evaluation and delivered after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateNotification {
    /// A blend into `state` has begun.
    Entering { machine: NodeIndex, state: NodeIndex },
    /// `state` became the current state.
    Enter { machine: NodeIndex, state: NodeIndex },
    /// `state` is being left.
    Exit { machine: NodeIndex, state: NodeIndex },
    /// `state` was fully blended out.
    End { machine: NodeIndex, state: NodeIndex },
    StartTransition {
        machine: NodeIndex,
        source: Option<NodeIndex>,
        target: NodeIndex,
    },
    EndTransition {
        machine: NodeIndex,
        source: Option<NodeIndex>,
        target: NodeIndex,
    },
}

/// Listener registered on a graph instance. All methods default to no-ops.
///
/// Node arguments are node names.
pub trait GraphEventHandler: Send {
    fn on_event(&mut self, _event: &EventInfo) {}

    fn on_state_enter(&mut self, _machine: &str, _state: &str) {}

    fn on_state_entering(&mut self, _machine: &str, _state: &str) {}

    fn on_state_exit(&mut self, _machine: &str, _state: &str) {}

    fn on_state_end(&mut self, _machine: &str, _state: &str) {}

    fn on_start_transition(&mut self, _machine: &str, _source: Option<&str>, _target: &str) {}

    fn on_end_transition(&mut self, _machine: &str, _source: Option<&str>, _target: &str) {}
}

/// Id returned when registering a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u32);
