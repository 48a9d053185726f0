//! Passes through one of up to ten poses, chosen by a decision value.

use super::{port, PortKind, PortSpec, MAX_BLEND_POSES};
use crate::evaluation::{rewind_subtree, Evaluation};
use crate::ids::NodeIndex;
use crate::unique_data::BlendState;

pub const DECISION_PORT: usize = MAX_BLEND_POSES;

pub(crate) const INPUTS: [PortSpec; MAX_BLEND_POSES + 1] = [
    port("Pose 0", PortKind::Pose),
    port("Pose 1", PortKind::Pose),
    port("Pose 2", PortKind::Pose),
    port("Pose 3", PortKind::Pose),
    port("Pose 4", PortKind::Pose),
    port("Pose 5", PortKind::Pose),
    port("Pose 6", PortKind::Pose),
    port("Pose 7", PortKind::Pose),
    port("Pose 8", PortKind::Pose),
    port("Pose 9", PortKind::Pose),
    port("Decision", PortKind::Number),
];

/// Decision value to pose port; out-of-range values clamp to `0..=9`.
pub fn decision_port(value: f32) -> usize {
    if value.is_nan() {
        return 0;
    }
    (value as i64).clamp(0, MAX_BLEND_POSES as i64 - 1) as usize
}

pub(crate) fn update(ev: &mut Evaluation<'_>, node: NodeIndex, dt: f32) {
    let selected = ev
        .input_float(node, DECISION_PORT, dt)
        .and_then(|v| ev.input_node(node, decision_port(v)));

    let previous = ev.unique(node).blend().a;
    if let Some(source) = selected {
        if previous.is_some() && previous != selected {
            log::trace!(
                "{}: switched to '{}'",
                ev.graph.node_name(node),
                ev.graph.node_name(source)
            );
            rewind_subtree(ev.graph, ev.state, source);
        }
        ev.update_incoming(source, dt);
    }

    let timing = selected.map(|s| ev.unique(s).timing).unwrap_or_default();
    let u = ev.unique(node);
    u.timing = timing;
    u.set_blend(BlendState {
        a: selected,
        b: None,
        weight: 0.0,
    });
    ev.set_has_error(node, selected.is_none());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_is_clamped() {
        assert_eq!(decision_port(-3.0), 0);
        assert_eq!(decision_port(2.7), 2);
        assert_eq!(decision_port(42.0), 9);
        assert_eq!(decision_port(f32::NAN), 0);
    }
}
