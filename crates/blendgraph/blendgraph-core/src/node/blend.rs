//! Pose blending: blend trees, two-way and N-way blends.

use serde::{Deserialize, Serialize};

use super::{port, PortKind, PortSpec};
use crate::evaluation::Evaluation;
use crate::ids::NodeIndex;
use crate::unique_data::BlendState;

pub const MAX_BLEND_POSES: usize = 10;

pub(crate) const TREE_POSE_PORT: usize = 0;
pub(crate) const TREE_INPUTS: [PortSpec; 1] = [port("Final Pose", PortKind::Pose)];

pub const BLEND_TWO_WEIGHT_PORT: usize = 2;
pub(crate) const BLEND_TWO_INPUTS: [PortSpec; 3] = [
    port("Pose A", PortKind::Pose),
    port("Pose B", PortKind::Pose),
    port("Weight", PortKind::Number),
];

pub const BLEND_N_WEIGHT_PORT: usize = MAX_BLEND_POSES;
pub(crate) const BLEND_N_INPUTS: [PortSpec; MAX_BLEND_POSES + 1] = [
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
    port("Weight", PortKind::Number),
];

/// Phase alignment between the two inputs of a blend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    #[default]
    None,
    /// The lighter input follows the heavier one's normalised play time.
    ClipBased,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendTwoDef {
    /// Used when the weight port is not connected.
    pub weight: f32,
    pub sync: SyncMode,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendNDef {
    /// Anchor value per pose port, ascending. Missing entries default to the port index.
    pub weights: Vec<f32>,
    pub sync: SyncMode,
}

impl BlendNDef {
    fn anchor(&self, port: usize) -> f32 {
        self.weights.get(port).copied().unwrap_or(port as f32)
    }

    /// The two connected ports around `value` and the share of the second.
    fn select(&self, connected: &[usize], value: f32) -> (Option<usize>, Option<usize>, f32) {
        let (Some(&first), Some(&last)) = (connected.first(), connected.last()) else {
            return (None, None, 0.0);
        };
        if value <= self.anchor(first) {
            return (Some(first), None, 0.0);
        }
        if value >= self.anchor(last) {
            return (Some(last), None, 0.0);
        }
        for pair in connected.windows(2) {
            let (lo, hi) = (self.anchor(pair[0]), self.anchor(pair[1]));
            if value >= lo && value <= hi {
                let span = hi - lo;
                let t = if span > f32::EPSILON { (value - lo) / span } else { 0.0 };
                return (Some(pair[0]), Some(pair[1]), t);
            }
        }
        (Some(last), None, 0.0)
    }
}

/// Update the chosen inputs, store the selection and report the dominant input's timing.
fn update_selected(ev: &mut Evaluation<'_>, node: NodeIndex, blend: BlendState, dt: f32) {
    for input in [blend.a, blend.b].into_iter().flatten() {
        ev.update_incoming(input, dt);
    }
    let leader = match (blend.a, blend.b) {
        (Some(_), Some(b)) if blend.weight >= 0.5 => Some(b),
        (a, b) => a.or(b),
    };
    let timing = leader.map(|l| ev.unique(l).timing).unwrap_or_default();
    let u = ev.unique(node);
    u.timing = timing;
    u.set_blend(blend);
    ev.set_has_error(node, blend.a.is_none() && blend.b.is_none());
}

pub(crate) fn update_pass_through(ev: &mut Evaluation<'_>, node: NodeIndex, port: usize, dt: f32) {
    let blend = BlendState {
        a: ev.input_node(node, port),
        b: None,
        weight: 0.0,
    };
    update_selected(ev, node, blend, dt);
}

pub(crate) fn update_two(ev: &mut Evaluation<'_>, node: NodeIndex, def: &BlendTwoDef, dt: f32) {
    let weight = ev
        .input_float(node, BLEND_TWO_WEIGHT_PORT, dt)
        .unwrap_or(def.weight)
        .clamp(0.0, 1.0);
    let a = ev.input_node(node, 0);
    let b = ev.input_node(node, 1);
    let blend = match (a, b) {
        (Some(_), Some(_)) => BlendState { a, b, weight },
        (Some(_), None) => BlendState { a, b: None, weight: 0.0 },
        (None, b) => BlendState { a: b, b: None, weight: 0.0 },
    };
    update_selected(ev, node, blend, dt);
}

pub(crate) fn update_n(ev: &mut Evaluation<'_>, node: NodeIndex, def: &BlendNDef, dt: f32) {
    let value = ev.input_float(node, BLEND_N_WEIGHT_PORT, dt).unwrap_or(0.0);
    let connected: Vec<usize> = (0..MAX_BLEND_POSES)
        .filter(|&p| ev.input_node(node, p).is_some())
        .collect();
    let (pa, pb, weight) = def.select(&connected, value);
    let blend = BlendState {
        a: pa.and_then(|p| ev.input_node(node, p)),
        b: pb.and_then(|p| ev.input_node(node, p)),
        weight,
    };
    update_selected(ev, node, blend, dt);
}

pub(crate) fn top_down_update(ev: &mut Evaluation<'_>, node: NodeIndex, sync: SyncMode, dt: f32) {
    let blend = ev.unique(node).blend();
    match (blend.a, blend.b) {
        (Some(a), Some(b)) => {
            ev.set_child_weight(node, a, 1.0 - blend.weight);
            ev.set_child_weight(node, b, blend.weight);
            if sync == SyncMode::ClipBased {
                let (leader, follower) = if blend.weight >= 0.5 { (b, a) } else { (a, b) };
                sync_to_leader(ev, leader, follower);
            }
        }
        (Some(only), None) | (None, Some(only)) => ev.set_child_weight(node, only, 1.0),
        (None, None) => {}
    }
    for input in [blend.a, blend.b].into_iter().flatten() {
        ev.perform_top_down_update(input, dt);
    }
}

/// Put the follower at the leader's normalised phase.
fn sync_to_leader(ev: &mut Evaluation<'_>, leader: NodeIndex, follower: NodeIndex) {
    let phase = ev.unique(leader).timing.normalized();
    let timing = &mut ev.unique(follower).timing;
    if timing.duration <= 0.0 {
        return;
    }
    timing.current_time = phase * timing.duration;
}

pub(crate) fn post_update(ev: &mut Evaluation<'_>, node: NodeIndex, dt: f32) {
    let blend = ev.unique(node).blend();
    ev.post_update_blended(node, blend.a, blend.b, blend.weight, dt);
}

pub(crate) fn output(ev: &mut Evaluation<'_>, node: NodeIndex) {
    let blend = ev.unique(node).blend();
    ev.output_blended(node, blend.a, blend.b, blend.weight);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_n_selects_neighbouring_anchors() {
        let def = BlendNDef {
            weights: vec![0.0, 1.0, 3.0],
            sync: SyncMode::None,
        };
        let connected = [0, 1, 2];
        assert_eq!(def.select(&connected, -1.0), (Some(0), None, 0.0));
        assert_eq!(def.select(&connected, 5.0), (Some(2), None, 0.0));
        let (a, b, t) = def.select(&connected, 2.0);
        assert_eq!((a, b), (Some(1), Some(2)));
        assert!((t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn blend_n_skips_unconnected_ports() {
        let def = BlendNDef::default();
        let (a, b, t) = def.select(&[0, 4], 2.0);
        assert_eq!((a, b), (Some(0), Some(4)));
        assert!((t - 0.5).abs() < 1e-6);
        assert_eq!(def.select(&[], 1.0), (None, None, 0.0));
    }
}
