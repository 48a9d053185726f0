//! Motion node: plays one clip picked from a weighted candidate list.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{port, PortKind, PortSpec};
use crate::attribute::Attribute;
use crate::evaluation::{Evaluation, InstanceState, WEIGHT_EPSILON};
use crate::graph::Graph;
use crate::ids::NodeIndex;
use crate::motion_instance::{MotionInstance, PlayMode, PlaybackSettings};
use crate::selection::{IndexMode, WeightedMotionList, DEFAULT_MOTION_WEIGHT};
use crate::unique_data::UniqueData;

pub const PLAY_SPEED_PORT: usize = 0;
pub const IN_PLACE_PORT: usize = 1;
pub const MOTION_OUTPUT_PORT: usize = 1;

pub(crate) const INPUTS: [PortSpec; 2] = [
    port("Play Speed", PortKind::Number),
    port("In Place", PortKind::Number),
];
pub(crate) const OUTPUTS: [PortSpec; 2] = [
    port("Pose", PortKind::Pose),
    port("Motion", PortKind::MotionInstance),
];

pub const MOTION_NODE_VERSION: u32 = 3;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionNodeDef {
    pub motion_ids: WeightedMotionList,
    pub index_mode: IndexMode,
    #[serde(rename = "loop")]
    pub loop_motion: bool,
    pub play_speed: f32,
    pub reverse: bool,
    pub mirror: bool,
    pub retarget: bool,
    pub in_place: bool,
    pub emit_events: bool,
    pub motion_extraction: bool,
    /// Pick another candidate each time the clip wraps.
    pub next_motion_after_loop: bool,
    /// Non-looping only: restart when the node's weight drops to zero.
    pub rewind_on_zero_weight: bool,
}

impl Default for MotionNodeDef {
    fn default() -> Self {
        Self {
            motion_ids: WeightedMotionList::new(),
            index_mode: IndexMode::Randomize,
            loop_motion: true,
            play_speed: 1.0,
            reverse: false,
            mirror: false,
            retarget: false,
            in_place: false,
            emit_events: true,
            motion_extraction: true,
            next_motion_after_loop: false,
            rewind_on_zero_weight: false,
        }
    }
}

impl MotionNodeDef {
    pub fn with_motion(motion_id: impl Into<String>) -> Self {
        let mut def = Self::default();
        def.motion_ids.add_motion(motion_id, DEFAULT_MOTION_WEIGHT);
        def
    }

    fn playback_settings(&self, in_place: bool) -> PlaybackSettings {
        PlaybackSettings {
            play_speed: self.play_speed,
            play_mode: if self.reverse {
                PlayMode::Backward
            } else {
                PlayMode::Forward
            },
            max_loops: if self.loop_motion { None } else { Some(1) },
            freeze_at_last_frame: !self.loop_motion,
            mirror: self.mirror,
            retarget: self.retarget,
            in_place,
            motion_extraction: self.motion_extraction,
            emit_events: self.emit_events,
        }
    }
}

/// Pick the next active candidate and flag the playback instance for recreation.
fn pick_new_active_motion(graph: &Graph, state: &mut InstanceState, node: NodeIndex, def: &MotionNodeDef) {
    let InstanceState { unique, rng, .. } = state;
    let u = unique[node.index()].get_or_insert_with(|| UniqueData::new(&graph.node(node).kind));
    let Some(m) = u.motion() else {
        return;
    };
    let previous = m.active_index;
    m.active_index = def.motion_ids.pick(def.index_mode, previous, rng);
    if def.motion_ids.len() > 1 || m.active_index != previous {
        m.reload = true;
    }
    log::trace!(
        "{}: active motion {:?} -> {:?}",
        graph.node_name(node),
        previous,
        m.active_index
    );
}

/// Create the playback instance if a reload is pending.
fn ensure_motion_instance(ev: &mut Evaluation<'_>, node: NodeIndex, def: &MotionNodeDef, in_place: bool) {
    let needs_reload = ev.unique(node).motion().is_some_and(|m| m.reload);
    if !needs_reload {
        return;
    }
    if ev.unique(node).motion().is_some_and(|m| m.active_index.is_none()) {
        pick_new_active_motion(ev.graph, ev.state, node, def);
    }

    let graph = ev.graph;
    let name = graph.node_name(node);
    let motion_set = ev.state.motion_set.clone();
    let skeleton = Arc::clone(&ev.skeleton);
    let retargeting = ev.state.config.retargeting_enabled;
    let u = ev.unique(node);
    let keep_time = u.timing.current_time;
    let Some(m) = u.motion() else {
        return;
    };
    m.reload = false;

    let motion_id = m.active_index.and_then(|i| def.motion_ids.motion_id(i));
    let clip = match (&motion_set, motion_id) {
        (Some(set), Some(id)) => set.find_motion(id),
        _ => None,
    };
    match clip {
        Some(clip) => {
            let had_instance = m.instance.is_some();
            let mut settings = def.playback_settings(in_place);
            settings.retarget &= retargeting;
            let mut instance = MotionInstance::new(clip, &skeleton, settings);
            if had_instance {
                instance.set_current_time(keep_time);
            }
            m.instance = Some(instance);
            m.warned = false;
        }
        None => {
            m.instance = None;
            if !m.warned {
                m.warned = true;
                match (motion_set.is_some(), motion_id) {
                    (false, _) => log::warn!("{name}: no motion set bound"),
                    (true, None) => log::warn!("{name}: no candidate motions"),
                    (true, Some(id)) => log::warn!("{name}: motion '{id}' not found in motion set"),
                }
            }
        }
    }
}

pub(crate) fn update(ev: &mut Evaluation<'_>, node: NodeIndex, def: &MotionNodeDef, dt: f32) {
    let play_speed = ev
        .input_float(node, PLAY_SPEED_PORT, dt)
        .unwrap_or(def.play_speed);
    let in_place = ev.input_bool(node, IN_PLACE_PORT, dt).unwrap_or(def.in_place);

    ensure_motion_instance(ev, node, def, in_place);

    let u = ev.unique(node);
    let mut timing = u.timing;
    let resolved = match u.motion().and_then(|m| m.instance.as_mut()) {
        Some(mi) => {
            mi.settings.in_place = in_place;
            mi.settings.play_speed = play_speed;
            let next = mi.calc_play_state_after_update(dt, play_speed);
            timing.previous_time = mi.current_time();
            timing.current_time = next.time;
            timing.duration = mi.duration();
            timing.play_speed = play_speed;
            timing.wraps = next.wraps;
            timing.has_looped = next.has_looped;
            timing.has_ended = next.has_ended;
            true
        }
        None => {
            timing.clear();
            false
        }
    };
    u.timing = timing;

    ev.set_has_error(node, !resolved);
    ev.set_output_value(node, MOTION_OUTPUT_PORT, Attribute::MotionInstance(resolved.then_some(node)));
}

pub(crate) fn top_down_update(ev: &mut Evaluation<'_>, node: NodeIndex, def: &MotionNodeDef) {
    let u = ev.unique(node);
    let has_looped = u.timing.has_looped;
    let local_weight = u.local_weight;
    let has_instance = u.motion().is_some_and(|m| m.instance.is_some());
    if !has_instance {
        return;
    }

    if def.motion_ids.len() > 1 && def.next_motion_after_loop && has_looped {
        pick_new_active_motion(ev.graph, ev.state, node, def);
    }

    if !def.loop_motion && def.rewind_on_zero_weight && local_weight < WEIGHT_EPSILON {
        let u = ev.unique(node);
        if let Some(mi) = u.motion().and_then(|m| m.instance.as_mut()) {
            mi.rewind();
            let start = mi.current_time();
            u.timing.current_time = start;
            u.timing.previous_time = start;
            u.timing.wraps = 0;
            u.timing.has_ended = false;
        }
    }
}

pub(crate) fn post_update(ev: &mut Evaluation<'_>, node: NodeIndex, def: &MotionNodeDef) {
    let h = ev.request_ref_data(node);
    let extract = def.motion_extraction && ev.state.character.motion_extraction_enabled;
    let skeleton = Arc::clone(&ev.skeleton);

    let u = ev.state.unique(ev.graph, node);
    let timing = u.timing;
    let local_weight = u.local_weight;
    let Some(mi) = u.motion().and_then(|m| m.instance.as_mut()) else {
        return;
    };
    mi.update_by_time_values(timing.previous_time, timing.current_time, timing.wraps);

    let Some(data) = ev.ctx.ref_data_pool.get_mut(h) else {
        return;
    };
    mi.extract_events(&mut data.events, node, local_weight);
    if extract {
        let mirrored = mi.settings.mirror;
        data.trajectory_delta = mi.extract_trajectory_delta(&skeleton, mirrored);
        data.trajectory_delta_mirrored = mi.extract_trajectory_delta(&skeleton, !mirrored);
    }
}

pub(crate) fn output(ev: &mut Evaluation<'_>, node: NodeIndex, def: &MotionNodeDef) {
    let h = ev.request_output_pose(node);
    let compensate = def.motion_extraction && ev.state.character.motion_extraction_enabled;
    let skeleton = Arc::clone(&ev.skeleton);

    let u = ev.state.unique(ev.graph, node);
    let instance = u.motion().and_then(|m| m.instance.as_ref());
    let Some(pose) = ev.ctx.pose_pool.get_mut(h) else {
        return;
    };
    match instance {
        Some(mi) => {
            mi.sample_pose(&skeleton, pose, mi.settings.mirror);
            if compensate || mi.settings.in_place {
                pose.compensate_for_motion_extraction(&skeleton);
            }
        }
        None => {
            pose.init_from_bind_pose(&skeleton);
            ev.state.set_has_error(node, true);
        }
    }
}

pub(crate) fn rewind(graph: &Graph, state: &mut InstanceState, node: NodeIndex, def: &MotionNodeDef) {
    if def.motion_ids.len() > 1 {
        pick_new_active_motion(graph, state, node, def);
    }
    let u = state.unique(graph, node);
    let mut start = 0.0;
    if let Some(mi) = u.motion().and_then(|m| m.instance.as_mut()) {
        mi.rewind();
        start = mi.current_time();
    }
    u.timing.current_time = start;
    u.timing.previous_time = start;
    u.timing.wraps = 0;
    u.timing.has_looped = false;
    u.timing.has_ended = false;
}

/// Force every motion node of the instance to rebuild its playback instance.
pub(crate) fn mark_for_reload(state: &mut InstanceState) {
    for m in state.unique.iter_mut().flatten().filter_map(|u| u.motion()) {
        m.reload = true;
        m.warned = false;
    }
}
