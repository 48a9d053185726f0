//! Playback state of one motion clip bound to one skeleton.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::event::{EventBuffer, EventInfo, EventPhase};
use crate::ids::NodeIndex;
use crate::math::Transform;
use crate::motion::Motion;
use crate::skeleton::{Pose, Skeleton};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayMode {
    #[default]
    Forward,
    Backward,
}

/// Settings copied from the owning node when the instance is created.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackSettings {
    pub play_speed: f32,
    pub play_mode: PlayMode,
    /// `None` loops forever.
    pub max_loops: Option<u32>,
    pub freeze_at_last_frame: bool,
    pub mirror: bool,
    pub retarget: bool,
    pub in_place: bool,
    pub motion_extraction: bool,
    pub emit_events: bool,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            play_speed: 1.0,
            play_mode: PlayMode::Forward,
            max_loops: None,
            freeze_at_last_frame: true,
            mirror: false,
            retarget: false,
            in_place: false,
            motion_extraction: true,
            emit_events: true,
        }
    }
}

/// Result of advancing a clip by some time without committing it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayState {
    pub time: f32,
    pub loops_completed: u32,
    /// Loop points crossed by this advance; more than one when `dt` spans whole cycles.
    pub wraps: u32,
    pub has_looped: bool,
    pub has_ended: bool,
}

/// Time span scanned for events, with per-end inclusiveness.
#[derive(Clone, Copy, Debug)]
struct EventWindow {
    low: f32,
    high: f32,
    low_inclusive: bool,
    high_inclusive: bool,
}

impl EventWindow {
    fn new(low: f32, high: f32, low_inclusive: bool, high_inclusive: bool) -> Self {
        Self {
            low,
            high,
            low_inclusive,
            high_inclusive,
        }
    }

    fn contains(&self, t: f32) -> bool {
        let above = if self.low_inclusive { t >= self.low } else { t > self.low };
        let below = if self.high_inclusive { t <= self.high } else { t < self.high };
        above && below
    }
}

pub struct MotionInstance {
    motion: Arc<Motion>,
    /// Track index per skeleton joint.
    joint_tracks: Vec<Option<usize>>,
    extraction_joint: Option<usize>,
    pub settings: PlaybackSettings,
    current_time: f32,
    last_time: f32,
    loops_completed: u32,
    /// Loop points crossed by the last committed update.
    wraps: u32,
    has_looped: bool,
    has_ended: bool,
}

impl MotionInstance {
    pub fn new(motion: Arc<Motion>, skeleton: &Skeleton, settings: PlaybackSettings) -> Self {
        let joint_tracks = skeleton
            .joints
            .iter()
            .map(|j| motion.find_track(&j.name))
            .collect();
        let mut instance = Self {
            motion,
            joint_tracks,
            extraction_joint: skeleton.motion_extraction_joint,
            settings,
            current_time: 0.0,
            last_time: 0.0,
            loops_completed: 0,
            wraps: 0,
            has_looped: false,
            has_ended: false,
        };
        instance.rewind();
        instance
    }

    #[inline]
    pub fn motion(&self) -> &Arc<Motion> {
        &self.motion
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.motion.duration.max(0.0)
    }

    #[inline]
    pub fn current_time(&self) -> f32 {
        self.current_time
    }

    #[inline]
    pub fn last_time(&self) -> f32 {
        self.last_time
    }

    #[inline]
    pub fn has_looped(&self) -> bool {
        self.has_looped
    }

    #[inline]
    pub fn has_ended(&self) -> bool {
        self.has_ended
    }

    /// Loop points crossed by the last update.
    #[inline]
    pub fn wraps(&self) -> u32 {
        self.wraps
    }

    #[inline]
    pub fn loops_completed(&self) -> u32 {
        self.loops_completed
    }

    #[inline]
    pub fn is_playing_forever(&self) -> bool {
        self.settings.max_loops.is_none()
    }

    fn start_time(&self) -> f32 {
        match self.settings.play_mode {
            PlayMode::Forward => 0.0,
            PlayMode::Backward => self.duration(),
        }
    }

    pub fn rewind(&mut self) {
        let start = self.start_time();
        self.current_time = start;
        self.last_time = start;
        self.loops_completed = 0;
        self.wraps = 0;
        self.has_looped = false;
        self.has_ended = false;
    }

    pub fn set_current_time(&mut self, time: f32) {
        let time = time.clamp(0.0, self.duration());
        self.current_time = time;
        self.last_time = time;
    }

    /// Where the playhead would be after `dt` seconds at `play_speed`, without committing.
    pub fn calc_play_state_after_update(&self, dt: f32, play_speed: f32) -> PlayState {
        let duration = self.duration();
        let held = |time: f32, has_ended: bool| PlayState {
            time,
            loops_completed: self.loops_completed,
            wraps: 0,
            has_looped: false,
            has_ended,
        };
        if duration <= 0.0 {
            return held(0.0, true);
        }
        if self.has_ended && self.settings.freeze_at_last_frame {
            return held(self.current_time, true);
        }

        let step = dt * play_speed;
        let (raw, forward) = match self.settings.play_mode {
            PlayMode::Forward => (self.current_time + step, true),
            PlayMode::Backward => (self.current_time - step, false),
        };
        let outside = if forward { raw >= duration } else { raw < 0.0 };
        if !outside {
            return held(raw.clamp(0.0, duration), false);
        }

        let wraps = if forward {
            (raw / duration).floor() as u32
        } else {
            ((-raw) / duration).floor() as u32 + 1
        }
        .max(1);
        let loops = self.loops_completed.saturating_add(wraps);
        let can_loop = self.settings.max_loops.map_or(true, |max| loops < max);
        if can_loop {
            PlayState {
                time: raw.rem_euclid(duration),
                loops_completed: loops,
                wraps,
                has_looped: true,
                has_ended: false,
            }
        } else {
            let end = match (forward, self.settings.freeze_at_last_frame) {
                (true, true) | (false, false) => duration,
                (true, false) | (false, true) => 0.0,
            };
            PlayState {
                time: end,
                loops_completed: self.settings.max_loops.unwrap_or(loops),
                wraps: 0,
                has_looped: false,
                has_ended: true,
            }
        }
    }

    /// Commit a time pair computed earlier in the frame (possibly adjusted by syncing).
    ///
    /// `wraps` is the number of loop points the advance crossed. A pair that runs against
    /// the play direction counts as at least one wrap even when `wraps` is zero.
    pub fn update_by_time_values(&mut self, previous: f32, current: f32, wraps: u32) {
        let duration = self.duration();
        let forward = self.settings.play_mode == PlayMode::Forward;
        let reversed = if forward {
            current < previous
        } else {
            current > previous
        };
        self.wraps = if reversed { wraps.max(1) } else { wraps };
        self.has_looped = self.wraps > 0;
        self.loops_completed = self.loops_completed.saturating_add(self.wraps);
        let at_end = if forward {
            current >= duration
        } else {
            current <= 0.0
        };
        self.has_ended = at_end
            && self
                .settings
                .max_loops
                .is_some_and(|max| self.loops_completed + 1 >= max);
        self.last_time = previous;
        self.current_time = current;
    }

    /// Append events crossed between the last and current time, in play order. Every
    /// whole cycle spanned by the update contributes the clip's full event list.
    pub fn extract_events(&self, out: &mut EventBuffer, emitter: NodeIndex, local_weight: f32) {
        if !self.settings.emit_events || (self.wraps == 0 && self.last_time == self.current_time) {
            return;
        }
        let duration = self.duration();
        let (prev, cur) = (self.last_time, self.current_time);
        let forward = self.settings.play_mode == PlayMode::Forward;

        let whole = EventWindow::new(0.0, duration, true, true);
        let (tail, head) = match (forward, self.wraps > 0) {
            (true, false) => (EventWindow::new(prev, cur, false, true), None),
            (true, true) => (
                EventWindow::new(prev, duration, false, true),
                Some(EventWindow::new(0.0, cur, true, true)),
            ),
            (false, false) => (EventWindow::new(cur, prev, true, false), None),
            (false, true) => (
                EventWindow::new(0.0, prev, true, false),
                Some(EventWindow::new(cur, duration, true, true)),
            ),
        };

        self.emit_window(out, tail, emitter, local_weight);
        for _ in 1..self.wraps {
            self.emit_window(out, whole, emitter, local_weight);
        }
        if let Some(head) = head {
            self.emit_window(out, head, emitter, local_weight);
        }
    }

    fn emit_window(&self, out: &mut EventBuffer, window: EventWindow, emitter: NodeIndex, local_weight: f32) {
        let forward = self.settings.play_mode == PlayMode::Forward;
        for ev in &self.motion.events {
            let mut emit = |time: f32, phase: EventPhase| {
                out.push(EventInfo {
                    time,
                    event_type: ev.event_type.clone(),
                    parameters: ev.parameters.clone(),
                    phase,
                    emitter,
                    global_weight: 0.0,
                    local_weight,
                });
            };
            if ev.is_tick() {
                if window.contains(ev.start_time) {
                    emit(ev.start_time, EventPhase::Tick);
                }
                continue;
            }
            let (first, second) = if forward {
                ((ev.start_time, EventPhase::Start), (ev.end(), EventPhase::End))
            } else {
                ((ev.end(), EventPhase::Start), (ev.start_time, EventPhase::End))
            };
            if window.contains(first.0) {
                emit(first.0, first.1);
            }
            if window.contains(second.0) {
                emit(second.0, second.1);
            }
        }
    }

    fn sample_joint(&self, skeleton: &Skeleton, joint: usize, time: f32) -> Transform {
        let Some(def) = skeleton.joints.get(joint) else {
            return Transform::IDENTITY;
        };
        let Some(track) = self.joint_tracks.get(joint).copied().flatten() else {
            return def.bind;
        };
        let mut t = self.motion.sample_track(track, time, &def.bind);
        if self.settings.retarget && Some(joint) != self.extraction_joint {
            t.translation = def.bind.translation;
        }
        t
    }

    /// Sample the clip at the current time into `out`.
    pub fn sample_pose(&self, skeleton: &Skeleton, out: &mut Pose, mirror: bool) {
        out.init_from_bind_pose(skeleton);
        for (joint, dst) in out.transforms.iter_mut().enumerate() {
            *dst = if mirror {
                self.sample_joint(skeleton, skeleton.mirror_of(joint), self.current_time)
                    .mirrored()
            } else {
                self.sample_joint(skeleton, joint, self.current_time)
            };
        }
    }

    /// Ground-plane motion of the extraction joint between the last and current time.
    pub fn extract_trajectory_delta(&self, skeleton: &Skeleton, mirror: bool) -> Transform {
        let Some(joint) = self.extraction_joint else {
            return Transform::IDENTITY;
        };
        if !self.settings.motion_extraction || self.settings.in_place {
            return Transform::IDENTITY;
        }
        let sample = |t: f32| self.sample_joint(skeleton, joint, t);
        let (prev, cur) = (self.last_time, self.current_time);
        let duration = self.duration();
        let delta = if self.wraps == 0 {
            sample(prev).delta_to(&sample(cur))
        } else {
            let (end, start) = match self.settings.play_mode {
                PlayMode::Forward => (duration, 0.0),
                PlayMode::Backward => (0.0, duration),
            };
            let cycle = sample(start).delta_to(&sample(end));
            let mut delta = sample(prev).delta_to(&sample(end));
            for _ in 1..self.wraps {
                delta = delta.multiply(&cycle);
            }
            delta.multiply(&sample(start).delta_to(&sample(cur)))
        };
        let delta = delta.projected_to_ground();
        if mirror {
            delta.mirrored()
        } else {
            delta
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Transform;
    use crate::motion::{JointTrack, Key, MotionEvent};
    use crate::skeleton::Joint;

    fn skeleton() -> Skeleton {
        Skeleton {
            joints: vec![Joint {
                name: "root".into(),
                parent: None,
                bind: Transform::IDENTITY,
                mirror: None,
            }],
            motion_extraction_joint: Some(0),
        }
    }

    fn walk() -> Arc<Motion> {
        Arc::new(Motion {
            name: "walk".into(),
            duration: 1.0,
            tracks: vec![JointTrack {
                joint: "root".into(),
                translation: vec![
                    Key { time: 0.0, value: [0.0, 0.0, 0.0] },
                    Key { time: 1.0, value: [0.0, 0.0, 1.0] },
                ],
                ..Default::default()
            }],
            events: vec![MotionEvent {
                start_time: 0.5,
                end_time: None,
                event_type: "footstep".into(),
                parameters: String::new(),
            }],
        })
    }

    #[test]
    fn looping_wraps_time() {
        let mut mi = MotionInstance::new(walk(), &skeleton(), PlaybackSettings::default());
        let s = mi.calc_play_state_after_update(0.5, 1.0);
        mi.update_by_time_values(mi.current_time(), s.time, s.wraps);
        let s = mi.calc_play_state_after_update(0.6, 1.0);
        assert!(s.has_looped);
        assert!((s.time - 0.1).abs() < 1e-5);
    }

    #[test]
    fn single_play_freezes_at_end() {
        let settings = PlaybackSettings {
            max_loops: Some(1),
            ..Default::default()
        };
        let mi = MotionInstance::new(walk(), &skeleton(), settings);
        let s = mi.calc_play_state_after_update(1.5, 1.0);
        assert!(s.has_ended);
        assert_eq!(s.time, 1.0);
    }

    #[test]
    fn events_across_wrap_are_collected_once() {
        let mut mi = MotionInstance::new(walk(), &skeleton(), PlaybackSettings::default());
        mi.update_by_time_values(0.4, 0.6, 0);
        let mut buf = EventBuffer::new();
        mi.extract_events(&mut buf, NodeIndex(0), 1.0);
        assert_eq!(buf.len(), 1);

        buf.clear();
        mi.update_by_time_values(0.6, 0.1, 0);
        mi.extract_events(&mut buf, NodeIndex(0), 1.0);
        assert!(buf.is_empty());
    }

    #[test]
    fn trajectory_delta_follows_root_and_mirrors() {
        let mut mi = MotionInstance::new(walk(), &skeleton(), PlaybackSettings::default());
        mi.update_by_time_values(0.25, 0.75, 0);
        let d = mi.extract_trajectory_delta(&skeleton(), false);
        assert!((d.translation[2] - 0.5).abs() < 1e-5);
        let m = mi.extract_trajectory_delta(&skeleton(), true);
        assert!((m.translation[2] - 0.5).abs() < 1e-5);
        assert_eq!(m.translation[0], -d.translation[0]);
    }

    #[test]
    fn update_spanning_a_whole_cycle_still_loops() {
        let skel = skeleton();
        let mut mi = MotionInstance::new(walk(), &skel, PlaybackSettings::default());
        mi.update_by_time_values(0.0, 0.2, 0);

        let s = mi.calc_play_state_after_update(1.0, 1.0);
        assert!(s.has_looped);
        assert_eq!(s.wraps, 1);
        mi.update_by_time_values(mi.current_time(), s.time, s.wraps);
        assert!(mi.has_looped());
        assert_eq!(mi.loops_completed(), 1);

        let mut buf = EventBuffer::new();
        mi.extract_events(&mut buf, NodeIndex(0), 1.0);
        assert_eq!(buf.len(), 1);
        let d = mi.extract_trajectory_delta(&skel, false);
        assert!((d.translation[2] - 1.0).abs() < 1e-4, "delta z {}", d.translation[2]);
    }

    #[test]
    fn multiple_cycles_emit_every_crossed_event() {
        let skel = skeleton();
        let mut mi = MotionInstance::new(walk(), &skel, PlaybackSettings::default());
        mi.update_by_time_values(0.0, 0.2, 0);

        let s = mi.calc_play_state_after_update(2.5, 1.0);
        assert_eq!(s.wraps, 2);
        assert_eq!(s.loops_completed, 2);
        mi.update_by_time_values(mi.current_time(), s.time, s.wraps);

        let mut buf = EventBuffer::new();
        mi.extract_events(&mut buf, NodeIndex(0), 1.0);
        assert_eq!(buf.len(), 3);
        let d = mi.extract_trajectory_delta(&skel, false);
        assert!((d.translation[2] - 2.5).abs() < 1e-4, "delta z {}", d.translation[2]);
    }
}
