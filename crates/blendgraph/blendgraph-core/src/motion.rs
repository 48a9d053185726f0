//! Keyframed motion clips, motion sets and clip sampling.
//!
//! Model:
//! - A [`Motion`] owns one [`JointTrack`] per animated joint; each channel (translation,
//!   rotation, scale) is an ordered list of keys in seconds.
//! - Channels are sampled linearly (NLERP for rotations). Missing channels fall back to
//!   the skeleton's bind transform.
//! - Events are either ticks (`start_time == end_time`) or ranges.

use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::ids::MotionSetId;
use crate::math::{lerp_vec3, nlerp_quat, normalize4, Transform};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Key<T> {
    pub time: f32,
    pub value: T,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointTrack {
    /// Skeleton joint name this track drives.
    pub joint: String,
    #[serde(default)]
    pub translation: Vec<Key<[f32; 3]>>,
    #[serde(default)]
    pub rotation: Vec<Key<[f32; 4]>>,
    #[serde(default)]
    pub scale: Vec<Key<[f32; 3]>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionEvent {
    pub start_time: f32,
    /// Defaults to `start_time` (a tick event).
    #[serde(default)]
    pub end_time: Option<f32>,
    pub event_type: String,
    #[serde(default)]
    pub parameters: String,
}

impl MotionEvent {
    #[inline]
    pub fn end(&self) -> f32 {
        self.end_time.unwrap_or(self.start_time)
    }

    #[inline]
    pub fn is_tick(&self) -> bool {
        self.end() <= self.start_time
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub name: String,
    /// Seconds.
    pub duration: f32,
    #[serde(default)]
    pub tracks: Vec<JointTrack>,
    #[serde(default)]
    pub events: Vec<MotionEvent>,
}

/// Find the key segment containing `time`: `(i0, i1, local_t)`.
/// Before the first key returns `(0, 0, 0)`; after the last returns `(last, last, 0)`.
fn find_segment<T>(keys: &[Key<T>], time: f32) -> (usize, usize, f32) {
    let n = keys.len();
    if n <= 1 || time <= keys[0].time {
        return (0, 0, 0.0);
    }
    if time >= keys[n - 1].time {
        return (n - 1, n - 1, 0.0);
    }
    // keys are sorted by time
    let hi = keys.partition_point(|k| k.time <= time).clamp(1, n - 1);
    let lo = hi - 1;
    let denom = (keys[hi].time - keys[lo].time).max(f32::EPSILON);
    (lo, hi, ((time - keys[lo].time) / denom).clamp(0.0, 1.0))
}

fn sample_vec3(keys: &[Key<[f32; 3]>], time: f32, fallback: [f32; 3]) -> [f32; 3] {
    if keys.is_empty() {
        return fallback;
    }
    let (i0, i1, t) = find_segment(keys, time);
    if i0 == i1 {
        return keys[i0].value;
    }
    lerp_vec3(keys[i0].value, keys[i1].value, t)
}

fn sample_quat(keys: &[Key<[f32; 4]>], time: f32, fallback: [f32; 4]) -> [f32; 4] {
    if keys.is_empty() {
        return fallback;
    }
    let (i0, i1, t) = find_segment(keys, time);
    if i0 == i1 {
        return normalize4(keys[i0].value);
    }
    nlerp_quat(keys[i0].value, keys[i1].value, t)
}

impl Motion {
    /// Sample one track at `time` seconds. Channels without keys keep `bind`'s values.
    pub fn sample_track(&self, track: usize, time: f32, bind: &Transform) -> Transform {
        let Some(track) = self.tracks.get(track) else {
            return *bind;
        };
        Transform {
            translation: sample_vec3(&track.translation, time, bind.translation),
            rotation: sample_quat(&track.rotation, time, bind.rotation),
            scale: sample_vec3(&track.scale, time, bind.scale),
        }
    }

    pub fn find_track(&self, joint: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.joint == joint)
    }
}

/// Resolves motion ids to clips. Implemented by [`MotionSet`]; hosts may provide their own.
pub trait MotionLookup: Send + Sync {
    fn id(&self) -> MotionSetId;

    fn find_motion(&self, motion_id: &str) -> Option<Arc<Motion>>;
}

/// Named collection of motions with optional child sets searched after this one.
#[derive(Clone, Debug)]
pub struct MotionSet {
    id: MotionSetId,
    pub name: String,
    motions: HashMap<String, Arc<Motion>>,
    children: Vec<MotionSet>,
}

impl MotionSet {
    pub fn new(id: MotionSetId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            motions: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Register `motion` under `motion_id`, replacing any previous entry.
    pub fn add_motion(&mut self, motion_id: impl Into<String>, motion: Motion) -> &mut Self {
        self.motions.insert(motion_id.into(), Arc::new(motion));
        self
    }

    pub fn add_child(&mut self, child: MotionSet) -> &mut Self {
        self.children.push(child);
        self
    }

    pub fn remove_motion(&mut self, motion_id: &str) -> bool {
        self.motions.remove(motion_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.motions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motions.is_empty()
    }
}

impl MotionLookup for MotionSet {
    fn id(&self) -> MotionSetId {
        self.id
    }

    fn find_motion(&self, motion_id: &str) -> Option<Arc<Motion>> {
        if let Some(m) = self.motions.get(motion_id) {
            return Some(Arc::clone(m));
        }
        self.children.iter().find_map(|c| c.find_motion(motion_id))
    }
}
