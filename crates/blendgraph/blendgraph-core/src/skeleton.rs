//! Skeleton description and full-skeleton poses.

use serde::{Deserialize, Serialize};

use crate::math::Transform;

/// One joint of a skeleton.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Joint {
    pub name: String,
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub bind: Transform,
    /// Joint that takes this joint's animation when mirroring (e.g. left/right hands).
    #[serde(default)]
    pub mirror: Option<usize>,
}

/// Shared skeleton data for every character using it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Skeleton {
    pub joints: Vec<Joint>,
    /// Joint whose ground-plane motion drives the character (motion extraction).
    #[serde(default)]
    pub motion_extraction_joint: Option<usize>,
}

impl Skeleton {
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    #[inline]
    pub fn mirror_of(&self, joint: usize) -> usize {
        self.joints
            .get(joint)
            .and_then(|j| j.mirror)
            .unwrap_or(joint)
    }
}

/// Local-space transforms for every joint of a skeleton.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pose {
    pub transforms: Vec<Transform>,
}

impl Pose {
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Overwrite with the skeleton's bind pose. Reuses the existing allocation.
    pub fn init_from_bind_pose(&mut self, skeleton: &Skeleton) {
        self.transforms.clear();
        self.transforms
            .extend(skeleton.joints.iter().map(|j| j.bind));
    }

    pub fn copy_from(&mut self, other: &Pose) {
        self.transforms.clear();
        self.transforms.extend_from_slice(&other.transforms);
    }

    /// `self = a * (1 - t) + b * t`, joint by joint.
    pub fn blend_from(&mut self, a: &Pose, b: &Pose, t: f32) {
        self.transforms.clear();
        self.transforms.extend(
            a.transforms
                .iter()
                .zip(b.transforms.iter())
                .map(|(ta, tb)| ta.blend(tb, t)),
        );
    }

    /// Blend `other` into `self` in place.
    pub fn blend_in_place(&mut self, other: &Pose, t: f32) {
        for (dst, src) in self.transforms.iter_mut().zip(other.transforms.iter()) {
            *dst = dst.blend(src, t);
        }
    }

    /// Remove the ground-plane displacement of the motion-extraction joint, which the
    /// character has already received as a trajectory delta.
    pub fn compensate_for_motion_extraction(&mut self, skeleton: &Skeleton) {
        let Some(joint) = skeleton.motion_extraction_joint else {
            return;
        };
        let (Some(current), Some(bind)) = (self.transforms.get_mut(joint), skeleton.joints.get(joint))
        else {
            return;
        };
        current.translation[0] = bind.bind.translation[0];
        current.translation[2] = bind.bind.translation[2];
        // keep pitch/roll, drop heading
        let [x, _, z, w] = current.rotation;
        current.rotation = crate::math::normalize4([x, 0.0, z, w]);
    }

    /// Approximate equality used by tests and diagnostics.
    pub fn approx_eq(&self, other: &Pose, eps: f32) -> bool {
        self.transforms.len() == other.transforms.len()
            && self
                .transforms
                .iter()
                .zip(other.transforms.iter())
                .all(|(a, b)| {
                    (0..3).all(|i| (a.translation[i] - b.translation[i]).abs() <= eps)
                        && (0..4).all(|i| (a.rotation[i] - b.rotation[i]).abs() <= eps)
                        && (0..3).all(|i| (a.scale[i] - b.scale[i]).abs() <= eps)
                })
    }
}
