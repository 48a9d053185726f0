//! The character a graph instance drives.

use std::sync::Arc;

use crate::math::Transform;
use crate::skeleton::Skeleton;

#[derive(Clone, Debug)]
pub struct Character {
    skeleton: Arc<Skeleton>,
    /// World placement, moved by extracted root motion.
    pub world_transform: Transform,
    /// Delta applied during the most recent update.
    pub trajectory_delta: Transform,
    pub motion_extraction_enabled: bool,
}

impl Character {
    pub fn new(skeleton: Arc<Skeleton>) -> Self {
        Self {
            skeleton,
            world_transform: Transform::IDENTITY,
            trajectory_delta: Transform::IDENTITY,
            motion_extraction_enabled: true,
        }
    }

    #[inline]
    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.skeleton
    }

    pub fn set_skeleton(&mut self, skeleton: Arc<Skeleton>) {
        self.skeleton = skeleton;
    }

    /// Move the character by a local-space trajectory delta.
    pub fn apply_motion_extraction(&mut self, delta: Transform) {
        self.trajectory_delta = delta;
        if self.motion_extraction_enabled {
            self.world_transform = self.world_transform.multiply(&delta);
        }
    }
}
