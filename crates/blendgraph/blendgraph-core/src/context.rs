//! Per-lane evaluation context.

use crate::config::Config;
use crate::pool::{PosePool, RefDataPool, SlotPool};

/// Scratch resources owned by one worker lane.
///
/// Every instance updated on a lane borrows this context mutably for the duration of
/// its `update`/`output` call, so the pools are never shared between threads.
pub struct EvalContext {
    lane: usize,
    pub pose_pool: PosePool,
    pub ref_data_pool: RefDataPool,
}

impl EvalContext {
    pub fn new(lane: usize) -> Self {
        Self::with_config(lane, &Config::default())
    }

    pub fn with_config(lane: usize, config: &Config) -> Self {
        Self {
            lane,
            pose_pool: SlotPool::with_capacity(config.initial_pose_pool_size),
            ref_data_pool: SlotPool::with_capacity(config.initial_ref_data_pool_size),
        }
    }

    #[inline]
    pub fn lane(&self) -> usize {
        self.lane
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(0)
    }
}
