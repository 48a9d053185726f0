//! Runtime configuration for graph instances and evaluation contexts.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Configuration shared by instances and per-lane evaluation contexts.
/// Every field has a default so partial JSON documents are accepted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Enables the per-node `has_error` diagnostics.
    pub editor_mode: bool,

    /// Initial capacity hints for the per-lane pools.
    pub initial_pose_pool_size: usize,
    pub initial_ref_data_pool_size: usize,

    /// Maximum events dispatched to listeners per update; the rest are dropped.
    pub max_events_per_tick: usize,

    /// Seed for the instance random stream. `None` seeds from OS entropy.
    pub random_seed: Option<u64>,

    /// Global switch for per-node retargeting.
    pub retargeting_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            editor_mode: false,
            initial_pose_pool_size: 16,
            initial_ref_data_pool_size: 16,
            max_events_per_tick: 1024,
            random_seed: None,
            retargeting_enabled: true,
        }
    }
}

impl Config {
    /// Parse a configuration from JSON. Missing fields fall back to defaults.
    pub fn from_json_str(text: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(text)?)
    }
}
