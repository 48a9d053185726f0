//! Identifiers for graph objects and bound collaborators.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Stable index of a node inside its graph's object table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Position of a value parameter in the graph's declared parameter list.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterIndex(pub u32);

impl ParameterIndex {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a motion set bound to an instance.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MotionSetId(pub u32);

/// Port position on a node (input or output side depending on context).
pub type PortIndex = usize;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

/// Allocate a process-unique pool id. Handles remember the pool they came from
/// so a pool can ignore handles that belong to another lane.
pub(crate) fn alloc_pool_id() -> u32 {
    NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_ids_are_unique() {
        let a = alloc_pool_id();
        let b = alloc_pool_id();
        assert_ne!(a, b);
    }

    #[test]
    fn indices_convert_to_usize() {
        assert_eq!(NodeIndex(7).index(), 7);
        assert_eq!(ParameterIndex(3).index(), 3);
    }
}
