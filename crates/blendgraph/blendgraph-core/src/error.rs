//! Error types for graph construction, loading and instance control.

use serde::{Deserialize, Serialize};

/// Errors returned by fallible graph and instance operations.
///
/// Evaluation itself never fails: missing connections or unresolved motions fall back
/// to the bind pose and only raise the per-node diagnostic flag.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum GraphError {
    /// No node with this name exists in the graph
    #[error("Node not found: {name}")]
    NodeNotFound { name: String },

    /// The node exists but its parent is not a state machine
    #[error("Node '{name}' is not a state of a state machine")]
    NotAState { name: String },

    /// A state machine rejected a switch because it is blending
    #[error("State machine '{machine}' is already transitioning")]
    AlreadyTransitioning { machine: String },

    /// No parameter with this name is declared on the graph
    #[error("Parameter not found: {name}")]
    ParameterNotFound { name: String },

    #[error("Parameter index {index} out of range (count {count})")]
    ParameterIndexOutOfRange { index: usize, count: usize },

    #[error("Parameter type mismatch: expected {expected}, got {actual}")]
    ParameterTypeMismatch { expected: String, actual: String },

    /// A connection could not be created
    #[error("Invalid connection into '{target}' port {port}: {reason}")]
    InvalidConnection {
        target: String,
        port: usize,
        reason: String,
    },

    #[error("Connections form a cycle")]
    CycleDetected,

    #[error("Graph has no root node")]
    MissingRoot,

    #[error("Duplicate node name: {name}")]
    DuplicateNode { name: String },

    #[error("Duplicate parameter name: {name}")]
    DuplicateParameter { name: String },

    /// A node definition is unusable where it was placed
    #[error("Invalid node '{name}': {reason}")]
    InvalidNode { name: String, reason: String },

    #[error("Unsupported document version {version} (max {max})")]
    UnsupportedVersion { version: u32, max: u32 },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl GraphError {
    /// Errors the caller can retry later without changing the graph.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyTransitioning { .. })
    }

    /// Get error category for logging
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::NodeNotFound { .. } | Self::NotAState { .. } | Self::AlreadyTransitioning { .. } => {
                "state"
            }
            Self::ParameterNotFound { .. }
            | Self::ParameterIndexOutOfRange { .. }
            | Self::ParameterTypeMismatch { .. }
            | Self::DuplicateParameter { .. } => "parameter",
            Self::InvalidConnection { .. }
            | Self::CycleDetected
            | Self::MissingRoot
            | Self::DuplicateNode { .. }
            | Self::InvalidNode { .. } => "structure",
            Self::UnsupportedVersion { .. } | Self::Serialization { .. } => "serialization",
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transition_conflicts_are_recoverable() {
        let busy = GraphError::AlreadyTransitioning {
            machine: "Root".into(),
        };
        assert!(busy.is_recoverable());
        assert!(!GraphError::CycleDetected.is_recoverable());
    }

    #[test]
    fn categories() {
        let err = GraphError::ParameterNotFound { name: "speed".into() };
        assert_eq!(err.category(), "parameter");
        assert_eq!(GraphError::MissingRoot.category(), "structure");
    }

    #[test]
    fn serializes_round_trip() {
        let err = GraphError::NodeNotFound { name: "Idle".into() };
        let text = serde_json::to_string(&err).unwrap();
        let back: GraphError = serde_json::from_str(&text).unwrap();
        assert_eq!(err, back);
    }
}
