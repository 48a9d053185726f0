//! Blendgraph Core (engine-agnostic)
//!
//! Evaluates animation blend graphs per character: state machines, blend nodes and
//! motion nodes produce a skeletal pose, root motion and timed events every frame.
//!
//! A [`Graph`] is an immutable node network shared between any number of
//! [`GraphInstance`]s. Each instance is updated on one worker lane at a time and borrows
//! that lane's [`EvalContext`] (pose and transient-data pools) for the duration of its
//! `update`/`output` calls.

pub mod attribute;
pub mod character;
pub mod config;
pub mod context;
pub mod error;
mod evaluation;
pub mod event;
pub mod graph;
pub mod ids;
pub mod instance;
pub mod math;
pub mod motion;
pub mod motion_instance;
pub mod node;
pub mod parameter;
pub mod pool;
pub mod selection;
pub mod skeleton;
mod unique_data;

pub type Result<T> = core::result::Result<T, GraphError>;

// Re-exports for consumers
pub use attribute::{Attribute, AttributeStore};
pub use character::Character;
pub use config::Config;
pub use context::EvalContext;
pub use error::GraphError;
pub use event::{EventBuffer, EventInfo, EventPhase, GraphEventHandler, HandlerId};
pub use graph::{Graph, GraphBuilder, GraphDocument};
pub use ids::{MotionSetId, NodeIndex, ParameterIndex, PortIndex};
pub use instance::GraphInstance;
pub use math::Transform;
pub use motion::{JointTrack, Key, Motion, MotionEvent, MotionLookup, MotionSet};
pub use motion_instance::{MotionInstance, PlayMode, PlaybackSettings};
pub use node::{
    BlendNDef, BlendTwoDef, CompareOp, MotionNodeDef, NodeCaps, NodeKind, ParameterNodeDef,
    PortKind, SetTransformDef, StateMachineDef, SyncMode, TransitionCondition,
};
pub use parameter::{ParameterKind, ValueParameter};
pub use pool::{PoolStats, PoseHandle, PosePool, RefDataHandle, RefDataPool, SlotPool};
pub use selection::{IndexMode, WeightedMotionList};
pub use skeleton::{Joint, Pose, Skeleton};
