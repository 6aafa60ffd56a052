//! DAG model: the pure, declarative description of a workflow loaded from
//! YAML. See [`graph`](crate::graph) for what actually runs a [`Dag`].

pub mod error;
pub mod loader;
pub mod types;
pub mod validate;

pub use error::{DagError, Result};
pub use loader::{identity_path, load, parse, LoadOptions};
pub use types::{
    ContinueOn, Dag, ExecutorConfig, HandlerOn, Precondition, RepeatMode, RepeatPolicy,
    RetryPolicy, Schedule, ScheduleKind, Step,
};
