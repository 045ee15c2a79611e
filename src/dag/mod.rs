// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`task`] defines the immutable unit of work held by the graph.
//! - [`graph`] holds the builder and the validated, immutable task graph.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run, and when dependents must be skipped.
//! - [`task_info`] provides per-run task state.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task;
pub mod task_info;

pub use graph::{Graph, GraphBuilder};
pub use scheduler::Scheduler;
pub use scheduler_step::{SchedulerStep, SkippedTask};
pub use task::{DEFAULT_TIMEOUT, Task};
pub use task_info::TaskInfo;
