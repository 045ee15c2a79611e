// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`operation`] defines the `TaskOperation` seam plus the context and
//!   result types that flow through it.
//! - [`command`] provides `ShellOperation`, which runs a task's `cmd`
//!   through the platform shell.
//! - [`retry`] holds the retry policy and backoff computation.
//! - [`runner`] drives one task through its attempts and records each
//!   transition in the run ledger.

pub mod command;
pub mod operation;
pub mod retry;
pub mod runner;

pub use command::ShellOperation;
pub use operation::{
    FnOperation, NoopOperation, OperationFuture, TaskContext, TaskOperation, TaskResult,
    operation_fn,
};
pub use retry::RetryPolicy;
pub use runner::TaskRunner;
