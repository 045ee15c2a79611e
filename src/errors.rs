// src/errors.rs

//! Crate-wide error types.
//!
//! - [`StagegateError`] covers graph construction, configuration and ledger
//!   problems. These abort before (or instead of) execution.
//! - [`TaskError`] is the failure of a single task attempt. It is recorded on
//!   the task's run record and never aborts unrelated parts of the graph.

use std::time::Duration;

use thiserror::Error;

use crate::engine::TaskName;

#[derive(Error, Debug)]
pub enum StagegateError {
    #[error("duplicate task: {0}")]
    DuplicateTask(TaskName),

    #[error("task '{task}' refers to unknown task '{dependency}'")]
    UnknownTask {
        task: TaskName,
        dependency: TaskName,
    },

    #[error("cycle detected in task graph involving task '{0}'")]
    Cycle(TaskName),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("ledger does not match task graph: {0}")]
    LedgerMismatch(String),

    #[error("run not found in ledger: {0}")]
    RunNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Failure of one task attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    /// The injected operation itself reported failure.
    #[error("operation failed: {0}")]
    Operation(String),

    /// The attempt did not finish within its timeout window.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The operation succeeded but a quality gate did not pass.
    #[error("{reason}")]
    GateFailed {
        reason: String,
        observed: Option<i64>,
    },

    /// The run was cancelled while this task was in flight.
    #[error("cancelled")]
    Cancelled,
}

impl TaskError {
    /// Cancellation is never retried; everything else is.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TaskError::Cancelled)
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StagegateError>;
