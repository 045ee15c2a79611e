// src/engine/mod.rs

//! Orchestration engine for stagegate.
//!
//! This module ties together:
//! - the DAG scheduler (pure state machine in [`crate::dag`])
//! - the task runners that execute dispatched tasks
//! - the run ledger that records every transition
//! - the runtime event loop that reacts to:
//!   - task completion events
//!   - cancellation of the run
//!
//! The async/IO shell is implemented in [`runtime`]; [`report`] renders the
//! final per-task summary.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::errors::TaskError;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Identifier of one run in the ledger.
pub type RunId = String;

/// Outcome of a task runner for the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Succeeded,
    Failed(TaskError),
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded)
    }
}

/// Events flowing into the runtime from task runners.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A runner drove its task to a terminal state.
    TaskCompleted {
        task: TaskName,
        outcome: TaskOutcome,
    },
    /// A runner could not finish its bookkeeping (ledger write failed or
    /// the runner panicked). The run is aborted.
    TaskAborted { task: TaskName, error: String },
}

/// Executor options (from `[config]`, possibly overridden on the CLI).
#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    /// Maximum number of tasks running at the same time.
    pub concurrency: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Per-run inputs that are not part of the graph.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Global variables visible to every task (task params win).
    pub vars: BTreeMap<String, String>,
    /// Cancelling this token cancels the run.
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vars(mut self, vars: BTreeMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

pub mod report;
pub mod runtime;

pub use report::RunReport;
pub use runtime::Executor;
