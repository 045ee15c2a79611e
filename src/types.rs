// src/types.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a task does in the warehouse pipeline.
///
/// The kind does not change how a task is executed; it documents intent and
/// decides defaults (a `Barrier` has no operation and no gates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Copy a source extract into a staging table.
    Load,
    /// Build a fact/dimension table from staged data.
    Transform,
    /// Standalone validation step (e.g. a row count query).
    Check,
    /// Pure synchronisation point with no work of its own.
    Barrier,
}

impl Default for TaskKind {
    fn default() -> Self {
        TaskKind::Transform
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskKind::Load => "load",
            TaskKind::Transform => "transform",
            TaskKind::Check => "check",
            TaskKind::Barrier => "barrier",
        };
        f.write_str(s)
    }
}

/// State of a task within one run.
///
/// `Pending -> Running -> {Succeeded, Failed}`, `Failed -> Running` on retry,
/// and `Pending -> Skipped` when an upstream task failed or the run was
/// cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
            TaskState::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// Overall status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    PartiallyFailed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::PartiallyFailed => "PARTIALLY_FAILED",
        };
        f.write_str(s)
    }
}

/// Where the run ledger keeps its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStorageMode {
    /// Append-only JSON files under `ledger_dir` (survive restarts).
    File,
    /// In-process only; nothing survives the process.
    Memory,
}

impl Default for LedgerStorageMode {
    fn default() -> Self {
        LedgerStorageMode::File
    }
}
