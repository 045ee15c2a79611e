// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::engine::TaskName;

/// A task that will not run in this run, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTask {
    pub task: TaskName,
    /// Upstream task whose failure caused the skip; `None` on cancellation.
    pub cause: Option<TaskName>,
}

/// Structured result of a single scheduler "step".
///
/// The async runtime acts on this (dispatch, record skips); tests can drive
/// the scheduler by hand and assert on it directly.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became ready and were marked `Running`, in name order.
    pub newly_scheduled: Vec<TaskName>,
    /// Tasks newly marked `Skipped` in this step.
    pub newly_skipped: Vec<SkippedTask>,
    /// Whether this step left every task in a terminal state.
    pub run_just_finished: bool,
}
