// src/dag/task_info.rs

//! Per-run scheduling state of a task.

use crate::engine::TaskName;
use crate::types::TaskState;

/// Static facts the scheduler needs about a task, plus its state in the
/// current run.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    /// Direct dependencies.
    pub deps: Vec<TaskName>,
    pub required: bool,
    pub state: TaskState,
    /// For `Skipped` tasks: the failed (or cancelled) upstream task, if any.
    pub skipped_because: Option<TaskName>,
}

impl TaskInfo {
    pub fn new(name: TaskName, deps: Vec<TaskName>, required: bool, state: TaskState) -> Self {
        Self {
            name,
            deps,
            required,
            state,
            skipped_because: None,
        }
    }

    /// Counts as "fine" for the run status: succeeded, or allowed to fail.
    pub fn is_satisfied_for_run(&self) -> bool {
        !self.required || self.state == TaskState::Succeeded
    }
}
