// src/engine/report.rs

//! Human-readable summary of a finished run.

use std::fmt;

use crate::dag::Graph;
use crate::engine::{RunId, TaskName};
use crate::ledger::Run;
use crate::types::{RunStatus, TaskState};

/// One line of the report.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskLine {
    pub task: TaskName,
    pub state: TaskState,
    pub attempts: u32,
    pub detail: Option<String>,
}

/// Terminal state of every task, in topological order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    pub lines: Vec<TaskLine>,
}

impl RunReport {
    pub fn new(run: &Run, graph: &Graph) -> Self {
        let lines = graph
            .topological_order()
            .into_iter()
            .map(|name| {
                let Some(tr) = run.task_run(&name) else {
                    return TaskLine {
                        task: name,
                        state: TaskState::Pending,
                        attempts: 0,
                        detail: None,
                    };
                };

                let detail = match tr.state {
                    TaskState::Failed => tr.last_error.clone(),
                    TaskState::Skipped => Some(match &tr.skipped_because {
                        Some(upstream) => format!("upstream task '{upstream}' failed"),
                        None => "run cancelled".to_string(),
                    }),
                    TaskState::Succeeded => tr.observed.map(|n| format!("observed {n}")),
                    _ => None,
                };

                TaskLine {
                    task: name,
                    state: tr.state,
                    attempts: tr.attempts,
                    detail,
                }
            })
            .collect();

        Self {
            run_id: run.run_id.clone(),
            status: run.status,
            lines,
        }
    }

    pub fn line(&self, task: &str) -> Option<&TaskLine> {
        self.lines.iter().find(|l| l.task == task)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TaskLine> {
        self.lines.iter().filter(|l| l.state == TaskState::Failed)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TaskLine> {
        self.lines.iter().filter(|l| l.state == TaskState::Skipped)
    }
}

impl fmt::Display for TaskLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<9} {}", self.state.to_string(), self.task)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        if self.attempts > 1 {
            write!(f, " ({} attempts)", self.attempts)?;
        }
        Ok(())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {}: {}", self.run_id, self.status)?;
        for line in &self.lines {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}
