// src/ledger/model.rs

//! Records kept by the run ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dag::Graph;
use crate::engine::{RunId, TaskName};
use crate::gate::GateRecord;
use crate::types::{RunStatus, TaskState};

/// Extra facts attached to a transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set on a `Failed` transition that ends the task for this run.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gates: Vec<GateRecord>,
    /// Metric observed by the deciding gate, e.g. the row count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<i64>,
    /// Upstream task that caused a skip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<TaskName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TransitionMetadata {
    pub fn attempt(attempt: u32) -> Self {
        Self {
            attempt: Some(attempt),
            ..Default::default()
        }
    }

    pub fn note(note: impl Into<String>) -> Self {
        Self {
            note: Some(note.into()),
            ..Default::default()
        }
    }
}

/// One entry of the append-only transition log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Position in the run's log, starting at 1.
    pub seq: u64,
    pub run_id: RunId,
    pub task: TaskName,
    pub from: TaskState,
    pub to: TaskState,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: TransitionMetadata,
}

/// Latest known state of one task within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    pub task: TaskName,
    pub run_id: RunId,
    pub state: TaskState,
    /// Attempts started in this run, counted across resumes.
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    #[serde(default)]
    pub gates: Vec<GateRecord>,
    #[serde(default)]
    pub metrics: BTreeMap<String, i64>,
    pub observed: Option<i64>,
    pub skipped_because: Option<TaskName>,
}

impl TaskRun {
    pub fn new(task: TaskName, run_id: RunId) -> Self {
        Self {
            task,
            run_id,
            state: TaskState::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            last_error: None,
            gates: Vec::new(),
            metrics: BTreeMap::new(),
            observed: None,
            skipped_because: None,
        }
    }

    /// Fold one transition into the materialised view.
    pub fn apply(&mut self, t: &Transition) {
        self.state = t.to;
        let meta = &t.metadata;

        match t.to {
            TaskState::Running => {
                self.attempts += 1;
                self.started_at = Some(t.at);
                self.finished_at = None;
                self.gates.clear();
                self.observed = None;
            }
            TaskState::Succeeded => {
                self.finished_at = Some(t.at);
                self.metrics = meta.metrics.clone();
                self.gates = meta.gates.clone();
                self.observed = meta.observed;
            }
            TaskState::Failed => {
                self.finished_at = Some(t.at);
                if meta.error.is_some() {
                    self.last_error = meta.error.clone();
                }
                if !meta.metrics.is_empty() {
                    self.metrics = meta.metrics.clone();
                }
                self.gates = meta.gates.clone();
                self.observed = meta.observed;
            }
            TaskState::Skipped => {
                self.finished_at = Some(t.at);
                self.skipped_because = meta.cause.clone();
            }
            TaskState::Pending => {
                self.finished_at = None;
                self.skipped_because = None;
            }
        }
    }
}

/// A pipeline execution and the latest state of each of its tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub graph_fingerprint: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tasks: BTreeMap<TaskName, TaskRun>,
    /// Sequence number of the last transition folded into `tasks`.
    pub last_seq: u64,
}

impl Run {
    /// New `Pending` run with one `Pending` task record per graph task.
    pub fn new(run_id: RunId, graph: &Graph) -> Self {
        let tasks = graph
            .tasks()
            .map(|name| (name.to_string(), TaskRun::new(name.to_string(), run_id.clone())))
            .collect();

        Self {
            run_id,
            graph_fingerprint: graph.fingerprint(),
            status: RunStatus::Pending,
            created_at: Utc::now(),
            finished_at: None,
            tasks,
            last_seq: 0,
        }
    }

    pub fn task_run(&self, task: &str) -> Option<&TaskRun> {
        self.tasks.get(task)
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|t| t.state)
    }

    /// Fold a transition into the latest-state view.
    pub fn apply(&mut self, t: &Transition) {
        let run_id = self.run_id.clone();
        self.tasks
            .entry(t.task.clone())
            .or_insert_with(|| TaskRun::new(t.task.clone(), run_id))
            .apply(t);
        self.last_seq = self.last_seq.max(t.seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::QualityGateResult;

    fn transition(seq: u64, from: TaskState, to: TaskState, metadata: TransitionMetadata) -> Transition {
        Transition {
            seq,
            run_id: "r1".into(),
            task: "transform".into(),
            from,
            to,
            at: Utc::now(),
            metadata,
        }
    }

    #[test]
    fn retry_history_materialises_latest_state() {
        let mut tr = TaskRun::new("transform".into(), "r1".into());

        tr.apply(&transition(1, TaskState::Pending, TaskState::Running, TransitionMetadata::attempt(1)));
        tr.apply(&transition(
            2,
            TaskState::Running,
            TaskState::Failed,
            TransitionMetadata {
                attempt: Some(1),
                error: Some("0 rows found, expected at least 1".into()),
                observed: Some(0),
                gates: vec![GateRecord {
                    gate: "row_count".into(),
                    result: QualityGateResult::Fail {
                        reason: "0 rows found, expected at least 1".into(),
                        observed: Some(0),
                    },
                }],
                ..Default::default()
            },
        ));
        assert_eq!(tr.state, TaskState::Failed);
        assert_eq!(tr.observed, Some(0));

        tr.apply(&transition(3, TaskState::Failed, TaskState::Running, TransitionMetadata::attempt(2)));
        assert_eq!(tr.attempts, 2);
        assert!(tr.gates.is_empty());

        tr.apply(&transition(
            4,
            TaskState::Running,
            TaskState::Succeeded,
            TransitionMetadata {
                metrics: BTreeMap::from([("rows".to_string(), 3)]),
                observed: Some(3),
                ..Default::default()
            },
        ));
        assert_eq!(tr.state, TaskState::Succeeded);
        assert_eq!(tr.metrics.get("rows"), Some(&3));
        assert_eq!(tr.observed, Some(3));
        assert!(tr.finished_at.is_some());
    }

    #[test]
    fn metadata_serialises_compactly() {
        let json = serde_json::to_string(&TransitionMetadata::attempt(2)).unwrap();
        assert_eq!(json, r#"{"attempt":2}"#);
        let back: TransitionMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(back, TransitionMetadata::default());
    }
}
