// src/ledger/mod.rs

//! Run ledger: durable record of every task state transition.
//!
//! - [`model`] holds the records (`Run`, `TaskRun`, `Transition`).
//! - [`store`] holds the `LedgerStore` trait plus the file and memory
//!   backends.
//!
//! [`RunLedger`] is the handle the executor and the task runners share. It
//! serialises writes, assigns sequence numbers and keeps the materialised
//! view in step with what has been appended to the store.

pub mod model;
pub mod store;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::dag::Graph;
use crate::engine::{RunId, TaskName};
use crate::errors::Result;
use crate::types::{RunStatus, TaskState};

pub use model::{Run, TaskRun, Transition, TransitionMetadata};
pub use store::{FileLedgerStore, LedgerStore, MemoryLedgerStore};

pub struct RunLedger {
    run_id: RunId,
    run: Mutex<Run>,
    store: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for RunLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLedger")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl RunLedger {
    /// Start a new run for `graph` under a fresh id and persist it.
    pub fn create(store: Arc<dyn LedgerStore>, graph: &Graph) -> Result<Self> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let run = Run::new(run_id.clone(), graph);
        store.persist(&run)?;

        debug!(run_id = %run_id, tasks = graph.len(), "created run");
        Ok(Self {
            run_id,
            run: Mutex::new(run),
            store,
        })
    }

    /// Reopen a previously recorded run.
    pub fn open(store: Arc<dyn LedgerStore>, run_id: &str) -> Result<Self> {
        let run = store.load(run_id)?;
        Ok(Self {
            run_id: run.run_id.clone(),
            run: Mutex::new(run),
            store,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one transition and fold it into the latest state.
    ///
    /// The transition is durable before this returns; on a store error the
    /// in-memory view is left unchanged. A `from` that disagrees with the
    /// recorded state is logged and the transition is still written.
    pub async fn record_transition(
        &self,
        task: &str,
        from: TaskState,
        to: TaskState,
        metadata: TransitionMetadata,
    ) -> Result<Transition> {
        let mut run = self.run.lock().await;

        let current = run.state_of(task).unwrap_or(TaskState::Pending);
        if current != from {
            warn!(
                run_id = %self.run_id,
                task,
                recorded = %current,
                claimed = %from,
                "transition source does not match recorded state"
            );
        }

        // Timestamps follow sequence order even if the wall clock steps back.
        let now = Utc::now();
        let at = run
            .tasks
            .values()
            .filter_map(|t| t.finished_at.max(t.started_at))
            .max()
            .map_or(now, |last| last.max(now));

        let transition = Transition {
            seq: run.last_seq + 1,
            run_id: self.run_id.clone(),
            task: task.to_string(),
            from,
            to,
            at,
            metadata,
        };

        self.store.append(&transition)?;
        run.apply(&transition);

        debug!(
            run_id = %self.run_id,
            task,
            from = %from,
            to = %to,
            seq = transition.seq,
            "recorded transition"
        );
        Ok(transition)
    }

    /// Add a `Pending` record for a task the run has not seen yet.
    pub async fn ensure_task(&self, task: &TaskName) {
        let mut run = self.run.lock().await;
        let run_id = run.run_id.clone();
        run.tasks
            .entry(task.clone())
            .or_insert_with(|| TaskRun::new(task.clone(), run_id));
    }

    /// Update the run status and persist a snapshot.
    pub async fn set_status(&self, status: RunStatus) -> Result<()> {
        let mut run = self.run.lock().await;
        run.status = status;
        run.finished_at = match status {
            RunStatus::Pending | RunStatus::Running => None,
            _ => Some(Utc::now()),
        };
        self.store.persist(&run)
    }

    pub async fn set_fingerprint(&self, fingerprint: String) {
        self.run.lock().await.graph_fingerprint = fingerprint;
    }

    /// Write a snapshot of the current state.
    pub async fn persist(&self) -> Result<()> {
        let run = self.run.lock().await;
        self.store.persist(&run)
    }

    /// Copy of the current materialised state.
    pub async fn snapshot(&self) -> Run {
        self.run.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{GraphBuilder, Task};

    fn graph() -> Graph {
        let mut b = GraphBuilder::new();
        b.add_task(Task::barrier("extract")).unwrap();
        b.add_task(Task::barrier("transform")).unwrap();
        b.add_dependency("transform", "extract").unwrap();
        b.validate().unwrap()
    }

    #[tokio::test]
    async fn transitions_are_sequenced_and_stored() {
        let store = MemoryLedgerStore::new();
        let ledger = RunLedger::create(Arc::new(store.clone()), &graph()).unwrap();

        ledger
            .record_transition("extract", TaskState::Pending, TaskState::Running, TransitionMetadata::attempt(1))
            .await
            .unwrap();
        let last = ledger
            .record_transition("extract", TaskState::Running, TaskState::Succeeded, TransitionMetadata::default())
            .await
            .unwrap();
        assert_eq!(last.seq, 2);

        let log = store.transitions(ledger.run_id());
        assert_eq!(log.len(), 2);
        assert!(log[0].at <= log[1].at);

        let snap = ledger.snapshot().await;
        assert_eq!(snap.state_of("extract"), Some(TaskState::Succeeded));
        assert_eq!(snap.state_of("transform"), Some(TaskState::Pending));
    }

    #[tokio::test]
    async fn reopened_run_sees_unsnapshotted_transitions() {
        let store = MemoryLedgerStore::new();
        let ledger = RunLedger::create(Arc::new(store.clone()), &graph()).unwrap();
        ledger
            .record_transition("extract", TaskState::Pending, TaskState::Running, TransitionMetadata::attempt(1))
            .await
            .unwrap();

        let reopened = RunLedger::open(Arc::new(store), ledger.run_id()).unwrap();
        let snap = reopened.snapshot().await;
        assert_eq!(snap.state_of("extract"), Some(TaskState::Running));
        assert_eq!(snap.last_seq, 1);
    }

    #[tokio::test]
    async fn terminal_status_sets_finish_time() {
        let store = MemoryLedgerStore::new();
        let ledger = RunLedger::create(Arc::new(store.clone()), &graph()).unwrap();
        ledger.set_status(RunStatus::Failed).await.unwrap();

        let loaded = store.load(ledger.run_id()).unwrap();
        assert_eq!(loaded.status, RunStatus::Failed);
        assert!(loaded.finished_at.is_some());
    }

    #[tokio::test]
    async fn mismatched_source_state_is_still_recorded() {
        let store = MemoryLedgerStore::new();
        let ledger = RunLedger::create(Arc::new(store.clone()), &graph()).unwrap();

        // extract is Pending, the caller claims Running.
        ledger
            .record_transition("extract", TaskState::Running, TaskState::Succeeded, TransitionMetadata::default())
            .await
            .unwrap();

        let log = store.transitions(ledger.run_id());
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].from, TaskState::Running);
        assert_eq!(ledger.snapshot().await.state_of("extract"), Some(TaskState::Succeeded));
    }
}
