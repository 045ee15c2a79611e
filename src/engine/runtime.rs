// src/engine/runtime.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::{Graph, Scheduler, SchedulerStep, Task};
use crate::errors::{Result, StagegateError};
use crate::exec::TaskRunner;
use crate::ledger::{LedgerStore, Run, RunLedger, TransitionMetadata};
use crate::types::{RunStatus, TaskState};

use super::{ExecutorOptions, RunContext, RuntimeEvent, TaskName};

/// Runs task graphs and records them in a ledger.
///
/// The pure [`Scheduler`] decides what runs; this type is the async shell
/// around it: it spawns a runner per dispatched task, waits for completion
/// events on a channel and feeds them back into the scheduler.
pub struct Executor {
    store: Arc<dyn LedgerStore>,
    options: ExecutorOptions,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(store: Arc<dyn LedgerStore>, options: ExecutorOptions) -> Self {
        Self { store, options }
    }

    /// Execute `graph` as a new run.
    pub async fn execute(&self, graph: Arc<Graph>, ctx: RunContext) -> Result<Run> {
        let ledger = Arc::new(RunLedger::create(self.store.clone(), &graph)?);
        info!(run_id = %ledger.run_id(), tasks = graph.len(), "starting run");

        let scheduler = Scheduler::new(graph, self.options.concurrency);
        self.drive(scheduler, ledger, ctx).await
    }

    /// Continue a recorded run.
    ///
    /// Tasks that succeeded earlier are kept unless named in `force`; every
    /// other task is reset to `Pending` (recorded in the ledger) and runs
    /// again under the same run id.
    pub async fn resume(
        &self,
        graph: Arc<Graph>,
        run_id: &str,
        force: &BTreeSet<TaskName>,
        ctx: RunContext,
    ) -> Result<Run> {
        if let Some(unknown) = force.iter().find(|name| !graph.contains(name)) {
            return Err(StagegateError::ConfigError(format!(
                "cannot force unknown task '{unknown}'"
            )));
        }

        let ledger = Arc::new(RunLedger::open(self.store.clone(), run_id)?);
        let recorded = ledger.snapshot().await;

        if let Some(stray) = recorded.tasks.keys().find(|name| !graph.contains(name)) {
            return Err(StagegateError::LedgerMismatch(format!(
                "task '{stray}' recorded in run {run_id} is not part of the task graph"
            )));
        }

        let fingerprint = graph.fingerprint();
        if recorded.graph_fingerprint != fingerprint {
            warn!(
                run_id,
                recorded = %recorded.graph_fingerprint,
                current = %fingerprint,
                "task graph changed since the run was recorded"
            );
            ledger.set_fingerprint(fingerprint).await;
        }

        let mut prior: BTreeMap<TaskName, TaskState> = BTreeMap::new();
        for name in graph.tasks() {
            let name = name.to_string();
            let state = match recorded.state_of(&name) {
                None => {
                    debug!(task = %name, "task new to this run; starting pending");
                    ledger.ensure_task(&name).await;
                    TaskState::Pending
                }
                Some(TaskState::Succeeded) if !force.contains(&name) => TaskState::Succeeded,
                Some(TaskState::Pending) => TaskState::Pending,
                Some(state) => {
                    let note = if state == TaskState::Succeeded {
                        "forced re-run"
                    } else {
                        "reset for resume"
                    };
                    ledger
                        .record_transition(&name, state, TaskState::Pending, TransitionMetadata::note(note))
                        .await?;
                    TaskState::Pending
                }
            };
            prior.insert(name, state);
        }

        info!(
            run_id,
            kept = prior.values().filter(|s| **s == TaskState::Succeeded).count(),
            rerun = prior.values().filter(|s| **s == TaskState::Pending).count(),
            "resuming run"
        );

        let scheduler = Scheduler::with_states(graph, self.options.concurrency, &prior);
        self.drive(scheduler, ledger, ctx).await
    }

    /// Main event loop for one run.
    async fn drive(
        &self,
        mut scheduler: Scheduler,
        ledger: Arc<RunLedger>,
        ctx: RunContext,
    ) -> Result<Run> {
        ledger.set_status(RunStatus::Running).await?;

        let (tx, mut rx) = mpsc::channel::<RuntimeEvent>(64);
        let runner = TaskRunner::new(ledger.clone(), Arc::new(ctx.vars), ctx.cancel.clone());
        let cancel = ctx.cancel;
        let mut cancelled = false;

        let mut step = scheduler.step_start();

        loop {
            self.apply_step(&scheduler, &step, &ledger, &runner, &tx).await?;

            if step.run_just_finished || scheduler.is_finished() {
                break;
            }

            let event = tokio::select! {
                _ = cancel.cancelled(), if !cancelled => {
                    info!(run_id = %ledger.run_id(), "cancellation requested");
                    cancelled = true;
                    step = scheduler.step_cancel();
                    continue;
                }
                event = rx.recv() => event,
            };

            debug!(?event, "runtime received event");

            match event {
                Some(RuntimeEvent::TaskCompleted { task, outcome }) => {
                    step = scheduler.step_completion(&task, outcome.is_success());
                }
                Some(RuntimeEvent::TaskAborted { task, error }) => {
                    error!(task = %task, error = %error, "aborting run");
                    cancel.cancel();
                    return Err(StagegateError::Other(anyhow!(
                        "task '{task}' aborted: {error}"
                    )));
                }
                None => {
                    return Err(StagegateError::Other(anyhow!(
                        "runtime event channel closed unexpectedly"
                    )));
                }
            }
        }

        let status = scheduler.run_status();
        ledger.set_status(status).await?;
        info!(run_id = %ledger.run_id(), status = %status, "run finished");

        Ok(ledger.snapshot().await)
    }

    /// Record skips and spawn runners for what the scheduler just decided.
    async fn apply_step(
        &self,
        scheduler: &Scheduler,
        step: &SchedulerStep,
        ledger: &RunLedger,
        runner: &TaskRunner,
        tx: &mpsc::Sender<RuntimeEvent>,
    ) -> Result<()> {
        for skipped in &step.newly_skipped {
            let metadata = match &skipped.cause {
                Some(upstream) => TransitionMetadata {
                    cause: Some(upstream.clone()),
                    note: Some(format!("upstream task '{upstream}' failed")),
                    ..Default::default()
                },
                None => TransitionMetadata::note("run cancelled"),
            };
            ledger
                .record_transition(&skipped.task, TaskState::Pending, TaskState::Skipped, metadata)
                .await?;
        }

        if step.newly_scheduled.is_empty() {
            return Ok(());
        }
        debug!(tasks = ?step.newly_scheduled, "spawning ready tasks");

        for name in &step.newly_scheduled {
            let task = scheduler.graph().task(name).cloned().ok_or_else(|| {
                StagegateError::Other(anyhow!("scheduled task '{name}' missing from graph"))
            })?;
            spawn_runner(task, runner.clone(), tx.clone());
        }

        Ok(())
    }
}

/// Run one task on its own tokio task and report back over `tx`.
fn spawn_runner(task: Arc<Task>, runner: TaskRunner, tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        let name = task.name.clone();
        let handle = tokio::spawn(async move { runner.run(&task).await });

        let event = match handle.await {
            Ok(Ok(outcome)) => RuntimeEvent::TaskCompleted {
                task: name,
                outcome,
            },
            Ok(Err(err)) => RuntimeEvent::TaskAborted {
                task: name,
                error: err.to_string(),
            },
            Err(join_err) => RuntimeEvent::TaskAborted {
                task: name,
                error: format!("runner panicked: {join_err}"),
            },
        };

        // The receiver is gone only if the run was already aborted.
        let _ = tx.send(event).await;
    });
}

