// src/exec/runner.rs

//! Runs one task to a terminal state: attempts, gates, timeout, retries.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::dag::Task;
use crate::engine::TaskOutcome;
use crate::errors::{Result, TaskError};
use crate::exec::operation::TaskContext;
use crate::gate::{GateRecord, evaluate_all, first_failure, observed_metric};
use crate::ledger::{RunLedger, TransitionMetadata};
use crate::types::TaskState;

/// Executes a dispatched task and records every transition in the ledger.
///
/// Cheap to clone; every spawned task gets its own handle.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    ledger: Arc<RunLedger>,
    vars: Arc<BTreeMap<String, String>>,
    cancel: CancellationToken,
}

/// What one attempt produced before the verdict.
struct Attempt {
    metrics: BTreeMap<String, i64>,
    gates: Vec<GateRecord>,
    error: Option<TaskError>,
}

impl TaskRunner {
    pub fn new(
        ledger: Arc<RunLedger>,
        vars: Arc<BTreeMap<String, String>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ledger,
            vars,
            cancel,
        }
    }

    /// Drive a `Pending` task to `Succeeded` or terminal `Failed`.
    ///
    /// Only ledger failures surface as `Err`; task failures are reported in
    /// the returned outcome.
    pub async fn run(&self, task: &Task) -> Result<TaskOutcome> {
        let vars = Arc::new(self.task_vars(task));
        let mut from = TaskState::Pending;
        let mut attempt = 1;

        loop {
            self.ledger
                .record_transition(&task.name, from, TaskState::Running, TransitionMetadata::attempt(attempt))
                .await?;

            info!(
                run_id = %self.ledger.run_id(),
                task = %task.name,
                kind = %task.kind,
                attempt,
                max_attempts = task.retry.max_attempts,
                "starting attempt"
            );

            let ctx = TaskContext {
                run_id: self.ledger.run_id().to_string(),
                task: task.name.clone(),
                kind: task.kind,
                attempt,
                vars: vars.clone(),
                cancel: self.cancel.clone(),
            };

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Attempt::failed(TaskError::Cancelled),
                res = tokio::time::timeout(task.timeout, attempt_once(task, &ctx)) => match res {
                    Ok(done) => done,
                    Err(_) => Attempt::failed(TaskError::Timeout(task.timeout)),
                },
            };

            let observed = observed_metric(&outcome.gates);

            let Some(err) = outcome.error else {
                self.ledger
                    .record_transition(
                        &task.name,
                        TaskState::Running,
                        TaskState::Succeeded,
                        TransitionMetadata {
                            attempt: Some(attempt),
                            metrics: outcome.metrics,
                            gates: outcome.gates,
                            observed,
                            ..Default::default()
                        },
                    )
                    .await?;

                info!(task = %task.name, attempt, observed = ?observed, "task succeeded");
                return Ok(TaskOutcome::Succeeded);
            };

            let retry = err.is_retryable()
                && task.retry.allows_retry_after(attempt)
                && !self.cancel.is_cancelled();

            self.ledger
                .record_transition(
                    &task.name,
                    TaskState::Running,
                    TaskState::Failed,
                    TransitionMetadata {
                        attempt: Some(attempt),
                        error: Some(err.to_string()),
                        terminal: !retry,
                        metrics: outcome.metrics,
                        gates: outcome.gates,
                        observed,
                        ..Default::default()
                    },
                )
                .await?;

            if !retry {
                warn!(task = %task.name, attempt, error = %err, "task failed");
                return Ok(TaskOutcome::Failed(err));
            }

            let delay = task.retry.backoff_delay(attempt);
            warn!(
                task = %task.name,
                attempt,
                error = %err,
                retry_in = ?delay,
                "attempt failed; retrying"
            );

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.ledger
                        .record_transition(
                            &task.name,
                            TaskState::Failed,
                            TaskState::Failed,
                            TransitionMetadata {
                                attempt: Some(attempt),
                                error: Some(TaskError::Cancelled.to_string()),
                                terminal: true,
                                note: Some("cancelled during retry backoff".to_string()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    return Ok(TaskOutcome::Failed(TaskError::Cancelled));
                }
                _ = tokio::time::sleep(delay) => {}
            }

            from = TaskState::Failed;
            attempt += 1;
        }
    }

    /// Global vars with the task's own params layered on top.
    fn task_vars(&self, task: &Task) -> BTreeMap<String, String> {
        let mut vars = (*self.vars).clone();
        vars.extend(task.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars
    }
}

impl Attempt {
    fn failed(error: TaskError) -> Self {
        Self {
            metrics: BTreeMap::new(),
            gates: Vec::new(),
            error: Some(error),
        }
    }
}

/// Operation, then gates. Both count against the attempt timeout.
async fn attempt_once(task: &Task, ctx: &TaskContext) -> Attempt {
    let result = match task.operation.run(ctx).await {
        Ok(result) => result,
        Err(err) => return Attempt::failed(err),
    };

    let gates = evaluate_all(&task.gates, &result, ctx).await;
    let error = first_failure(&gates).map(|failed| TaskError::GateFailed {
        reason: failed.result.failure_reason().unwrap_or_default(),
        observed: failed.result.observed(),
    });

    Attempt {
        metrics: result.metrics,
        gates,
        error,
    }
}
