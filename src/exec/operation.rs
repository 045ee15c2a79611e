// src/exec/operation.rs

//! The seam between the orchestration core and the work a task performs.
//!
//! The core never looks inside an operation: it calls [`TaskOperation::run`]
//! and receives either a [`TaskResult`] carrying metrics (such as a row count)
//! or a [`TaskError`].

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::engine::{RunId, TaskName};
use crate::errors::TaskError;
use crate::types::TaskKind;

/// Metrics reported by a successful operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskResult {
    pub metrics: BTreeMap<String, i64>,
}

impl TaskResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a result carrying only a `rows` metric.
    pub fn rows(count: i64) -> Self {
        Self::new().with_metric("rows", count)
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: i64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn metric(&self, name: &str) -> Option<i64> {
        self.metrics.get(name).copied()
    }
}

/// Everything an operation (or gate) gets to see about the attempt it runs in.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub run_id: RunId,
    pub task: TaskName,
    pub kind: TaskKind,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Global `[vars]` merged with the task's own params (params win).
    pub vars: Arc<BTreeMap<String, String>>,
    /// Fires when the run is cancelled.
    pub cancel: CancellationToken,
}

pub type OperationFuture<'a> =
    Pin<Box<dyn Future<Output = Result<TaskResult, TaskError>> + Send + 'a>>;

/// The work a task performs.
///
/// # Idempotency
///
/// Retries and resumed runs re-invoke an operation whose earlier attempt may
/// have partially written data. `Load` and `Transform` operations must
/// therefore be safe to execute again without duplicating rows, e.g. by
/// deleting/overwriting their target or upserting by key. The runner cannot
/// observe side effects and does not enforce this.
///
/// Two tasks writing the same target object must be ordered by a dependency;
/// the scheduler does not detect such write races.
pub trait TaskOperation: Send + Sync {
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> OperationFuture<'a>;
}

/// Operation with no work; used for barriers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopOperation;

impl TaskOperation for NoopOperation {
    fn run<'a>(&'a self, _ctx: &'a TaskContext) -> OperationFuture<'a> {
        Box::pin(async { Ok(TaskResult::default()) })
    }
}

/// Adapter turning an async closure into a [`TaskOperation`].
pub struct FnOperation<F> {
    f: F,
}

impl<F, Fut> TaskOperation for FnOperation<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskResult, TaskError>> + Send + 'static,
{
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> OperationFuture<'a> {
        Box::pin((self.f)(ctx.clone()))
    }
}

/// Wrap an async closure as a shareable operation.
pub fn operation_fn<F, Fut>(f: F) -> Arc<dyn TaskOperation>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskResult, TaskError>> + Send + 'static,
{
    Arc::new(FnOperation { f })
}
