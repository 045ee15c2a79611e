use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stagegate::errors::TaskError;
use stagegate::exec::{OperationFuture, TaskContext, TaskOperation, TaskResult};

/// What one invocation of a [`ScriptedOperation`] does.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Succeed reporting `rows=<n>`.
    Rows(i64),
    /// Fail with `TaskError::Operation`.
    Fail(String),
}

/// Shared record of invocations across every operation that uses it.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Task names in invocation order (one entry per attempt).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, task: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| *t == task).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

/// A fake operation that:
/// - records each invocation in a [`CallLog`]
/// - plays back scripted steps, repeating the last one when exhausted
/// - optionally sleeps before answering
pub struct ScriptedOperation {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    delay: Duration,
    call_log: Arc<CallLog>,
}

impl ScriptedOperation {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let steps: VecDeque<Step> = steps.into_iter().collect();
        let last = steps.back().cloned().unwrap_or(Step::Rows(0));
        Self {
            steps: Mutex::new(steps),
            last: Mutex::new(last),
            delay: Duration::ZERO,
            call_log: CallLog::new(),
        }
    }

    /// Each call reports the next row count.
    pub fn rows(counts: &[i64]) -> Self {
        Self::new(counts.iter().copied().map(Step::Rows))
    }

    pub fn failing(message: &str) -> Self {
        Self::new([Step::Fail(message.to_string())])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_call_log(mut self, call_log: Arc<CallLog>) -> Self {
        self.call_log = call_log;
        self
    }

    pub fn call_log(&self) -> Arc<CallLog> {
        self.call_log.clone()
    }

    pub fn shared(self) -> Arc<dyn TaskOperation> {
        Arc::new(self)
    }

    fn next_step(&self) -> Step {
        match self.steps.lock().unwrap().pop_front() {
            Some(step) => {
                *self.last.lock().unwrap() = step.clone();
                step
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

impl TaskOperation for ScriptedOperation {
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> OperationFuture<'a> {
        Box::pin(async move {
            self.call_log.calls.lock().unwrap().push(ctx.task.clone());
            let _guard = InFlight::enter(&self.call_log);

            let step = self.next_step();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match step {
                Step::Rows(n) => Ok(TaskResult::rows(n)),
                Step::Fail(msg) => Err(TaskError::Operation(msg)),
            }
        })
    }
}

/// Counts an invocation as in flight until dropped (also on timeout/cancel).
struct InFlight<'a>(&'a CallLog);

impl<'a> InFlight<'a> {
    fn enter(calls: &'a CallLog) -> Self {
        let now = calls.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        calls.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(calls)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
