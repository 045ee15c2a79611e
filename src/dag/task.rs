// src/dag/task.rs

//! Static task definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::TaskName;
use crate::exec::{NoopOperation, RetryPolicy, TaskOperation};
use crate::gate::QualityGate;
use crate::types::TaskKind;

/// Per-attempt timeout used when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A named unit of work. Immutable once added to a graph and shared
/// read-only between runs.
#[derive(Clone)]
pub struct Task {
    pub name: TaskName,
    pub kind: TaskKind,
    pub operation: Arc<dyn TaskOperation>,
    /// All must pass for the task to succeed. Empty means "always pass".
    pub gates: Vec<Arc<dyn QualityGate>>,
    pub retry: RetryPolicy,
    /// Applied to each attempt separately.
    pub timeout: Duration,
    /// Whether a failure of this task fails the run.
    pub required: bool,
    /// Template variables layered over the run's global vars.
    pub params: BTreeMap<String, String>,
}

impl Task {
    pub fn new(name: impl Into<TaskName>, kind: TaskKind, operation: Arc<dyn TaskOperation>) -> Self {
        Self {
            name: name.into(),
            kind,
            operation,
            gates: Vec::new(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            required: true,
            params: BTreeMap::new(),
        }
    }

    /// A synchronisation point with no work and no gates.
    pub fn barrier(name: impl Into<TaskName>) -> Self {
        Self::new(name, TaskKind::Barrier, Arc::new(NoopOperation))
    }

    pub fn with_gate(mut self, gate: Arc<dyn QualityGate>) -> Self {
        self.gates.push(gate);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Mark the task as optional: its failure alone does not fail the run.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gates: Vec<&str> = self.gates.iter().map(|g| g.name()).collect();
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("gates", &gates)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("required", &self.required)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}
