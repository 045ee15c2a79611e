// src/gate/mod.rs

//! Quality gates: checks evaluated after a task's operation succeeds.
//!
//! A task may carry several gates; all of them must pass for the task to
//! succeed. A gate that cannot reach a verdict (its own check errored) is
//! `Inconclusive`, which blocks dependents exactly like `Fail` but is
//! reported separately.
//!
//! - [`row_count`] checks a metric reported by the operation itself.
//! - [`command`] runs a separate count command (e.g. `SELECT COUNT(*)`).

pub mod command;
pub mod row_count;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::exec::{TaskContext, TaskResult};

pub use command::CommandGate;
pub use row_count::RowCountGate;

/// Verdict of a single gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityGateResult {
    Pass { observed: Option<i64> },
    Fail { reason: String, observed: Option<i64> },
    Inconclusive { reason: String },
}

impl QualityGateResult {
    pub fn pass() -> Self {
        QualityGateResult::Pass { observed: None }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, QualityGateResult::Pass { .. })
    }

    /// The metric the gate looked at, if any.
    pub fn observed(&self) -> Option<i64> {
        match self {
            QualityGateResult::Pass { observed } | QualityGateResult::Fail { observed, .. } => {
                *observed
            }
            QualityGateResult::Inconclusive { .. } => None,
        }
    }

    /// Human-readable reason for a non-passing result.
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            QualityGateResult::Pass { .. } => None,
            QualityGateResult::Fail { reason, .. } => Some(reason.clone()),
            QualityGateResult::Inconclusive { reason } => {
                Some(format!("check inconclusive: {reason}"))
            }
        }
    }
}

/// A gate verdict tagged with the gate that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRecord {
    pub gate: String,
    pub result: QualityGateResult,
}

pub type GateFuture<'a> = Pin<Box<dyn Future<Output = QualityGateResult> + Send + 'a>>;

/// A post-task check.
pub trait QualityGate: Send + Sync {
    /// Short label used in logs and the ledger.
    fn name(&self) -> &str;

    fn evaluate<'a>(&'a self, result: &'a TaskResult, ctx: &'a TaskContext) -> GateFuture<'a>;
}

/// Gate that always passes; the implicit gate of tasks without checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysPass;

impl QualityGate for AlwaysPass {
    fn name(&self) -> &str {
        "always_pass"
    }

    fn evaluate<'a>(&'a self, _result: &'a TaskResult, _ctx: &'a TaskContext) -> GateFuture<'a> {
        Box::pin(async { QualityGateResult::pass() })
    }
}

/// Adapter turning a plain function of the task result into a gate.
pub struct FnGate<F> {
    name: String,
    f: F,
}

impl<F> QualityGate for FnGate<F>
where
    F: Fn(&TaskResult) -> QualityGateResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate<'a>(&'a self, result: &'a TaskResult, _ctx: &'a TaskContext) -> GateFuture<'a> {
        let verdict = (self.f)(result);
        Box::pin(async move { verdict })
    }
}

/// Wrap a function as a shareable gate.
pub fn gate_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn QualityGate>
where
    F: Fn(&TaskResult) -> QualityGateResult + Send + Sync + 'static,
{
    Arc::new(FnGate {
        name: name.into(),
        f,
    })
}

/// Evaluate every gate in order and return all verdicts.
///
/// An empty gate list behaves like a single [`AlwaysPass`].
pub async fn evaluate_all(
    gates: &[Arc<dyn QualityGate>],
    result: &TaskResult,
    ctx: &TaskContext,
) -> Vec<GateRecord> {
    let mut records = Vec::with_capacity(gates.len().max(1));

    if gates.is_empty() {
        records.push(GateRecord {
            gate: AlwaysPass.name().to_string(),
            result: AlwaysPass.evaluate(result, ctx).await,
        });
        return records;
    }

    for gate in gates {
        let verdict = gate.evaluate(result, ctx).await;
        if verdict.is_pass() {
            debug!(task = %ctx.task, gate = gate.name(), observed = ?verdict.observed(), "gate passed");
        } else {
            warn!(task = %ctx.task, gate = gate.name(), verdict = ?verdict, "gate did not pass");
        }
        records.push(GateRecord {
            gate: gate.name().to_string(),
            result: verdict,
        });
    }

    records
}

/// First non-passing verdict, if any.
pub fn first_failure(records: &[GateRecord]) -> Option<&GateRecord> {
    records.iter().find(|r| !r.result.is_pass())
}

/// The most relevant observed metric: from the first failure, else the last pass.
pub fn observed_metric(records: &[GateRecord]) -> Option<i64> {
    match first_failure(records) {
        Some(failed) => failed.result.observed(),
        None => records.iter().rev().find_map(|r| r.result.observed()),
    }
}
