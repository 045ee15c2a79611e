// src/gate/row_count.rs

use tracing::info;

use crate::exec::{TaskContext, TaskResult};
use crate::gate::{GateFuture, QualityGate, QualityGateResult};

/// Fails when a metric reported by the operation is below `min`.
///
/// With the default metric (`rows`) and `min = 1` this is the classic
/// "not a single record was found" staging check.
#[derive(Debug, Clone)]
pub struct RowCountGate {
    metric: String,
    min: i64,
    label: String,
}

impl RowCountGate {
    pub fn new(metric: impl Into<String>, min: i64) -> Self {
        let metric = metric.into();
        let label = format!("row_count({metric}>={min})");
        Self { metric, min, label }
    }

    /// `rows >= 1`.
    pub fn non_empty() -> Self {
        Self::new("rows", 1)
    }

    pub fn check(&self, result: &TaskResult) -> QualityGateResult {
        let Some(observed) = result.metric(&self.metric) else {
            return QualityGateResult::Inconclusive {
                reason: format!("operation reported no '{}' metric", self.metric),
            };
        };

        if observed < self.min {
            let unit = if self.metric == "rows" { "rows" } else { self.metric.as_str() };
            return QualityGateResult::Fail {
                reason: format!("{observed} {unit} found, expected at least {}", self.min),
                observed: Some(observed),
            };
        }

        QualityGateResult::Pass {
            observed: Some(observed),
        }
    }
}

impl QualityGate for RowCountGate {
    fn name(&self) -> &str {
        &self.label
    }

    fn evaluate<'a>(&'a self, result: &'a TaskResult, ctx: &'a TaskContext) -> GateFuture<'a> {
        let verdict = self.check(result);
        if let QualityGateResult::Pass { observed: Some(n) } = verdict {
            info!(task = %ctx.task, metric = %self.metric, observed = n, "data quality check passed with {n} records");
        }
        Box::pin(async move { verdict })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_rows_fail() {
        let verdict = RowCountGate::non_empty().check(&TaskResult::rows(0));
        assert_eq!(
            verdict,
            QualityGateResult::Fail {
                reason: "0 rows found, expected at least 1".into(),
                observed: Some(0),
            }
        );
    }

    #[test]
    fn enough_rows_pass_and_report_count() {
        let verdict = RowCountGate::non_empty().check(&TaskResult::rows(5));
        assert_eq!(verdict, QualityGateResult::Pass { observed: Some(5) });
    }

    #[test]
    fn missing_metric_is_inconclusive() {
        let verdict = RowCountGate::new("inserted", 10).check(&TaskResult::rows(50));
        assert!(matches!(verdict, QualityGateResult::Inconclusive { .. }));
    }

    #[test]
    fn custom_metric_names_unit() {
        let gate = RowCountGate::new("counties", 3);
        let verdict = gate.check(&TaskResult::new().with_metric("counties", 2));
        assert_eq!(
            verdict.failure_reason().as_deref(),
            Some("2 counties found, expected at least 3")
        );
    }
}
