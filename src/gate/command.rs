// src/gate/command.rs

use tracing::{info, warn};

use crate::exec::command::{render_command, run_shell};
use crate::exec::{TaskContext, TaskResult};
use crate::gate::{GateFuture, QualityGate, QualityGateResult};

/// Number of sample lines logged after a passing check.
const SAMPLE_LINES: usize = 5;

/// Runs a count command (e.g. `psql -tAc "SELECT COUNT(*) FROM {table}"`) and
/// checks the first integer it prints.
///
/// - command cannot run, exits non-zero or prints no integer: `Inconclusive`
/// - count below `min`: `Fail`
/// - otherwise `Pass`, and the first lines of `sample_cmd` are logged.
#[derive(Debug, Clone)]
pub struct CommandGate {
    cmd: String,
    min: i64,
    sample_cmd: Option<String>,
}

impl CommandGate {
    pub fn new(cmd: impl Into<String>, min: i64) -> Self {
        Self {
            cmd: cmd.into(),
            min,
            sample_cmd: None,
        }
    }

    pub fn with_sample(mut self, sample_cmd: impl Into<String>) -> Self {
        self.sample_cmd = Some(sample_cmd.into());
        self
    }

    async fn count(&self, ctx: &TaskContext) -> Result<i64, String> {
        let rendered = render_command(&self.cmd, &ctx.vars)
            .map_err(|missing| format!("unknown placeholder '{{{missing}}}' in check"))?;
        info!(task = %ctx.task, query = %rendered, "executing check");

        let output = run_shell(&rendered, &ctx.vars, &ctx.task)
            .await
            .map_err(|e| format!("{e:#}"))?;
        if !output.success {
            return Err(format!("check command exited with code {}", output.code));
        }

        output
            .stdout
            .iter()
            .find_map(|line| line.trim().parse::<i64>().ok())
            .ok_or_else(|| "check returned no results".to_string())
    }

    async fn log_sample(&self, sample_cmd: &str, ctx: &TaskContext) {
        let rendered = match render_command(sample_cmd, &ctx.vars) {
            Ok(r) => r,
            Err(missing) => {
                warn!(task = %ctx.task, placeholder = %missing, "cannot render sample command");
                return;
            }
        };

        match run_shell(&rendered, &ctx.vars, &ctx.task).await {
            Ok(output) => {
                for line in output.stdout.iter().take(SAMPLE_LINES) {
                    info!(task = %ctx.task, "sample: {}", line);
                }
            }
            Err(e) => warn!(task = %ctx.task, error = %e, "sample command failed"),
        }
    }
}

impl QualityGate for CommandGate {
    fn name(&self) -> &str {
        "command"
    }

    fn evaluate<'a>(&'a self, _result: &'a TaskResult, ctx: &'a TaskContext) -> GateFuture<'a> {
        Box::pin(async move {
            let observed = match self.count(ctx).await {
                Ok(n) => n,
                Err(reason) => return QualityGateResult::Inconclusive { reason },
            };

            if observed < self.min {
                return QualityGateResult::Fail {
                    reason: format!("{observed} rows found, expected at least {}", self.min),
                    observed: Some(observed),
                };
            }

            info!(task = %ctx.task, observed, "data quality check passed with {observed} records");
            if let Some(sample_cmd) = &self.sample_cmd {
                self.log_sample(sample_cmd, ctx).await;
            }

            QualityGateResult::Pass {
                observed: Some(observed),
            }
        })
    }
}
