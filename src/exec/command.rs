// src/exec/command.rs

//! Shell-command operations.
//!
//! This is how the CLI plugs real work into the core: each task's `cmd` is
//! run through the platform shell, with `{placeholders}` substituted from the
//! task context. Lines of the form `name=<integer>` on stdout become metrics
//! (e.g. `rows=42`).

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::TaskError;
use crate::exec::operation::{OperationFuture, TaskContext, TaskOperation, TaskResult};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex is valid")
});

static METRIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)=(-?\d+)\s*$").expect("metric regex is valid")
});

/// Names of all `{placeholders}` used in a command template.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Substitute `{name}` placeholders. Returns the first unknown name as error.
pub fn render_command(template: &str, vars: &BTreeMap<String, String>) -> Result<String, String> {
    if let Some(missing) = placeholders(template)
        .into_iter()
        .find(|name| !vars.contains_key(name))
    {
        return Err(missing);
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| vars[&caps[1]].clone())
        .into_owned())
}

/// Parse `name=<integer>` lines into metrics.
pub fn parse_metrics<'a>(lines: impl IntoIterator<Item = &'a str>) -> BTreeMap<String, i64> {
    let mut metrics = BTreeMap::new();
    for line in lines {
        if let Some(caps) = METRIC_LINE.captures(line) {
            if let Ok(value) = caps[2].parse::<i64>() {
                metrics.insert(caps[1].to_string(), value);
            }
        }
    }
    metrics
}

/// Captured result of a finished shell command.
#[derive(Debug, Clone)]
pub struct ShellOutput {
    pub success: bool,
    pub code: i32,
    pub stdout: Vec<String>,
}

/// Run `cmd` through the platform shell and collect its stdout.
///
/// Template variables are also exported as `STAGEGATE_<NAME>` environment
/// variables. The child is killed if the returned future is dropped, which is
/// how timeouts and cancellation stop a running command.
pub async fn run_shell(cmd: &str, vars: &BTreeMap<String, String>, label: &str) -> Result<ShellOutput> {
    // Build a shell command appropriate for the platform.
    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    for (name, value) in vars {
        command.env(format!("STAGEGATE_{}", name.to_uppercase()), value);
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning process for '{label}'"))?;

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let label = label.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %label, "stderr: {}", line);
            }
        });
    }

    let mut stdout_lines = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("reading stdout of '{label}'"))?
        {
            debug!(task = %label, "stdout: {}", line);
            stdout_lines.push(line);
        }
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of '{label}'"))?;

    Ok(ShellOutput {
        success: status.success(),
        code: status.code().unwrap_or(-1),
        stdout: stdout_lines,
    })
}

/// Runs a shell command as a task operation.
#[derive(Debug, Clone)]
pub struct ShellOperation {
    cmd: String,
}

impl ShellOperation {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }
}

impl TaskOperation for ShellOperation {
    fn run<'a>(&'a self, ctx: &'a TaskContext) -> OperationFuture<'a> {
        Box::pin(async move {
            let rendered = render_command(&self.cmd, &ctx.vars).map_err(|missing| {
                TaskError::Operation(format!("unknown placeholder '{{{missing}}}' in cmd"))
            })?;

            info!(
                task = %ctx.task,
                run_id = %ctx.run_id,
                attempt = ctx.attempt,
                cmd = %rendered,
                "starting task process"
            );

            let output = run_shell(&rendered, &ctx.vars, &ctx.task)
                .await
                .map_err(|e| TaskError::Operation(format!("{e:#}")))?;

            info!(
                task = %ctx.task,
                run_id = %ctx.run_id,
                exit_code = output.code,
                success = output.success,
                "task process exited"
            );

            if !output.success {
                return Err(TaskError::Operation(format!(
                    "command exited with code {}",
                    output.code
                )));
            }

            Ok(TaskResult {
                metrics: parse_metrics(output.stdout.iter().map(String::as_str)),
            })
        })
    }
}
