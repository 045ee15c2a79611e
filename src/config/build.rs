// src/config/build.rs

//! Turn a validated configuration into an executable task graph.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::model::{ConfigFile, ConfigSection, GateConfig, TaskConfig, parse_duration};
use crate::dag::{Graph, GraphBuilder, Task};
use crate::engine::ExecutorOptions;
use crate::errors::{Result, StagegateError};
use crate::exec::{NoopOperation, RetryPolicy, ShellOperation, TaskOperation};
use crate::gate::{CommandGate, QualityGate, RowCountGate};

impl ConfigFile {
    /// Build the task graph described by `[task.*]`.
    pub fn build_graph(&self) -> Result<Graph> {
        build_graph(&self.config, &self.task)
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            concurrency: self.config.concurrency,
        }
    }
}

pub(crate) fn build_graph(
    section: &ConfigSection,
    tasks: &BTreeMap<String, TaskConfig>,
) -> Result<Graph> {
    let default_timeout = parse_duration(&section.default_timeout)
        .map_err(|e| config_error("[config].default_timeout", e))?;

    let mut builder = GraphBuilder::new();
    for (name, cfg) in tasks {
        let mut task = Task::new(name.clone(), cfg.kind, operation_for(cfg))
            .with_timeout(default_timeout)
            .with_retry(
                RetryPolicy::from_config(&cfg.retry.clone().unwrap_or_default().or(&section.retry))
                    .map_err(|e| config_error(&format!("task '{name}'"), e))?,
            );

        if let Some(timeout) = &cfg.timeout {
            task = task.with_timeout(
                parse_duration(timeout).map_err(|e| config_error(&format!("task '{name}'.timeout"), e))?,
            );
        }
        for gate in &cfg.gate {
            task = task.with_gate(gate_for(gate));
        }
        for (key, value) in &cfg.params {
            task = task.with_param(key.clone(), value.clone());
        }
        if !cfg.required {
            task = task.optional();
        }

        builder.add_task(task)?;
    }

    for (name, cfg) in tasks {
        for dep in &cfg.after {
            builder.add_dependency(name, dep)?;
        }
    }

    builder.validate()
}

fn operation_for(cfg: &TaskConfig) -> Arc<dyn TaskOperation> {
    match &cfg.cmd {
        Some(cmd) => Arc::new(ShellOperation::new(cmd.clone())),
        None => Arc::new(NoopOperation),
    }
}

fn gate_for(cfg: &GateConfig) -> Arc<dyn QualityGate> {
    match cfg {
        GateConfig::RowCount { metric, min } => Arc::new(RowCountGate::new(metric.clone(), *min)),
        GateConfig::Command {
            cmd,
            min,
            sample_cmd,
        } => {
            let gate = CommandGate::new(cmd.clone(), *min);
            match sample_cmd {
                Some(sample) => Arc::new(gate.with_sample(sample.clone())),
                None => Arc::new(gate),
            }
        }
    }
}

fn config_error(what: &str, msg: String) -> StagegateError {
    StagegateError::ConfigError(format!("{what}: {msg}"))
}
