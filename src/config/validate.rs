// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::build::build_graph;
use crate::config::model::{ConfigFile, GateConfig, RawConfigFile, TaskConfig, parse_duration};
use crate::errors::{Result, StagegateError};
use crate::exec::RetryPolicy;
use crate::exec::command::placeholders;
use crate::types::TaskKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::StagegateError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.vars, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    for (name, task) in &cfg.task {
        validate_task(cfg, name, task)?;
    }
    // Dependencies and acyclicity are checked by the graph builder itself.
    build_graph(&cfg.config, &cfg.task)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(StagegateError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.concurrency == 0 {
        return Err(StagegateError::ConfigError(
            "[config].concurrency must be >= 1 (got 0)".to_string(),
        ));
    }

    parse_duration(&cfg.config.default_timeout).map_err(|e| {
        StagegateError::ConfigError(format!("[config].default_timeout: {e}"))
    })?;

    RetryPolicy::from_config(&cfg.config.retry)
        .map_err(|e| StagegateError::ConfigError(format!("[config.retry]: {e}")))?;

    Ok(())
}

fn validate_task(cfg: &RawConfigFile, name: &str, task: &TaskConfig) -> Result<()> {
    let err = |msg: String| StagegateError::ConfigError(format!("task '{name}': {msg}"));

    match (task.kind, &task.cmd) {
        (TaskKind::Barrier, Some(_)) => {
            return Err(err("barrier tasks must not have a `cmd`".to_string()));
        }
        (TaskKind::Barrier, None) if !task.gate.is_empty() => {
            return Err(err("barrier tasks cannot have gates".to_string()));
        }
        // A check may consist of its gates alone.
        (TaskKind::Check, None) if task.gate.is_empty() => {
            return Err(err("check tasks require a `cmd` or at least one gate".to_string()));
        }
        (kind @ (TaskKind::Load | TaskKind::Transform), None) => {
            return Err(err(format!("{kind} tasks require a `cmd`")));
        }
        _ => {}
    }

    if let Some(timeout) = &task.timeout {
        parse_duration(timeout).map_err(|e| err(format!("timeout: {e}")))?;
    }

    // Unknown placeholders would only surface at run time otherwise.
    let known: BTreeSet<&str> = cfg
        .vars
        .keys()
        .chain(task.params.keys())
        .map(String::as_str)
        .collect();

    let mut templates: Vec<(&str, &str)> = Vec::new();
    if let Some(cmd) = &task.cmd {
        templates.push(("cmd", cmd.as_str()));
    }
    for gate in &task.gate {
        match gate {
            GateConfig::RowCount { .. } => {}
            GateConfig::Command {
                cmd, sample_cmd, ..
            } => {
                templates.push(("gate cmd", cmd.as_str()));
                if let Some(sample) = sample_cmd {
                    templates.push(("gate sample_cmd", sample.as_str()));
                }
            }
        }
    }

    for (field, template) in templates {
        if let Some(missing) = placeholders(template)
            .into_iter()
            .find(|p| !known.contains(p.as_str()))
        {
            return Err(err(format!(
                "unknown placeholder '{{{missing}}}' in {field} (define it in `params` or [vars])"
            )));
        }
    }

    Ok(())
}
