#![allow(dead_code)]

use std::collections::BTreeMap;

use stagegate::config::model::{
    ConfigFile, ConfigSection, GateConfig, RawConfigFile, RetryConfig, TaskConfig,
};
use stagegate::errors::Result;
use stagegate::types::{LedgerStorageMode, TaskKind};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                vars: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn var(mut self, name: &str, value: &str) -> Self {
        self.config.vars.insert(name.to_string(), value.to_string());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.config.concurrency = n;
        self
    }

    pub fn memory_ledger(mut self) -> Self {
        self.config.config.ledger = LedgerStorageMode::Memory;
        self
    }

    pub fn default_timeout(mut self, timeout: &str) -> Self {
        self.config.config.default_timeout = timeout.to_string();
        self
    }

    /// Validate without panicking, for tests that expect an error.
    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    /// A `transform` task running `cmd`.
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                kind: TaskKind::Transform,
                cmd: Some(cmd.to_string()),
                after: vec![],
                timeout: None,
                retry: None,
                required: true,
                params: BTreeMap::new(),
                gate: vec![],
            },
        }
    }

    pub fn barrier() -> Self {
        let mut builder = Self::new("");
        builder.task.kind = TaskKind::Barrier;
        builder.task.cmd = None;
        builder
    }

    /// A `check` task with no command; add gates to it.
    pub fn check() -> Self {
        let mut builder = Self::barrier();
        builder.task.kind = TaskKind::Check;
        builder
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.task.kind = kind;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.task.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    /// Up to `max_attempts` attempts with no backoff.
    pub fn retries(mut self, max_attempts: u32) -> Self {
        self.task.retry = Some(RetryConfig {
            max_attempts: Some(max_attempts),
            initial_backoff: Some("0ms".to_string()),
            max_backoff: Some("0ms".to_string()),
            multiplier: None,
            jitter: Some(0.0),
        });
        self
    }

    pub fn optional(mut self) -> Self {
        self.task.required = false;
        self
    }

    pub fn row_count_gate(mut self, min: i64) -> Self {
        self.task.gate.push(GateConfig::RowCount {
            metric: "rows".to_string(),
            min,
        });
        self
    }

    pub fn command_gate(mut self, cmd: &str, min: i64) -> Self {
        self.task.gate.push(GateConfig::Command {
            cmd: cmd.to_string(),
            min,
            sample_cmd: None,
        });
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
