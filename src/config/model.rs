// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{LedgerStorageMode, TaskKind};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// concurrency = 4
/// ledger_dir = ".stagegate/runs"
///
/// [vars]
/// iam_role = "arn:aws:iam::123456789012:role/dwh"
///
/// [task.load_crime]
/// kind = "load"
/// cmd = "./load.sh {table} {source}"
/// after = ["create_tables"]
/// params = { table = "staging_crime", source = "s3://bucket/crime.csv" }
///
/// [[task.load_crime.gate]]
/// kind = "row_count"
/// min = 1
/// ```
///
/// This is the raw, unvalidated shape. Use [`ConfigFile`] (obtained via
/// `ConfigFile::try_from` or `load_and_validate`) everywhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Variables available to every command template, from `[vars]`.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A validated configuration.
///
/// Fields are public for reading; construction goes through
/// `TryFrom<RawConfigFile>` so the invariants checked in `validate.rs` hold.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub vars: BTreeMap<String, String>,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        vars: BTreeMap<String, String>,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self { config, vars, task }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of tasks executing at the same time.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// `"file"` (default) or `"memory"`.
    #[serde(default)]
    pub ledger: LedgerStorageMode,

    /// Directory for the file ledger. Relative paths are resolved against the
    /// directory containing the config file.
    #[serde(default = "default_ledger_dir")]
    pub ledger_dir: PathBuf,

    /// Per-attempt timeout for tasks that do not set their own.
    #[serde(default = "default_timeout")]
    pub default_timeout: String,

    /// Retry policy for tasks that do not set their own.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_concurrency() -> usize {
    4
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from(".stagegate/runs")
}

fn default_timeout() -> String {
    "30m".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            ledger: LedgerStorageMode::default(),
            ledger_dir: default_ledger_dir(),
            default_timeout: default_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry settings. Every field is optional; unset fields fall back to the
/// `[config.retry]` value and then to the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub initial_backoff: Option<String>,
    #[serde(default)]
    pub max_backoff: Option<String>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub jitter: Option<f64>,
}

impl RetryConfig {
    /// Fill unset fields of `self` from `fallback`.
    pub fn or(&self, fallback: &RetryConfig) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.or(fallback.max_attempts),
            initial_backoff: self
                .initial_backoff
                .clone()
                .or_else(|| fallback.initial_backoff.clone()),
            max_backoff: self
                .max_backoff
                .clone()
                .or_else(|| fallback.max_backoff.clone()),
            multiplier: self.multiplier.or(fallback.multiplier),
            jitter: self.jitter.or(fallback.jitter),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub kind: TaskKind,

    /// Command to execute. Required for every kind except `barrier`.
    ///
    /// `{name}` placeholders are replaced from `params` and `[vars]`.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Tasks that must succeed before this one may start.
    #[serde(default)]
    pub after: Vec<String>,

    /// Per-attempt timeout (e.g. `"90s"`); defaults to `[config].default_timeout`.
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub retry: Option<RetryConfig>,

    /// When false, a failure of this task alone does not fail the run.
    #[serde(default = "default_required")]
    pub required: bool,

    /// Task-local template variables (e.g. `table`, `source`).
    #[serde(default)]
    pub params: BTreeMap<String, String>,

    /// Quality gates evaluated after the command succeeds.
    #[serde(default)]
    pub gate: Vec<GateConfig>,
}

fn default_required() -> bool {
    true
}

/// `[[task.<name>.gate]]` entries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateConfig {
    /// Check a metric the task's command printed (`rows=42`).
    RowCount {
        #[serde(default = "default_metric")]
        metric: String,
        #[serde(default = "default_min")]
        min: i64,
    },
    /// Run a separate count command and check the integer it prints.
    Command {
        cmd: String,
        #[serde(default = "default_min")]
        min: i64,
        /// Optional command whose first lines are logged after a pass.
        #[serde(default)]
        sample_cmd: Option<String>,
    },
}

fn default_metric() -> String {
    "rows".to_string()
}

fn default_min() -> i64 {
    1
}

/// Parse a duration string like `"500ms"`, `"3s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' missing unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };

    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is out of range"))
}
