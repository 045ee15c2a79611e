// src/cli.rs

//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Run a data pipeline as a DAG of gated tasks.
#[derive(Debug, Clone, Parser)]
#[command(name = "stagegate", version, about)]
pub struct CliArgs {
    /// Pipeline definition.
    #[arg(short, long, default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Resume a recorded run instead of starting a new one.
    #[arg(long, value_name = "RUN_ID")]
    pub resume: Option<String>,

    /// Re-run a task that already succeeded (with --resume). Repeatable.
    #[arg(long = "force", value_name = "TASK", requires = "resume")]
    pub force: Vec<String>,

    /// Override `[config].concurrency`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub concurrency: Option<u32>,

    /// Override `[config].ledger_dir`.
    #[arg(long, value_name = "PATH")]
    pub ledger_dir: Option<PathBuf>,

    /// Validate the pipeline, print the execution order and exit.
    #[arg(long)]
    pub dry_run: bool,

    /// Log level (overrides STAGEGATE_LOG).
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}
