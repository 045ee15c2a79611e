// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod gate;
pub mod ledger;
pub mod logging;
pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{load_and_validate, resolve_relative_to_config};
use crate::config::model::ConfigFile;
use crate::dag::Graph;
use crate::engine::{Executor, RunContext, RunReport};
use crate::ledger::{FileLedgerStore, LedgerStore, MemoryLedgerStore};
use crate::types::{LedgerStorageMode, RunStatus};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and graph construction
/// - ledger store selection
/// - executor (new run or resume)
/// - Ctrl-C handling
///
/// Returns the final run status; the report has already been printed.
pub async fn run(args: CliArgs) -> Result<RunStatus> {
    let cfg = load_and_validate(&args.config)?;
    let graph = Arc::new(cfg.build_graph()?);

    if args.dry_run {
        print_dry_run(&cfg, &graph);
        return Ok(RunStatus::Succeeded);
    }

    let store = ledger_store(&cfg, &args);

    let mut options = cfg.executor_options();
    if let Some(n) = args.concurrency {
        options.concurrency = n as usize;
    }

    // Ctrl-C → cancel the run; in-flight tasks fail and pending ones skip.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            cancel.cancel();
        });
    }

    let ctx = RunContext::new()
        .with_vars(cfg.vars.clone())
        .with_cancel(cancel);
    let executor = Executor::new(store, options);

    let run = match &args.resume {
        Some(run_id) => {
            let force: BTreeSet<String> = args.force.iter().cloned().collect();
            executor.resume(graph.clone(), run_id, &force, ctx).await?
        }
        None => executor.execute(graph.clone(), ctx).await?,
    };

    info!(run_id = %run.run_id, status = %run.status, "run complete");
    print!("{}", RunReport::new(&run, &graph));

    Ok(run.status)
}

fn ledger_store(cfg: &ConfigFile, args: &CliArgs) -> Arc<dyn LedgerStore> {
    match cfg.config.ledger {
        LedgerStorageMode::Memory => {
            if args.resume.is_some() {
                warn!("memory ledger holds no earlier runs; resume will fail");
            }
            Arc::new(MemoryLedgerStore::new())
        }
        LedgerStorageMode::File => {
            let dir = match &args.ledger_dir {
                Some(dir) => dir.clone(),
                None => resolve_relative_to_config(&args.config, &cfg.config.ledger_dir),
            };
            debug!(ledger_dir = ?dir, "using file ledger");
            Arc::new(FileLedgerStore::new(dir))
        }
    }
}

/// Print the execution order and per-task details without running anything.
fn print_dry_run(cfg: &ConfigFile, graph: &Graph) {
    println!("stagegate dry-run");
    println!("  config.concurrency = {}", cfg.config.concurrency);
    println!("  config.ledger = {:?}", cfg.config.ledger);
    println!("  config.default_timeout = {}", cfg.config.default_timeout);
    if !cfg.vars.is_empty() {
        println!("  vars: {:?}", cfg.vars.keys().collect::<Vec<_>>());
    }
    println!();

    println!("execution order ({} tasks):", graph.len());
    for (idx, name) in graph.topological_order().iter().enumerate() {
        let Some(task) = cfg.task.get(name) else {
            continue;
        };
        println!("  {:>2}. {name} [{}]", idx + 1, task.kind);
        if let Some(cmd) = &task.cmd {
            println!("      cmd: {cmd}");
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if !task.params.is_empty() {
            println!("      params: {:?}", task.params);
        }
        if let Some(timeout) = &task.timeout {
            println!("      timeout: {timeout}");
        }
        if let Some(retry) = &task.retry {
            if let Some(n) = retry.max_attempts {
                println!("      retry.max_attempts: {n}");
            }
        }
        for gate in &task.gate {
            println!("      gate: {gate:?}");
        }
        if !task.required {
            println!("      required: false");
        }
    }

    debug!("dry-run complete (no execution)");
}

