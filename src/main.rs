// src/main.rs

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use stagegate::cli::CliArgs;
use stagegate::logging::init_logging;
use stagegate::types::RunStatus;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = CliArgs::parse();
    init_logging(args.log_level)?;

    let status = stagegate::run(args).await?;
    Ok(match status {
        RunStatus::Succeeded => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
