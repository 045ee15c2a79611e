// tests/integration/main.rs

mod demo_config;
mod error_handling;
mod file_ledger;
#[cfg(unix)]
mod shell_pipeline;
