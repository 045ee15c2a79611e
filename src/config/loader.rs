// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (graph correctness, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file {:?}", path))?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - unknown `after` references and cycles,
///   - commands and unknown `{placeholders}`,
///   - durations and retry settings.
///
/// The result can be turned into a task graph with
/// [`ConfigFile::build_graph`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `Stagegate.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Stagegate.toml")
}

/// Resolve `path` against the directory holding the config file.
///
/// Absolute paths are returned unchanged. A bare config file name such as
/// `Stagegate.toml` resolves against the current directory.
pub fn resolve_relative_to_config(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(path),
        _ => path.to_path_buf(),
    }
}
