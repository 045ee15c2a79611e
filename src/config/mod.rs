// src/config/mod.rs

//! Configuration: TOML model, validation, loading, and graph construction.

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate};
pub use model::{ConfigFile, RawConfigFile};
