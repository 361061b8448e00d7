//! `runforge-config` — engine configuration management.
//!
//! Provides:
//! - Typed config schema with defaults
//! - YAML loading
//! - `${ENV_VAR}` substitution
//! - Validation with warnings surfaced through `tracing`

pub mod env;
pub mod schema;

pub use env::{resolve_env_vars, resolve_env_vars_with, MissingEnvVarError};
pub use schema::{EngineConfig, LoggingConfig};

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// Load, substitute env vars, and validate a config file.
///
/// A missing file is not an error: first runs get the defaults.
pub fn load(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(EngineConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let value: serde_json::Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    let value = resolve_env_vars(&value).context("Failed to resolve env vars in config")?;

    let config: EngineConfig =
        serde_json::from_value(value).context("Failed to deserialize config")?;

    for warning in schema::validate(&config) {
        warn!(message = %warning, "Config warning");
    }

    info!(path = %path.display(), "Loaded engine config");
    Ok(config)
}
