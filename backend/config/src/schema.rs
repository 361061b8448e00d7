use serde::{Deserialize, Serialize};

/// Engine runtime options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dispatcher cadence in seconds.
    pub tick_interval_secs: u64,
    /// SQLite database file backing schedules, runs, and counters.
    pub database_path: String,
    /// Timeout applied to on-demand runs, which have no schedule to
    /// inherit one from.
    pub default_timeout_seconds: u64,
    /// Terminal run rows older than this are pruned.
    pub run_retention_days: u32,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            database_path: "runforge.db".to_string(),
            default_timeout_seconds: 300,
            run_retention_days: 30,
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            level: "info".to_string(),
        }
    }
}

const KNOWN_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Sanity checks; returns human-readable warnings, not hard errors.
pub fn validate(config: &EngineConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.tick_interval_secs == 0 {
        warnings.push("tick_interval_secs is 0; the engine will clamp it to 1".to_string());
    }
    if config.tick_interval_secs > 60 {
        warnings.push(format!(
            "tick_interval_secs of {} delays dispatch and timeout detection by up to that long",
            config.tick_interval_secs
        ));
    }
    if config.run_retention_days == 0 {
        warnings.push("run_retention_days is 0; run history will be pruned immediately".to_string());
    }
    if !KNOWN_LEVELS.contains(&config.logging.level.as_str()) {
        warnings.push(format!("unknown log level '{}'", config.logging.level));
    }
    warnings
}
