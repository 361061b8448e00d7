//! Structured logging for the Runforge engine.
//!
//! Console output plus a daily-rolling NDJSON file, configured from the
//! engine's `LoggingConfig`.

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use runforge_config::LoggingConfig;

/// Initialize the global logger.
///
/// `RUST_LOG` takes precedence over the configured level. File output lands
/// in `config.dir/runforge.log.YYYY-MM-DD` as NDJSON.
pub fn init_logger(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.dir, "runforge.log");
    let file_layer = fmt::layer()
        .json()
        .with_writer(file_appender)
        .with_ansi(false);

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_ndjson_to_the_configured_dir() {
        let dir = std::env::temp_dir().join(format!("runforge-log-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let config = LoggingConfig {
            dir: dir.to_string_lossy().into_owned(),
            level: "info".into(),
        };
        init_logger(&config);
        tracing::info!(component = "logging", "logger initialized");

        let mut contents = String::new();
        for entry in std::fs::read_dir(&dir).unwrap() {
            contents.push_str(&std::fs::read_to_string(entry.unwrap().path()).unwrap());
        }
        let line = contents
            .lines()
            .find(|l| l.contains("logger initialized"))
            .expect("log line written to the rolling file");
        let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(parsed["fields"]["component"], "logging");

        std::fs::remove_dir_all(&dir).ok();
    }
}
