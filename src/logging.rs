//! Tracing setup: a rolling file appender plus stdout, or JSON lines only.
//!
//! `RUST_LOG` replaces the configured filter when set.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `log_level` followed by every per-target directive
pub fn filter_directives(config: &AppConfig) -> String {
    std::iter::once(config.log_level.as_str())
        .chain(config.log_directives.iter().map(String::as_str))
        .filter(|d| !d.trim().is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber. Keep the guard alive until shutdown or
/// buffered file lines are lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = match config.rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(&config.log_dir, &config.log_file),
        "daily" => tracing_appender::rolling::daily(&config.log_dir, &config.log_file),
        _ => tracing_appender::rolling::never(&config.log_dir, &config.log_file),
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(directives: &[&str]) -> AppConfig {
        let mut config = AppConfig::from_yaml(
            "log_level: info\nlog_dir: ./logs\nlog_file: okane.log\nuse_json: false\nrotation: never\n",
        )
        .unwrap();
        config.log_directives = directives.iter().map(|d| d.to_string()).collect();
        config
    }

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives(&config(&["sqlx=warn", "okane::warmer=debug"])),
            "info,sqlx=warn,okane::warmer=debug"
        );
        assert_eq!(filter_directives(&config(&[])), "info");
        assert_eq!(filter_directives(&config(&["", "redis=warn"])), "info,redis=warn");
    }

    #[test]
    fn test_default_directives_parse() {
        let config = config(&["sqlx=warn", "redis=warn"]);
        assert!(EnvFilter::try_new(filter_directives(&config)).is_ok());
    }
}
