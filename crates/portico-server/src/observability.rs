//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Level used when the configured one does not parse.
const FALLBACK_LEVEL: &str = "info";

/// Installs the global subscriber. `RUST_LOG` wins over `logging.level`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(config: &LoggingConfig) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let (filter, rejected) = log_filter(rust_log.as_deref(), &config.level);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if let (true, Some(level)) = (installed, rejected) {
        tracing::warn!(level = %level, fallback = FALLBACK_LEVEL, "invalid logging.level");
    }
}

/// Builds the filter from an optional `RUST_LOG` value and the configured
/// level. Also returns the configured level when it had to be replaced.
fn log_filter(rust_log: Option<&str>, level: &str) -> (EnvFilter, Option<String>) {
    let from_env = rust_log
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok());
    if let Some(filter) = from_env {
        return (filter, None);
    }
    match EnvFilter::try_new(level.trim()) {
        Ok(filter) if !level.trim().is_empty() => (filter, None),
        _ => (EnvFilter::new(FALLBACK_LEVEL), Some(level.to_string())),
    }
}

pub fn shutdown_tracing() {
    tracing::info!("tracing shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_configured_level_is_used_without_rust_log() {
        let (filter, rejected) = log_filter(None, "debug");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
        assert!(rejected.is_none());
    }

    #[test]
    fn test_rust_log_wins_over_configured_level() {
        let (filter, _) = log_filter(Some("portico_server=trace"), "warn");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));

        let (filter, _) = log_filter(Some("  "), "warn");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_invalid_level_falls_back_to_info() {
        let (filter, rejected) = log_filter(None, "portico=verbose");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(rejected.as_deref(), Some("portico=verbose"));
    }
}
