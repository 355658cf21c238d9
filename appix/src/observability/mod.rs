//! Logging setup.
//!
//! Logs go to stderr through `tracing-subscriber`. The filter comes from
//! `APPIX_LOG`, then `RUST_LOG`, then the `--verbose` flag.

use tracing::{Level, Span};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable holding filter directives.
pub const LOG_ENV_VAR: &str = "APPIX_LOG";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Default level for the verbose flag.
#[must_use]
pub const fn default_level(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

fn build_env_filter(verbose: bool) -> EnvFilter {
    if let Some(filter) = std::env::var(LOG_ENV_VAR)
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
    {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let level = default_level(verbose);
    EnvFilter::try_new(format!("warn,appix={level}"))
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Installs the global subscriber.
///
/// Returns false if a subscriber was already installed.
pub fn init_tracing(verbose: bool, format: LogFormat) -> bool {
    let filter = build_env_filter(verbose);
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text if verbose => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .without_time()
                    .compact(),
            )
            .try_init(),
    };
    result.is_ok()
}

/// Span wrapping one push of `app`.
#[must_use]
pub fn push_span(app: &str, run_id: &str) -> Span {
    tracing::info_span!("push", app = %app, run_id = %run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(false), Level::INFO);
        assert_eq!(default_level(true), Level::DEBUG);
    }

    #[test]
    fn test_build_env_filter_fallback() {
        let _ = build_env_filter(false);
        let _ = build_env_filter(true);
    }

    #[test]
    fn test_second_init_is_rejected() {
        let _ = init_tracing(false, LogFormat::Text);
        assert!(!init_tracing(true, LogFormat::Json));
    }
}
