//! Logging setup for the command-line front end.

use clap::ValueEnum;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "warn,luminary_rag=info,luminary_cli=info";

/// How log records are rendered on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line records.
    #[default]
    Pretty,
    /// One JSON object per record.
    Json,
}

/// Build the filter from `RUST_LOG`, falling back to `default`.
pub fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_logging(format: LogFormat, default_filter: &str) {
    let registry = tracing_subscriber::registry().with(env_filter(default_filter));
    let result = match format {
        LogFormat::Pretty => {
            registry.with(fmt::layer().with_writer(std::io::stderr).with_target(false)).try_init()
        }
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_current_span(false))
            .try_init(),
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "logging already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(DEFAULT_LOG_FILTER.parse::<EnvFilter>().is_ok());
    }

    #[test]
    fn second_init_is_ignored() {
        init_logging(LogFormat::Pretty, DEFAULT_LOG_FILTER);
        init_logging(LogFormat::Json, DEFAULT_LOG_FILTER);
    }
}
