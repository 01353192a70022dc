//! Logging setup for binaries and workers embedding the connector
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the process. These helpers install a formatter filtered by
//! `RUST_LOG`, falling back to a default directive when it is unset.

use tracing_subscriber::EnvFilter;

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
}

/// Directive used when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Install a text subscriber using `RUST_LOG` or [`DEFAULT_DIRECTIVE`]
///
/// Returns false if a global subscriber was already installed.
pub fn init() -> bool {
    init_with(DEFAULT_DIRECTIVE, LogFormat::Text)
}

/// Install a subscriber with an explicit fallback directive and format
pub fn init_with(default_directive: &str, format: LogFormat) -> bool {
    let filter = env_filter(default_directive);
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(?format, "logging initialized");
    }
    installed
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}
