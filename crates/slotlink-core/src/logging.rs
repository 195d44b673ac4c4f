//! Structured logging setup.
//!
//! All crates log through `tracing`. Binaries and tests that want output call
//! [`init_from_settings`] (or one of the explicit initializers) once; the
//! `RUST_LOG` environment variable takes precedence over the configured level.

use slotlink_settings::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Which subscriber [`init_from_settings`] installs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact human-readable lines.
    Compact,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Format selected by `settings.json`.
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        if settings.json { Self::Json } else { Self::Compact }
    }
}

/// Initialize the global subscriber from the `logging` settings section.
///
/// Returns the format that was selected. Subsequent calls are no-ops.
pub fn init_from_settings(settings: &LoggingSettings) -> LogFormat {
    let format = LogFormat::from_settings(settings);
    match format {
        LogFormat::Compact => init_subscriber(&settings.level),
        LogFormat::Json => init_json_subscriber(&settings.level),
    }
    format
}

/// Initialize the global tracing subscriber with compact stderr output.
///
/// Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON lines on stderr.
pub fn init_json_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}
