//! Tracing setup for Undertow
//!
//! Console logs go to stderr so they never interleave with the progress
//! frames on stdout. An optional log file captures everything at trace level.

use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Initialize tracing with console output and an optional debug log file.
///
/// # Arguments
/// * `console_level` - Log level for console output, overridden by `RUST_LOG`
/// * `log_file` - File receiving full trace output, truncated on every run
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - If the log file or its directory cannot be created,
///   or a global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                create_dir_all(parent)?;
            }
            let file = File::create(path)?;

            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false) // No color codes in files
                    .with_writer(file)
                    .with_filter(EnvFilter::new("trace")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(
        "Tracing initialized: console={}, log_file={:?}",
        console_level,
        log_file
    );

    Ok(())
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including detailed tracing
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use undertow_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn test_levels_map_to_tracing() {
        assert_eq!(CliLogLevel::Error.as_tracing_level(), Level::ERROR);
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
    }

    #[test]
    fn test_value_names_match_display() {
        for level in CliLogLevel::value_variants() {
            let parsed = CliLogLevel::from_str(&level.to_string(), true).unwrap();
            assert_eq!(parsed, *level);
        }
    }

    #[test]
    fn test_log_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("undertow.log");

        // A global subscriber may already exist in this test binary; the file
        // is created before installation is attempted either way.
        let _ = init_tracing(Level::WARN, Some(&path));
        assert!(path.exists());
    }
}
