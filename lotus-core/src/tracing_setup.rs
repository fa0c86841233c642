//! Tracing setup for Lotus
//!
//! Two outputs: a console at the operator's level and a per-run file that
//! receives every event, including the per-chunk transfer events. Those are
//! kept off the console even at `trace`.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Name of the per-run log file written inside the logs directory.
pub const LOG_FILE_NAME: &str = "lotus-last-run.log";

/// Target of the per-chunk transfer events.
const CHUNK_TARGET: &str = "lotus_core::streaming::transfer";

/// Console filter directives for `level` when `RUST_LOG` is not set.
///
/// Chunk events are capped at `debug`, and request/response events from the
/// HTTP layer only appear from `debug` upwards.
///
/// # Examples
/// ```
/// use lotus_core::tracing_setup::console_directives;
///
/// let directives = console_directives(tracing::Level::TRACE);
/// assert_eq!(directives, "trace,lotus_core::streaming::transfer=debug,tower_http=trace");
/// ```
pub fn console_directives(level: Level) -> String {
    let base = level_name(level);
    let chunks = if level == Level::TRACE { "debug" } else { base };
    let http = match level {
        Level::ERROR => "error",
        level if level >= Level::DEBUG => base,
        _ => "warn",
    };
    format!("{base},{CHUNK_TARGET}={chunks},tower_http={http}")
}

fn level_name(level: Level) -> &'static str {
    match level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber and returns the path of the trace file.
///
/// `logs_dir` defaults to `./logs`. `RUST_LOG`, when set, replaces the
/// console directives entirely; the file always records everything.
///
/// # Errors
///
/// - `std::io::Error` - The logs directory or the log file could not be created
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<PathBuf, std::io::Error> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;
    let log_file_path = logs_path.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));

    let console_layer = fmt::layer()
        .with_target(console_level >= Level::DEBUG)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(
        console = %console_directives(console_level),
        file = %log_file_path.display(),
        "Tracing initialized"
    );

    Ok(log_file_path)
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warnings, including stalled clients
    Warn,
    /// One line per served request
    Info,
    /// Transfer completions, disconnects and HTTP request events
    Debug,
    /// Everything except per-chunk events, which only go to the log file
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
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
        f.write_str(level_name(self.as_tracing_level()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_mapping() {
        assert_eq!(CliLogLevel::Error.as_tracing_level(), Level::ERROR);
        assert_eq!(CliLogLevel::Trace.as_tracing_level(), Level::TRACE);
        assert_eq!(CliLogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_chunk_events_never_reach_console() {
        assert_eq!(
            console_directives(Level::INFO),
            "info,lotus_core::streaming::transfer=info,tower_http=warn"
        );
        assert_eq!(
            console_directives(Level::DEBUG),
            "debug,lotus_core::streaming::transfer=debug,tower_http=debug"
        );
        assert!(console_directives(Level::TRACE).contains("transfer=debug"));
    }

    #[test]
    fn test_console_directives_parse() {
        for level in [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE] {
            assert!(EnvFilter::try_new(console_directives(level)).is_ok());
        }
    }
}
