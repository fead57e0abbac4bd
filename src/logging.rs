//! Tracing subscriber setup
//!
//! The binary owns the subscriber: library code only emits events. Two sinks
//! are installed:
//!
//! - console: the bare message, for operators watching the run
//! - `<identifier>.log`: timestamp, level, thread, `file:line` and target on
//!   every line, or JSON objects when `LOG_FORMAT=json`
//!
//! `--loglevel` sets the default filter; `RUST_LOG` overrides it.

use crate::identifier::RunIdentifier;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Operator-facing log levels accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogLevel {
    /// Only unrecoverable failures
    #[value(name = "CRITICAL")]
    Critical,
    /// Errors
    #[value(name = "ERROR")]
    Error,
    /// Warnings and errors
    #[value(name = "WARNING")]
    Warning,
    /// Progress messages
    #[default]
    #[value(name = "INFO")]
    Info,
    /// Protocol detail
    #[value(name = "DEBUG")]
    Debug,
}

impl LogLevel {
    /// `tracing` level directive for this level
    ///
    /// `tracing` has no level above `error`, so `CRITICAL` maps to it.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Critical | LogLevel::Error => "error",
            LogLevel::Warning => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Targets enabled by the default filter: the library and the binary
const LOG_TARGETS: [&str; 2] = ["usage_event_relay", "usage_relay"];

/// Default filter when `RUST_LOG` is unset
pub fn default_filter(level: LogLevel) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={}", level.as_directive()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber
///
/// # Arguments
/// * `level` - Default verbosity
/// * `log_dir` - Directory receiving `<identifier>.log`
/// * `identifier` - Run identifier naming the log file
///
/// # Returns
/// The file writer's guard. Keep it alive for the life of the process;
/// dropping it flushes and stops the background writer.
///
/// # Errors
/// Returns [`LoggingError`] if the log file cannot be opened or a global
/// subscriber is already installed.
pub fn init_logging(
    level: LogLevel,
    log_dir: &Path,
    identifier: &RunIdentifier,
) -> Result<WorkerGuard, LoggingError> {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level)));

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(identifier.log_file_name())
        .build(log_dir)
        .map_err(|e| LoggingError::LogFile {
            path: log_dir.join(identifier.log_file_name()),
            reason: e.to_string(),
        })?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = if json_format {
        fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .boxed()
    };

    // Span fields are formatted once and shared by both text layers
    let console_layer = fmt::layer()
        .with_ansi(false)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    Ok(guard)
}

/// Logging setup errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Log file could not be created
    #[error("cannot open log file {path:?}: {reason}")]
    LogFile {
        /// Intended log file path
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// A global subscriber was already set
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(String),
}
