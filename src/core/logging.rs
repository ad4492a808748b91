//! Diagnostic logging setup for the `sfc` binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is the
//! binary's job. `SFC_LOG`, `SFC_LOG_FORMAT` and `SFC_LOG_FILE` override the
//! command-line defaults.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_LEVEL_ENV: &str = "SFC_LOG";
pub const LOG_FORMAT_ENV: &str = "SFC_LOG_FORMAT";
pub const LOG_FILE_ENV: &str = "SFC_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per event.
    Json,
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" => Some(Self::Human),
            "json" | "jsonl" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Verbosity requested on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "critical" => Some(Self::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub const fn as_tracing_level(self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Log level from `SFC_LOG`, looked up through `lookup`.
#[must_use]
pub fn parse_log_level_with(lookup: impl Fn(&str) -> Option<String>) -> Option<LogLevel> {
    non_empty(lookup(LOG_LEVEL_ENV)).and_then(|v| LogLevel::from_arg(&v))
}

/// Log format from `SFC_LOG_FORMAT`, looked up through `lookup`.
#[must_use]
pub fn parse_log_format_with(lookup: impl Fn(&str) -> Option<String>) -> Option<LogFormat> {
    non_empty(lookup(LOG_FORMAT_ENV)).and_then(|v| LogFormat::from_arg(&v))
}

/// Log file from `SFC_LOG_FILE`, looked up through `lookup`.
#[must_use]
pub fn parse_log_file_with(lookup: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    non_empty(lookup(LOG_FILE_ENV)).map(PathBuf::from)
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

#[must_use]
pub fn parse_log_level_from_env() -> Option<LogLevel> {
    parse_log_level_with(process_env)
}

#[must_use]
pub fn parse_log_format_from_env() -> Option<LogFormat> {
    parse_log_format_with(process_env)
}

#[must_use]
pub fn parse_log_file_from_env() -> Option<PathBuf> {
    parse_log_file_with(process_env)
}

/// Filter directive used when `RUST_LOG` is unset.
#[must_use]
pub fn default_directive(level: LogLevel) -> String {
    format!("storefront_client={},sfc={}", level.as_filter(), level.as_filter())
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(level: LogLevel, format: LogFormat, log_file: Option<PathBuf>, verbose: bool) {
    let level = if verbose && matches!(level, LogLevel::Warn | LogLevel::Error) {
        LogLevel::Debug
    } else {
        level
    };

    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()
    });

    let writer = || -> BoxMakeWriter {
        match file.as_ref().and_then(|inner| inner.try_clone().ok()) {
            Some(file) => BoxMakeWriter::new(file),
            None => BoxMakeWriter::new(std::io::stderr),
        }
    };

    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(level)))
    };

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .json()
                .with_writer(writer())
                .with_span_events(FmtSpan::CLOSE)
                .try_init()
                .ok();
        }
        LogFormat::Compact => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .compact()
                .with_writer(writer())
                .with_target(true)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(writer())
                .with_target(false)
                .without_time()
                .try_init()
                .ok();
        }
    }
}
