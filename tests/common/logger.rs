//! Structured per-test logging.
//!
//! ```rust,ignore
//! let log = TestLogger::new("cached_get_scenario");
//! log.phase("setup");
//! log.info("Scripted two responses");
//! log.finish_ok();
//! ```
//!
//! `TEST_LOG_LEVEL` (trace..error, default info) filters output and
//! `TEST_LOG_JSON=1` switches to one JSON object per line.
#![allow(dead_code)]

use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::log_capture::TestLogCapture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn from_env() -> Self {
        match std::env::var("TEST_LOG_LEVEL")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.pad(label)
    }
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    timestamp: DateTime<Utc>,
    test: &'a str,
    phase: &'a str,
    level: LogLevel,
    message: &'a str,
    elapsed_ms: u128,
}

/// Per-test logger tracking phase and elapsed time.
pub struct TestLogger {
    name: String,
    started: Instant,
    phase: Mutex<String>,
    min_level: LogLevel,
    json: bool,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Self {
        let logger = Self {
            name: test_name.to_string(),
            started: Instant::now(),
            phase: Mutex::new("setup".to_string()),
            min_level: LogLevel::from_env(),
            json: std::env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v == "true"),
        };
        logger.log(LogLevel::Debug, "started");
        logger
    }

    /// Logger plus a capture of the code under test's tracing events.
    pub fn with_capture(test_name: &str) -> (Self, TestLogCapture) {
        (Self::new(test_name), TestLogCapture::start())
    }

    pub fn phase(&self, phase: &str) {
        *self.phase.lock().unwrap() = phase.to_string();
        self.log(LogLevel::Debug, &format!("phase: {phase}"));
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn finish_ok(&self) {
        self.log(LogLevel::Info, &format!("passed in {}ms", self.elapsed_ms()));
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    fn log(&self, level: LogLevel, message: &str) {
        if level < self.min_level {
            return;
        }
        let phase = self.phase.lock().unwrap().clone();
        if self.json {
            let entry = LogEntry {
                timestamp: Utc::now(),
                test: &self.name,
                phase: &phase,
                level,
                message,
                elapsed_ms: self.elapsed_ms(),
            };
            if let Ok(line) = serde_json::to_string(&entry) {
                eprintln!("{line}");
            }
        } else {
            eprintln!(
                "[{level:>5}] {} ({phase}, +{}ms): {message}",
                self.name,
                self.elapsed_ms()
            );
        }
    }
}
