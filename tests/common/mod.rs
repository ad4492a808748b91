//! Shared helpers for integration tests.
//!
//! - `fixtures`: JSON fixture loading and client harnesses
//! - `logger`: structured per-test logging
//! - `log_capture`: tracing event capture for log assertions

pub mod fixtures;
pub mod log_capture;
pub mod logger;
