//! storefront-client - Storefront API client
//!
//! A request pipeline with interceptor chains, an LRU+TTL response cache,
//! retry with linear backoff, and token lifecycle management with
//! single-flight refresh. The `sfc` binary exposes it on the command line.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use crate::core::client::{ClientBuilder, StorefrontClient};
pub use error::{ExitCode, Result, StorefrontError};

// Re-export test utilities for external test crates
#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
