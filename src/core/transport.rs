//! HTTP transport primitive.
//!
//! The pipeline talks to the network only through [`Transport`], which must
//! tell transport failures (timeouts, refused connections) apart from
//! answers carrying an error status. [`ReqwestTransport`] is the production
//! implementation; tests script their own.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;

use super::request::Method;
use crate::error::{Result, StorefrontError};

/// Timeout used when neither the request nor the config sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on establishing a TCP/TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One wire-level round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Fully built URL including the query string.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Status and decoded body. Non-JSON bodies arrive as a JSON string and an
/// empty body as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    #[must_use]
    pub const fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure before any response was received.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),
}

impl TransportError {
    /// Attach the request URL and convert into the crate error.
    #[must_use]
    pub fn into_error(self, url: &str) -> StorefrontError {
        match self {
            Self::Timeout(timeout) => StorefrontError::Timeout {
                url: url.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            Self::Connection(message) => StorefrontError::Connection {
                url: url.to_string(),
                message,
            },
        }
    }
}

/// Platform HTTP primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and wait for the complete response.
    ///
    /// A response with any status is `Ok`; only transport failures are `Err`.
    async fn send(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// Build the shared HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails (e.g. TLS backend init).
pub fn build_client() -> Result<Client> {
    ClientBuilder::new()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(format!("storefront-client/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| StorefrontError::Config(format!("failed to build HTTP client: {e}")))
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: build_client()?,
        })
    }

    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn classify(err: &reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else {
        TransportError::Connection(err.to_string())
    }
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let timeout = request.timeout;
        let mut builder = self
            .client
            .request(request.method.into(), &request.url)
            .timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| classify(&e, timeout))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| classify(&e, timeout))?;

        Ok(TransportResponse::new(status, decode_body(&bytes)))
    }
}
