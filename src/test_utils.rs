//! Test utilities for storefront-client.
//!
//! Scripted collaborators for the pipeline and token manager, test data
//! factories, and assertion macros shared by unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use storefront_client::test_utils::*;
//!
//! let transport = ScriptedTransport::new();
//! transport.push_ok(make_test_envelope(json!([1, 2])));
//! let notifier = RecordingNotifier::new();
//! ```

use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::Instant;

use crate::core::models::TokenInfo;
use crate::core::notify::{AuthRedirect, Notifier};
use crate::core::pipeline::PipelineConfig;
use crate::core::token::TokenRefresher;
use crate::core::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::error::{Result, StorefrontError};

/// Base URL used by scripted-transport tests.
pub const TEST_BASE_URL: &str = "http://storefront.test/v1";

// =============================================================================
// Test Data Factories
// =============================================================================

/// Successful envelope `{code: 200, message: "ok", data}`.
#[must_use]
pub fn make_test_envelope(data: Value) -> Value {
    json!({ "code": 200, "message": "ok", "data": data })
}

/// Rejecting envelope with a business code.
#[must_use]
pub fn make_test_rejection(code: i64, message: &str) -> Value {
    json!({ "code": code, "message": message, "data": null })
}

/// Token pair expiring `expire_secs` from now.
#[must_use]
pub fn make_test_token_info(access: &str, expire_secs: u64) -> TokenInfo {
    TokenInfo::new(access, format!("refresh-{access}"), expire_secs)
}

/// Refresh endpoint payload wrapping `info`.
#[must_use]
pub fn make_test_token_envelope(info: &TokenInfo) -> Value {
    make_test_envelope(json!({
        "accessToken": info.access_token,
        "refreshToken": info.refresh_token,
        "expire": info.expire,
    }))
}

/// Pipeline config pointing at [`TEST_BASE_URL`] with the default retry policy.
#[must_use]
pub fn make_test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        base_url: TEST_BASE_URL.to_string(),
        ..PipelineConfig::default()
    }
}

/// A config TOML exercising every section.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"
[api]
environment = "testing"
timeout_ms = 5000
retry_count = 3
retry_delay_ms = 200
show_loading = false

[cache]
capacity = 16
default_ttl_ms = 60000

[auth]
token_store = "memory"
refresh_threshold_secs = 120
"#
    .to_string()
}

// =============================================================================
// Scripted Transport
// =============================================================================

type Step = std::result::Result<TransportResponse, TransportError>;

/// [`Transport`] that replays queued outcomes and records every call.
///
/// Queued steps are consumed first; once empty the fallback step (if any)
/// answers every call. Without either, calls fail with a connection error.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Mutex<Option<Step>>,
    calls: Mutex<Vec<(Instant, TransportRequest)>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, step: Step) -> &Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(step);
        self
    }

    /// Queue a 200 response.
    pub fn push_ok(&self, body: Value) -> &Self {
        self.push(Ok(TransportResponse::new(200, body)))
    }

    /// Queue a response with `status`.
    pub fn push_status(&self, status: u16, body: Value) -> &Self {
        self.push(Ok(TransportResponse::new(status, body)))
    }

    /// Queue a transport failure.
    pub fn push_error(&self, error: TransportError) -> &Self {
        self.push(Err(error))
    }

    /// Answer every unscripted call with 200 `body`.
    pub fn always_ok(&self, body: Value) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Ok(TransportResponse::new(200, body)));
    }

    /// Fail every unscripted call with `error`.
    pub fn always_error(&self, error: TransportError) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = Some(Err(error));
    }

    /// Sleep this long inside every call before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Requests in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<TransportRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// When each call started, on the tokio clock.
    #[must_use]
    pub fn call_instants(&self) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(at, _)| *at)
            .collect()
    }

    /// Number of calls whose URL contains `fragment`.
    #[must_use]
    pub fn calls_to(&self, fragment: &str) -> usize {
        self.calls()
            .iter()
            .filter(|request| request.url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> Step {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((Instant::now(), request));

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted
            .or_else(|| {
                self.fallback
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .unwrap_or_else(|| Err(TransportError::Connection("no scripted response".into())))
    }
}

// =============================================================================
// Recording Notifier / Redirect
// =============================================================================

/// One hint observed by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEvent {
    ShowLoading(String),
    HideLoading,
    ShowError(String),
}

/// [`Notifier`] that records every hint in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: NotifyEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    #[must_use]
    pub fn events(&self) -> Vec<NotifyEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&NotifyEvent) -> bool) -> usize {
        self.events().iter().filter(|event| pred(event)).count()
    }

    /// Messages passed to `show_error`.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                NotifyEvent::ShowError(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn show_loading(&self, text: &str) {
        self.record(NotifyEvent::ShowLoading(text.to_string()));
    }

    fn hide_loading(&self) {
        self.record(NotifyEvent::HideLoading);
    }

    fn show_error(&self, message: &str) {
        self.record(NotifyEvent::ShowError(message.to_string()));
    }
}

/// Auth redirect that records the routes it was asked to open.
#[must_use]
pub fn recording_redirect() -> (AuthRedirect, Arc<Mutex<Vec<String>>>) {
    let routes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&routes);
    let redirect: AuthRedirect = Arc::new(move |route: &str| {
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route.to_string());
    });
    (redirect, routes)
}

// =============================================================================
// Counting Refresher
// =============================================================================

/// [`TokenRefresher`] that counts calls and answers after an optional delay.
pub struct CountingRefresher {
    calls: AtomicUsize,
    delay: Duration,
    outcome: Mutex<Option<TokenInfo>>,
}

impl CountingRefresher {
    /// Succeeds with `next` every time.
    #[must_use]
    pub fn succeeding(next: TokenInfo, delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            outcome: Mutex::new(Some(next)),
        }
    }

    /// Fails with a 401 every time.
    #[must_use]
    pub fn failing(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            outcome: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| StorefrontError::from_status(401, json!({"message": "refresh token revoked"})))
    }
}

// =============================================================================
// Temporary Directory
// =============================================================================

/// Isolated temporary directory, removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Create a file, creating parent directories as needed.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be created or written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        let mut file = fs::File::create(&path).expect("Failed to create test file");
        file.write_all(content.as_bytes())
            .expect("Failed to write test file");
        path
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.inner.path().join(name))
    }

    #[must_use]
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion Macros
// =============================================================================

/// Assert that a string contains a substring.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{:?}",
            needle,
            haystack
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_transport_replays_then_falls_back() {
        let transport = ScriptedTransport::new();
        transport.push_status(404, Value::Null);
        transport.always_ok(json!("fallback"));

        let request = TransportRequest {
            method: crate::core::request::Method::Get,
            url: format!("{TEST_BASE_URL}/a"),
            headers: std::collections::BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(1),
        };

        assert_eq!(transport.send(request.clone()).await.unwrap().status, 404);
        assert_eq!(
            transport.send(request).await.unwrap().body,
            json!("fallback")
        );
        assert_eq!(transport.call_count(), 2);
        assert_eq!(transport.calls_to("/a"), 2);
    }

    #[tokio::test]
    async fn unscripted_transport_fails_with_connection_error() {
        let transport = ScriptedTransport::new();
        let request = TransportRequest {
            method: crate::core::request::Method::Get,
            url: "/x".into(),
            headers: std::collections::BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            transport.send(request).await,
            Err(TransportError::Connection(_))
        ));
    }

    #[test]
    fn test_dir_files() {
        let dir = TestDir::new();
        let path = dir.create_file("nested/config.toml", "[api]");
        assert!(path.exists());
        assert_eq!(dir.read_file("nested/config.toml").unwrap(), "[api]");
    }
}
