//! Request pipeline.
//!
//! Runs one logical request through, in order:
//!
//! 1. the request interceptor chain
//! 2. a cache lookup (GET with caching enabled only)
//! 3. the loading hint
//! 4. the transport, retrying transient failures of GET requests with
//!    linear backoff
//! 5. the response interceptor chain
//! 6. cache population with the raw body, once the response chain accepted it
//!
//! Any failure runs the error chain and, unless suppressed, an error toast.
//! Every `show_loading` is paired with exactly one `hide_loading` when the
//! request settles, on success and failure alike. Cache hits show neither.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;

use super::cache::CacheManager;
use super::interceptor::Interceptors;
use super::notify::Notifier;
use super::request::{Method, RequestDescriptor, build_url, cache_key_prefix};
use super::transport::{DEFAULT_TIMEOUT, Transport, TransportRequest};
use crate::error::{Result, StorefrontError};

/// Pipeline-wide defaults. Per-request options override them.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL relative paths are joined to, including the API version.
    pub base_url: String,
    pub timeout: Duration,
    /// Retries after the first attempt for transient GET failures.
    pub retry_count: u32,
    /// Base delay; the n-th retry waits `retry_delay * n`.
    pub retry_delay: Duration,
    pub show_loading: bool,
    pub loading_text: String,
    pub show_error: bool,
    /// Master switch for response caching.
    pub cache_enabled: bool,
    /// Log every round trip at debug level.
    pub log_requests: bool,
    /// Round trips slower than this are logged at warn level.
    pub slow_request_threshold: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.example.com/v1".to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_count: 2,
            retry_delay: Duration::from_secs(1),
            show_loading: true,
            loading_text: "Loading...".to_string(),
            show_error: true,
            cache_enabled: true,
            log_requests: false,
            slow_request_threshold: Duration::from_secs(3),
        }
    }
}

/// Hides the loading hint when dropped.
struct LoadingGuard<'a> {
    notifier: &'a dyn Notifier,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.notifier.hide_loading();
        }
    }
}

/// Orchestrates interceptors, cache, retry and error normalization.
pub struct RequestPipeline {
    config: PipelineConfig,
    transport: Arc<dyn Transport>,
    cache: Arc<CacheManager<Value>>,
    interceptors: Arc<Interceptors>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        transport: Arc<dyn Transport>,
        cache: Arc<CacheManager<Value>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            transport,
            cache,
            interceptors: Arc::new(Interceptors::new()),
            notifier,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub const fn cache(&self) -> &Arc<CacheManager<Value>> {
        &self.cache
    }

    #[must_use]
    pub const fn interceptors(&self) -> &Arc<Interceptors> {
        &self.interceptors
    }

    /// Run `descriptor` through the full pipeline.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the error interceptor chain.
    pub async fn request(&self, descriptor: RequestDescriptor) -> Result<Value> {
        let show_error = descriptor.show_error.unwrap_or(self.config.show_error);

        match self.execute(descriptor).await {
            Ok(body) => Ok(body),
            Err(err) => {
                let err = self.interceptors.error.run(err).await;
                if show_error {
                    self.notifier.show_error(&err.user_message());
                }
                Err(err)
            }
        }
    }

    async fn execute(&self, descriptor: RequestDescriptor) -> Result<Value> {
        let descriptor = self.interceptors.request.run(descriptor).await?;

        let cache_key = (self.config.cache_enabled && descriptor.is_cacheable())
            .then(|| descriptor.cache_key());
        if let Some(key) = &cache_key {
            if let Some(raw) = self.cache.get(key) {
                tracing::debug!(key = %key, "Cache hit");
                return self.interceptors.response.run(raw).await;
            }
        }

        // Dropped when `execute` returns, so the hide lands before any error toast.
        let mut loading = LoadingGuard {
            notifier: self.notifier.as_ref(),
            armed: false,
        };
        if descriptor.show_loading.unwrap_or(self.config.show_loading) {
            let text = descriptor
                .loading_text
                .as_deref()
                .unwrap_or(&self.config.loading_text);
            self.notifier.show_loading(text);
            loading.armed = true;
        }

        let raw = self.send_with_retry(&descriptor).await?;
        let pending = cache_key.map(|key| (key, raw.clone()));

        // Only bodies the response chain accepts are cached.
        let body = self.interceptors.response.run(raw).await?;

        if let Some((key, raw)) = pending {
            let ttl = descriptor.cache.ttl().unwrap_or_else(|| self.cache.default_ttl());
            tracing::debug!(key = %key, ttl_ms = ttl.as_millis(), "Cache set");
            self.cache.set(key, raw, Some(ttl));
        }

        Ok(body)
    }

    fn transport_request(&self, descriptor: &RequestDescriptor) -> TransportRequest {
        let mut headers = descriptor.headers.clone();
        if !headers.keys().any(|name| name.eq_ignore_ascii_case("content-type")) {
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        TransportRequest {
            method: descriptor.method,
            url: build_url(&self.config.base_url, descriptor),
            headers,
            body: descriptor.body.clone(),
            timeout: descriptor.timeout.unwrap_or(self.config.timeout),
        }
    }

    async fn send_with_retry(&self, descriptor: &RequestDescriptor) -> Result<Value> {
        let request = self.transport_request(descriptor);
        let budget = descriptor.retry.unwrap_or(self.config.retry_count);
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            let outcome = self.transport.send(request.clone()).await;
            self.log_round_trip(descriptor.method, &descriptor.url, started.elapsed());

            let err = match outcome {
                Ok(response) if response.is_success() => return Ok(response.body),
                Ok(response) => {
                    return Err(StorefrontError::from_status(response.status, response.body));
                }
                Err(e) => e.into_error(&descriptor.url),
            };

            if !(err.is_retryable() && descriptor.method == Method::Get && attempt < budget) {
                return Err(err);
            }

            attempt += 1;
            let delay = self.config.retry_delay.saturating_mul(attempt);
            tracing::warn!(
                method = %descriptor.method,
                url = %descriptor.url,
                attempt,
                budget,
                delay_ms = delay.as_millis(),
                error = %err,
                "Transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn log_round_trip(&self, method: Method, url: &str, elapsed: Duration) {
        let duration_ms = elapsed.as_millis();
        if elapsed > self.config.slow_request_threshold {
            tracing::warn!(%method, url, duration_ms, "Slow request");
        } else if self.config.log_requests {
            tracing::debug!(%method, url, duration_ms, "Request completed");
        }
    }

    /// GET `url` with query `params`.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn get(&self, url: &str, params: Option<Value>) -> Result<Value> {
        let mut descriptor = RequestDescriptor::get(url);
        descriptor.params = params;
        self.request(descriptor).await
    }

    /// POST `body` to `url`.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn post(&self, url: &str, body: Option<Value>) -> Result<Value> {
        let mut descriptor = RequestDescriptor::post(url);
        descriptor.body = body;
        self.request(descriptor).await
    }

    /// PUT `body` to `url`.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn put(&self, url: &str, body: Option<Value>) -> Result<Value> {
        let mut descriptor = RequestDescriptor::put(url);
        descriptor.body = body;
        self.request(descriptor).await
    }

    /// DELETE `url`.
    ///
    /// # Errors
    ///
    /// See [`Self::request`].
    pub async fn delete(&self, url: &str, params: Option<Value>) -> Result<Value> {
        let mut descriptor = RequestDescriptor::delete(url);
        descriptor.params = params;
        self.request(descriptor).await
    }

    /// Run `descriptor` and deserialize the final body.
    ///
    /// # Errors
    ///
    /// See [`Self::request`]; additionally [`StorefrontError::InvalidResponse`]
    /// if the body does not match `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> Result<T> {
        let body = self.request(descriptor).await?;
        serde_json::from_value(body).map_err(|e| StorefrontError::InvalidResponse(e.to_string()))
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop cached responses of `method url` for every parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::InvalidPattern`] if the pattern cannot compile.
    pub fn clear_url_cache(&self, url: &str, method: Method) -> Result<usize> {
        let pattern = Regex::new(&format!("^{}", regex::escape(&cache_key_prefix(method, url))))?;
        let removed = self.cache.clear_by_pattern(&pattern);
        tracing::debug!(%method, url, removed, "Cleared cached responses");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheConfig;
    use crate::core::request::CachePolicy;
    use crate::core::transport::TransportError;
    use crate::test_utils::{NotifyEvent, RecordingNotifier, ScriptedTransport};
    use serde_json::json;

    struct Fixture {
        pipeline: RequestPipeline,
        transport: Arc<ScriptedTransport>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(config: PipelineConfig) -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let cache = Arc::new(CacheManager::new(CacheConfig::default()));
        let pipeline = RequestPipeline::new(config, transport.clone(), cache, notifier.clone());
        Fixture {
            pipeline,
            transport,
            notifier,
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            base_url: "http://storefront.test/v1".to_string(),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_get_with_linear_backoff() {
        let f = fixture(config());
        f.transport
            .always_error(TransportError::Connection("reset".into()));

        let started = Instant::now();
        let err = f
            .pipeline
            .request(RequestDescriptor::get("/items").with_retry(3))
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(f.transport.call_count(), 4);
        let offsets: Vec<Duration> = f
            .transport
            .call_instants()
            .iter()
            .map(|at| at.duration_since(started))
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(6),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success() {
        let f = fixture(config());
        f.transport
            .push_error(TransportError::Timeout(Duration::from_secs(10)))
            .push_ok(json!({"ok": true}));

        let body = f.pipeline.get("/items", None).await.unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(f.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn application_error_is_not_retried() {
        let f = fixture(config());
        f.transport.push_status(404, json!({"message": "no such item"}));

        let err = f.pipeline.get("/items/9", None).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(f.transport.call_count(), 1);
        assert!(f.notifier.events().contains(&NotifyEvent::ShowError("no such item".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn mutations_are_never_retried() {
        let f = fixture(config());
        f.transport
            .always_error(TransportError::Connection("refused".into()));

        assert!(f.pipeline.post("/orders", Some(json!({}))).await.is_err());
        assert_eq!(f.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn mutations_bypass_cache() {
        let f = fixture(config());
        f.transport.always_ok(json!({"id": 1}));

        for method in [Method::Post, Method::Put, Method::Delete] {
            let descriptor = RequestDescriptor::new(method, "/orders/1").with_cache(CachePolicy::DefaultTtl);
            f.pipeline.request(descriptor.clone()).await.unwrap();
            f.pipeline.request(descriptor).await.unwrap();
        }
        assert_eq!(f.transport.call_count(), 6);
        assert!(f.pipeline.cache().is_empty());
    }

    #[tokio::test]
    async fn cached_get_skips_transport() {
        let f = fixture(config());
        f.transport.always_ok(json!([1, 2]));

        let descriptor = RequestDescriptor::get("/items").cached_for(Duration::from_secs(60));
        assert_eq!(f.pipeline.request(descriptor.clone()).await.unwrap(), json!([1, 2]));
        assert_eq!(f.pipeline.request(descriptor).await.unwrap(), json!([1, 2]));
        assert_eq!(f.transport.call_count(), 1);
    }

    #[tokio::test]
    async fn uncached_get_always_hits_transport() {
        let f = fixture(config());
        f.transport.always_ok(json!(1));

        f.pipeline.get("/items", None).await.unwrap();
        f.pipeline.get("/items", None).await.unwrap();
        assert_eq!(f.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn every_shown_loading_hint_is_hidden_once() {
        let f = fixture(config());
        f.transport.push_ok(json!(1)).push_status(500, Value::Null);

        let cached = RequestDescriptor::get("/a").with_cache(CachePolicy::DefaultTtl);
        f.pipeline.request(cached.clone()).await.unwrap();
        f.pipeline.request(RequestDescriptor::get("/b")).await.unwrap_err();
        f.pipeline.request(cached).await.unwrap();

        assert_eq!(f.notifier.count(|e| matches!(e, NotifyEvent::HideLoading)), 2);
        assert_eq!(f.notifier.count(|e| matches!(e, NotifyEvent::ShowLoading(_))), 2);
    }

    #[tokio::test]
    async fn loading_toggled_by_interceptor_stays_balanced() {
        let f = fixture(config());
        f.transport.always_ok(json!(1));
        let id = f
            .pipeline
            .interceptors()
            .request
            .use_fn(|descriptor: RequestDescriptor| async move { Ok(descriptor.with_loading(true)) });

        f.pipeline
            .request(RequestDescriptor::get("/a").with_loading(false))
            .await
            .unwrap();
        assert_eq!(
            f.notifier.events(),
            vec![
                NotifyEvent::ShowLoading("Loading...".into()),
                NotifyEvent::HideLoading
            ]
        );

        f.pipeline.interceptors().request.eject(id);
        f.pipeline
            .interceptors()
            .request
            .use_fn(|descriptor: RequestDescriptor| async move { Ok(descriptor.with_loading(false)) });
        f.pipeline.request(RequestDescriptor::get("/b")).await.unwrap();
        assert_eq!(f.notifier.events().len(), 2);
    }

    #[tokio::test]
    async fn body_rejected_by_response_chain_is_not_cached() {
        let f = fixture(config());
        f.transport
            .push_ok(json!({"code": 10_001, "message": "busy"}))
            .push_ok(json!({"code": 200, "data": "fresh"}));
        f.pipeline
            .interceptors()
            .response
            .use_fn(|body: Value| async move {
                if body["code"] == 200 {
                    Ok(body)
                } else {
                    Err(StorefrontError::from_status(500, body))
                }
            });

        let descriptor = RequestDescriptor::get("/flaky").with_cache(CachePolicy::DefaultTtl);
        f.pipeline.request(descriptor.clone()).await.unwrap_err();
        assert!(f.pipeline.cache().is_empty());

        let body = f.pipeline.request(descriptor).await.unwrap();
        assert_eq!(body["data"], "fresh");
        assert_eq!(f.transport.call_count(), 2);
    }

    #[tokio::test]
    async fn loading_and_error_hints_can_be_suppressed() {
        let f = fixture(config());
        f.transport.push_status(500, Value::Null);

        let descriptor = RequestDescriptor::get("/quiet")
            .with_loading(false)
            .with_error_toast(false);
        f.pipeline.request(descriptor).await.unwrap_err();
        assert!(f.notifier.events().is_empty());
    }

    #[tokio::test]
    async fn builds_full_url_with_sorted_query() {
        let f = fixture(config());
        f.transport.push_ok(Value::Null);

        f.pipeline
            .get("/items", Some(json!({"size": 10, "page": 2})))
            .await
            .unwrap();
        let call = &f.transport.calls()[0];
        assert_eq!(call.url, "http://storefront.test/v1/items?page=2&size=10");
        assert_eq!(call.headers["Content-Type"], "application/json");
        assert_eq!(call.timeout, DEFAULT_TIMEOUT);
    }

    #[tokio::test]
    async fn clear_url_cache_only_removes_that_url() {
        let f = fixture(config());
        f.transport.always_ok(json!(1));

        for (url, page) in [("/items", 1), ("/items", 2), ("/items.v2", 1), ("/orders", 1)] {
            let descriptor = RequestDescriptor::get(url)
                .with_params(json!({ "page": page }))
                .with_cache(CachePolicy::DefaultTtl);
            f.pipeline.request(descriptor).await.unwrap();
        }

        assert_eq!(f.pipeline.clear_url_cache("/items", Method::Get).unwrap(), 2);
        assert_eq!(f.pipeline.cache().len(), 2);

        f.pipeline.clear_cache();
        assert!(f.pipeline.cache().is_empty());
    }

    #[tokio::test]
    async fn response_chain_runs_on_cache_hits_too() {
        let f = fixture(config());
        f.transport.always_ok(json!({"code": 200, "data": "payload"}));
        f.pipeline
            .interceptors()
            .response
            .use_fn(|body: Value| async move { Ok(body["data"].clone()) });

        let descriptor = RequestDescriptor::get("/wrapped").with_cache(CachePolicy::DefaultTtl);
        assert_eq!(f.pipeline.request(descriptor.clone()).await.unwrap(), json!("payload"));
        assert_eq!(f.pipeline.request(descriptor).await.unwrap(), json!("payload"));
        assert_eq!(f.transport.call_count(), 1);
    }
}
