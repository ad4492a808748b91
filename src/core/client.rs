//! Client facade wiring the pipeline, cache and token manager together.
//!
//! [`ClientBuilder`] owns every collaborator; nothing here is global. The
//! default interceptors it installs are what make the pipeline auth-aware:
//!
//! - request: attach `Authorization: Bearer <token>` when signed in
//! - response: unwrap the `{code, message, data}` envelope
//! - error: on 401/403 or a failed refresh, clear the session and open the
//!   sign-in route

use std::path::PathBuf;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::cache::{CacheConfig, CacheManager};
use super::interceptor::Interceptors;
use super::models::{ApiEnvelope, SessionStatus, is_envelope};
use super::notify::{AuthRedirect, Notifier, TracingNotifier, log_redirect};
use super::pipeline::{PipelineConfig, RequestPipeline};
use super::request::{RequestDescriptor, join_url};
use super::token::{HttpTokenRefresher, TokenConfig, TokenManager, TokenRefresher, parse_token_response};
use super::transport::{ReqwestTransport, Transport};
use crate::error::{Result, StorefrontError};
use crate::storage::config::{AuthSection, ResolvedConfig};
use crate::storage::kv::{KeyValueStore, MemoryStore, open_store};

/// Endpoints and routes used by the session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRoutes {
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    /// Passed to the auth redirect when the session is rejected.
    pub login_route: String,
}

impl Default for AuthRoutes {
    fn default() -> Self {
        Self::from(&AuthSection::default())
    }
}

impl From<&AuthSection> for AuthRoutes {
    fn from(auth: &AuthSection) -> Self {
        Self {
            login_path: auth.login_path.clone(),
            refresh_path: auth.refresh_path.clone(),
            logout_path: auth.logout_path.clone(),
            login_route: auth.login_route.clone(),
        }
    }
}

/// Unwrap a `{code, message, data}` envelope.
///
/// Bodies without a numeric `code` pass through unchanged. Codes `200` and
/// `0` yield `data` (or `null`); HTTP-like codes are classified as a status
/// would be, anything else becomes an application error.
///
/// # Errors
///
/// Returns the classified error for a rejecting envelope.
pub fn unwrap_envelope(body: Value) -> Result<Value> {
    if !is_envelope(&body) {
        return Ok(body);
    }
    let envelope: ApiEnvelope = serde_json::from_value(body.clone())?;
    if envelope.is_success() {
        return Ok(envelope.data.unwrap_or(Value::Null));
    }

    let code = envelope.code;
    match u16::try_from(code).ok().filter(|c| (100..600).contains(c)) {
        Some(status) => Err(StorefrontError::from_status(status, body)),
        None => Err(StorefrontError::Application {
            status: 200,
            message: envelope
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Request rejected (code {code})")),
            body: Some(body),
        }),
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`StorefrontClient`].
pub struct ClientBuilder {
    pipeline: PipelineConfig,
    cache: CacheConfig,
    token: TokenConfig,
    routes: AuthRoutes,
    transport: Option<Arc<dyn Transport>>,
    store: Option<Arc<dyn KeyValueStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    notifier: Option<Arc<dyn Notifier>>,
    on_auth_failure: Option<AuthRedirect>,
    default_interceptors: bool,
    unwrap_envelopes: bool,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            cache: CacheConfig::default(),
            token: TokenConfig::default(),
            routes: AuthRoutes::default(),
            transport: None,
            store: None,
            refresher: None,
            notifier: None,
            on_auth_failure: None,
            default_interceptors: true,
            unwrap_envelopes: true,
        }
    }
}

impl ClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every setting from resolved configuration. The configured
    /// token store is opened under `store_dir`.
    #[must_use]
    pub fn from_config(config: &ResolvedConfig, store_dir: PathBuf) -> Self {
        Self::new()
            .pipeline_config(config.pipeline_config())
            .cache_config(config.cache_config())
            .token_config(config.token_config())
            .auth_routes(AuthRoutes::from(&config.auth))
            .store(open_store(config.token_store, store_dir))
    }

    #[must_use]
    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline = config;
        self
    }

    #[must_use]
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    #[must_use]
    pub fn token_config(mut self, config: TokenConfig) -> Self {
        self.token = config;
        self
    }

    #[must_use]
    pub fn auth_routes(mut self, routes: AuthRoutes) -> Self {
        self.routes = routes;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the HTTP refresher, which otherwise posts to `refresh_path`.
    #[must_use]
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Navigation callback receiving the sign-in route.
    #[must_use]
    pub fn on_auth_failure(mut self, redirect: AuthRedirect) -> Self {
        self.on_auth_failure = Some(redirect);
        self
    }

    /// Leave all three interceptor chains empty.
    #[must_use]
    pub fn without_default_interceptors(mut self) -> Self {
        self.default_interceptors = false;
        self
    }

    /// Keep the auth interceptors but return envelopes unmodified.
    #[must_use]
    pub fn keep_envelopes(mut self) -> Self {
        self.unwrap_envelopes = false;
        self
    }

    /// Build the client and start the cache sweeper on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Config`] if the default HTTP transport
    /// cannot be built.
    pub fn build(self) -> Result<StorefrontClient> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let refresher = self.refresher.unwrap_or_else(|| {
            Arc::new(HttpTokenRefresher::new(
                Arc::clone(&transport),
                join_url(&self.pipeline.base_url, &self.routes.refresh_path),
                self.pipeline.timeout,
            ))
        });
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier));
        let redirect = self.on_auth_failure.unwrap_or_else(log_redirect);

        let cache = Arc::new(CacheManager::new(self.cache));
        cache.start_sweeper();

        let tokens = TokenManager::new(self.token, store, refresher);
        let pipeline = RequestPipeline::new(self.pipeline, transport, cache, notifier);

        if self.default_interceptors {
            install_default_interceptors(
                pipeline.interceptors(),
                &tokens,
                redirect,
                self.routes.login_route.clone(),
                self.unwrap_envelopes,
            );
        }

        Ok(StorefrontClient {
            pipeline: Arc::new(pipeline),
            tokens,
            routes: self.routes,
        })
    }
}

fn install_default_interceptors(
    interceptors: &Interceptors,
    tokens: &TokenManager,
    redirect: AuthRedirect,
    login_route: String,
    unwrap_envelopes: bool,
) {
    let bearer_tokens = tokens.clone();
    interceptors.request.use_fn(move |mut descriptor: RequestDescriptor| {
        let tokens = bearer_tokens.clone();
        async move {
            let has_auth = descriptor
                .headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case("authorization"));
            if !has_auth {
                if let Some(token) = tokens.fresh_token().await? {
                    descriptor
                        .headers
                        .insert("Authorization".to_string(), format!("Bearer {token}"));
                }
            }
            Ok(descriptor)
        }
    });

    if unwrap_envelopes {
        interceptors
            .response
            .use_fn(|body: Value| async move { unwrap_envelope(body) });
    }

    let auth_tokens = tokens.clone();
    interceptors.error.use_fn(move |err: StorefrontError| {
        let tokens = auth_tokens.clone();
        let redirect = Arc::clone(&redirect);
        let route = login_route.clone();
        async move {
            if err.is_auth_failure() {
                if let Err(clear_err) = tokens.clear_token().await {
                    tracing::warn!(error = %clear_err, "Failed to clear rejected session");
                }
                tracing::info!(%route, error = %err, "Session rejected");
                redirect(&route);
            }
            err
        }
    });
}

// =============================================================================
// Client
// =============================================================================

/// Storefront API client. Cheap to clone; clones share every component.
#[derive(Debug, Clone)]
pub struct StorefrontClient {
    pipeline: Arc<RequestPipeline>,
    tokens: TokenManager,
    routes: AuthRoutes,
}

impl StorefrontClient {
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    #[must_use]
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    #[must_use]
    pub const fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheManager<Value>> {
        self.pipeline.cache()
    }

    #[must_use]
    pub fn interceptors(&self) -> &Arc<Interceptors> {
        self.pipeline.interceptors()
    }

    #[must_use]
    pub const fn routes(&self) -> &AuthRoutes {
        &self.routes
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::request`].
    pub async fn request(&self, descriptor: RequestDescriptor) -> Result<Value> {
        self.pipeline.request(descriptor).await
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::request`].
    pub async fn get(&self, url: &str, params: Option<Value>) -> Result<Value> {
        self.pipeline.get(url, params).await
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::request`].
    pub async fn post(&self, url: &str, body: Option<Value>) -> Result<Value> {
        self.pipeline.post(url, body).await
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::request`].
    pub async fn put(&self, url: &str, body: Option<Value>) -> Result<Value> {
        self.pipeline.put(url, body).await
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::request`].
    pub async fn delete(&self, url: &str, params: Option<Value>) -> Result<Value> {
        self.pipeline.delete(url, params).await
    }

    /// # Errors
    ///
    /// See [`RequestPipeline::get_json`].
    pub async fn get_json<T: DeserializeOwned>(&self, descriptor: RequestDescriptor) -> Result<T> {
        self.pipeline.get_json(descriptor).await
    }

    /// Restore the persisted session, if it is still valid.
    ///
    /// # Errors
    ///
    /// Returns error if the token store cannot be read.
    pub async fn restore_session(&self) -> Result<bool> {
        self.tokens.load().await
    }

    /// Sign in and store the returned token pair.
    ///
    /// Any existing session is cleared first so a stale token is never sent
    /// with the credentials.
    ///
    /// # Errors
    ///
    /// Returns the request error, or [`StorefrontError::InvalidResponse`] if
    /// the response carries no token pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionStatus> {
        self.tokens.clear_token().await?;
        let descriptor = RequestDescriptor::post(&self.routes.login_path)
            .with_body(json!({ "username": username, "password": password }))
            .with_loading_text("Signing in...");
        let body = self.pipeline.request(descriptor).await?;
        let info = parse_token_response(body)?;
        self.tokens.set_token(&info).await?;
        tracing::info!(username, "Signed in");
        Ok(self.tokens.status())
    }

    /// Sign out: notify the server, then drop the session and cached
    /// responses. The server call is best effort.
    ///
    /// # Errors
    ///
    /// Returns error if the token store cannot be cleared.
    pub async fn logout(&self) -> Result<()> {
        if self.tokens.is_logged_in() {
            let descriptor = RequestDescriptor::post(&self.routes.logout_path)
                .with_loading(false)
                .with_error_toast(false);
            if let Err(err) = self.pipeline.request(descriptor).await {
                tracing::debug!(error = %err, "Logout call failed; clearing local session anyway");
            }
        }
        self.tokens.clear_token().await?;
        self.pipeline.clear_cache();
        tracing::info!("Signed out");
        Ok(())
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.tokens.status()
    }

    /// Stop the cache sweeper and drop cached responses.
    pub fn shutdown(&self) {
        self.pipeline.cache().shutdown();
    }
}
