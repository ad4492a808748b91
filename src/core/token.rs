//! Access/refresh token lifecycle.
//!
//! [`TokenManager`] owns the session, persists it through a
//! [`KeyValueStore`] on every mutation, and refreshes it before expiry.
//!
//! At most one refresh runs at a time. The pending refresh is a
//! [`Shared`] future stored in a slot that is checked and set under a
//! mutex without an intervening `.await`; every trigger that finds the slot
//! occupied attaches to the same future. The refresh is spawned as its own
//! task, so callers that stop waiting do not cancel it.
//!
//! Clearing the session bumps a generation counter. A refresh that started
//! under an older generation cannot reinstall a token afterwards.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::{Value, json};

use super::models::{ApiEnvelope, SessionPhase, SessionStatus, TokenInfo, TokenState, is_envelope};
use super::request::Method;
use super::transport::{Transport, TransportRequest};
use crate::error::{Result, StorefrontError};
use crate::storage::kv::KeyValueStore;

/// Refresh once less than this much lifetime remains.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);
/// Storage key of the persisted session.
pub const DEFAULT_TOKEN_KEY: &str = "token";

type RefreshOutcome = std::result::Result<String, String>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

// =============================================================================
// Refresher
// =============================================================================

/// Exchanges a refresh token for a new token pair.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenInfo>;
}

/// Calls the refresh endpoint: `POST {refreshToken}` expecting
/// `{code: 200, data: {accessToken, refreshToken, expire}}`.
pub struct HttpTokenRefresher {
    transport: Arc<dyn Transport>,
    url: String,
    timeout: Duration,
}

impl HttpTokenRefresher {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            url: url.into(),
            timeout,
        }
    }
}

/// Extract a [`TokenInfo`] from a login or refresh response body.
///
/// # Errors
///
/// Returns [`StorefrontError::Application`] for a rejecting envelope and
/// [`StorefrontError::InvalidResponse`] when no token pair is present.
pub fn parse_token_response(body: Value) -> Result<TokenInfo> {
    let data = if is_envelope(&body) {
        let envelope: ApiEnvelope = serde_json::from_value(body)?;
        if !envelope.is_success() {
            return Err(StorefrontError::Application {
                status: u16::try_from(envelope.code).unwrap_or(0),
                message: envelope
                    .message
                    .unwrap_or_else(|| "token request rejected".to_string()),
                body: None,
            });
        }
        envelope.data.unwrap_or(Value::Null)
    } else {
        body
    };

    serde_json::from_value(data)
        .map_err(|e| StorefrontError::InvalidResponse(format!("missing token pair: {e}")))
}

impl fmt::Debug for HttpTokenRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTokenRefresher")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenInfo> {
        let request = TransportRequest {
            method: Method::Post,
            url: self.url.clone(),
            headers: std::iter::once(("Content-Type".to_string(), "application/json".to_string()))
                .collect(),
            body: Some(json!({ "refreshToken": refresh_token })),
            timeout: self.timeout,
        };

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| e.into_error(&self.url))?;

        if !response.is_success() {
            return Err(StorefrontError::from_status(response.status, response.body));
        }
        parse_token_response(response.body)
    }
}

// =============================================================================
// Token Manager
// =============================================================================

/// Token manager settings.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub refresh_threshold: Duration,
    pub storage_key: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            storage_key: DEFAULT_TOKEN_KEY.to_string(),
        }
    }
}

struct Inner {
    config: TokenConfig,
    state: Mutex<Option<TokenState>>,
    inflight: Mutex<Option<SharedRefresh>>,
    generation: AtomicU64,
    refresh_calls: AtomicU64,
    store: Arc<dyn KeyValueStore>,
    refresher: Arc<dyn TokenRefresher>,
}

/// Owns the session and coordinates refreshes. Cloning shares the session.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("config", &self.inner.config)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, Option<TokenState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn inflight(&self) -> MutexGuard<'_, Option<SharedRefresh>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `state` unless the session changed since `expected` was read.
    fn install(&self, state: TokenState, expected: Option<u64>) -> bool {
        let mut slot = self.state();
        if expected.is_some_and(|generation| generation != self.generation.load(Ordering::SeqCst)) {
            return false;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        *slot = Some(state);
        true
    }

    /// Drop the in-memory session unless it changed since `expected`.
    fn forget(&self, expected: Option<u64>) -> bool {
        let mut slot = self.state();
        if expected.is_some_and(|generation| generation != self.generation.load(Ordering::SeqCst)) {
            return false;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        slot.take().is_some()
    }

    async fn persist(&self, state: &TokenState, ttl: Duration) -> Result<()> {
        let value = serde_json::to_value(state)?;
        self.store
            .set(&self.config.storage_key, value, Some(ttl))
            .await
    }

    async fn run_refresh(self: Arc<Self>) -> RefreshOutcome {
        let (generation, refresh_token) = {
            let state = self.state();
            (
                self.generation.load(Ordering::SeqCst),
                state.as_ref().map(|s| s.refresh_token.clone()),
            )
        };

        let outcome = match refresh_token {
            Some(refresh_token) => {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("Refreshing access token");
                self.refresher
                    .refresh(&refresh_token)
                    .await
                    .map_err(|e| e.to_string())
            }
            None => Err("no refresh token stored".to_string()),
        };

        let result = match outcome {
            Ok(info) => {
                let state = TokenState::from_info(&info, Utc::now());
                if self.install(state.clone(), Some(generation)) {
                    if let Err(e) = self.persist(&state, info.expires_in()).await {
                        tracing::warn!(error = %e, "Failed to persist refreshed token");
                    }
                    tracing::info!(expire_at = %state.expire_at, "Access token refreshed");
                    Ok(state.access_token)
                } else {
                    tracing::info!("Session changed during refresh; discarding refreshed token");
                    Err("session was cleared during refresh".to_string())
                }
            }
            Err(reason) => {
                tracing::error!(%reason, "Token refresh failed; clearing session");
                if self.forget(Some(generation)) {
                    if let Err(e) = self.store.remove(&self.config.storage_key).await {
                        tracing::warn!(error = %e, "Failed to remove persisted token");
                    }
                }
                Err(reason)
            }
        };

        self.inflight().take();
        result
    }
}

impl TokenManager {
    #[must_use]
    pub fn new(
        config: TokenConfig,
        store: Arc<dyn KeyValueStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(None),
                inflight: Mutex::new(None),
                generation: AtomicU64::new(0),
                refresh_calls: AtomicU64::new(0),
                store,
                refresher,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.inner.config
    }

    /// Restore the persisted session.
    ///
    /// An expired session is cleared. Returns whether a usable session was
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read.
    pub async fn load(&self) -> Result<bool> {
        let key = &self.inner.config.storage_key;
        let Some(value) = self.inner.store.get(key).await? else {
            return Ok(false);
        };

        let state: TokenState = match serde_json::from_value(value) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable persisted token");
                self.clear_token().await?;
                return Ok(false);
            }
        };

        if state.is_expired_at(Utc::now()) {
            tracing::info!(expire_at = %state.expire_at, "Persisted token expired");
            self.clear_token().await?;
            return Ok(false);
        }

        tracing::debug!(expire_at = %state.expire_at, "Restored persisted token");
        self.inner.install(state, None);
        Ok(true)
    }

    /// Current access token without waiting.
    ///
    /// When the remaining lifetime is below the refresh threshold a refresh
    /// is started in the background (or joined, if one is running). The
    /// value returned is the token held right now, which may be close to
    /// expiry.
    #[must_use]
    pub fn get_token(&self) -> Option<String> {
        let (token, due) = {
            let state = self.inner.state();
            let state = state.as_ref()?;
            (
                state.access_token.clone(),
                state.needs_refresh(Utc::now(), self.inner.config.refresh_threshold),
            )
        };

        if due {
            if tokio::runtime::Handle::try_current().is_ok() {
                drop(self.pending_refresh());
            } else {
                tracing::debug!("No async runtime; skipping background token refresh");
            }
        }
        Some(token)
    }

    /// Access token that is not yet expired.
    ///
    /// Waits on the refresh only when the held token has already expired;
    /// a token that is merely close to expiry is returned immediately and
    /// refreshed in the background, as [`Self::get_token`] does.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::RefreshFailed`] if the required refresh
    /// fails. The session is cleared in that case.
    pub async fn fresh_token(&self) -> Result<Option<String>> {
        let expired = {
            let state = self.inner.state();
            match state.as_ref() {
                None => return Ok(None),
                Some(state) => state.is_expired_at(Utc::now()),
            }
        };

        if expired {
            self.refresh().await.map(Some)
        } else {
            Ok(self.get_token())
        }
    }

    /// Refresh now, or join the refresh already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::RefreshFailed`] when the refresh endpoint
    /// fails or no refresh token is stored.
    pub async fn refresh(&self) -> Result<String> {
        self.pending_refresh()
            .await
            .map_err(|reason| StorefrontError::RefreshFailed { reason })
    }

    /// The in-flight refresh, creating and spawning one if none exists.
    fn pending_refresh(&self) -> SharedRefresh {
        let mut slot = self.inner.inflight();
        if let Some(existing) = slot.as_ref() {
            return existing.clone();
        }

        let shared = Arc::clone(&self.inner).run_refresh().boxed().shared();
        *slot = Some(shared.clone());
        drop(slot);

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(shared.clone());
        }
        shared
    }

    /// Store a new session, computing the absolute expiry from `info.expire`.
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails. The in-memory session is
    /// updated regardless.
    pub async fn set_token(&self, info: &TokenInfo) -> Result<()> {
        let state = TokenState::from_info(info, Utc::now());
        self.inner.install(state.clone(), None);
        tracing::info!(expire_at = %state.expire_at, "Token stored");
        self.inner.persist(&state, info.expires_in()).await
    }

    /// Drop the session from memory and storage. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns error if the store delete fails.
    pub async fn clear_token(&self) -> Result<()> {
        if self.inner.forget(None) {
            tracing::info!("Token cleared");
        }
        self.inner.store.remove(&self.inner.config.storage_key).await
    }

    /// Whether a session is held and its access token has not expired.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.inner
            .state()
            .as_ref()
            .is_some_and(|state| !state.is_expired_at(Utc::now()))
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .state()
            .as_ref()
            .map(|state| state.refresh_token.clone())
    }

    /// Copy of the current session.
    #[must_use]
    pub fn state(&self) -> Option<TokenState> {
        self.inner.state().clone()
    }

    #[must_use]
    pub fn is_refresh_pending(&self) -> bool {
        self.inner.inflight().is_some()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.is_refresh_pending() {
            SessionPhase::RefreshPending
        } else if self.inner.state().is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let now = Utc::now();
        let state = self.state();
        SessionStatus {
            phase: self.phase(),
            expire_at: state.as_ref().map(|s| s.expire_at),
            expires_in_secs: state.as_ref().map(|s| s.remaining(now).num_seconds()),
            needs_refresh: state
                .as_ref()
                .is_some_and(|s| s.needs_refresh(now, self.inner.config.refresh_threshold)),
        }
    }

    /// Number of refresh calls issued to the refresher so far.
    #[must_use]
    pub fn refresh_calls(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }
}
