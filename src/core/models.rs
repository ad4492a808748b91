//! Wire and session models.
//!
//! These types mirror the JSON exchanged with the storefront API and the
//! token document persisted between runs.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Response Envelope
// =============================================================================

/// Standard storefront response wrapper: `{code, message, data}`.
///
/// A `code` of `200` or `0` means the call succeeded and `data` holds the
/// payload. Any other code is a business-level rejection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiEnvelope<T = Value> {
    #[serde(default)]
    pub code: i64,

    #[serde(default, alias = "msg", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Successful envelope carrying `data`.
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: None,
            data: Some(data),
        }
    }

    /// Whether the business code signals success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, 0 | 200)
    }
}

/// Whether a raw body has the envelope shape (an object with a numeric `code`).
#[must_use]
pub fn is_envelope(value: &Value) -> bool {
    value.get("code").is_some_and(Value::is_i64)
}

// =============================================================================
// Token Models
// =============================================================================

/// Token pair as returned by the login and refresh endpoints.
///
/// `expire` is relative: seconds from now until the access token lapses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(alias = "expiresIn")]
    pub expire: u64,
}

impl TokenInfo {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>, expire: u64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expire,
        }
    }

    /// Lifetime of the access token.
    #[must_use]
    pub const fn expires_in(&self) -> Duration {
        Duration::from_secs(self.expire)
    }
}

/// The stored session. Absent means unauthenticated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    pub expire_at: DateTime<Utc>,
}

impl TokenState {
    /// Convert a relative [`TokenInfo`] into an absolute expiry at `now`.
    #[must_use]
    pub fn from_info(info: &TokenInfo, now: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(info.expire)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        Self {
            access_token: info.access_token.clone(),
            refresh_token: info.refresh_token.clone(),
            expire_at: now
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Time left before expiry. Negative once expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        self.expire_at.signed_duration_since(now)
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expire_at
    }

    /// Whether the remaining lifetime has dropped below `threshold`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        TimeDelta::from_std(threshold).map_or(true, |threshold| self.remaining(now) < threshold)
    }
}

// =============================================================================
// Session Status
// =============================================================================

/// Token manager lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unauthenticated,
    Authenticated,
    RefreshPending,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "signed out"),
            Self::Authenticated => write!(f, "signed in"),
            Self::RefreshPending => write!(f, "refreshing"),
        }
    }
}

/// Snapshot reported by `sfc token`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub phase: SessionPhase,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,

    pub needs_refresh: bool,
}
