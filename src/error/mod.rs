//! Error types for storefront-client.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are categorized by how the request pipeline reacts to them:
//! - **Network**: timeouts and connection failures. Transient, retried for GET.
//! - **Application**: the server answered with a non-2xx status. Never retried.
//! - **Authentication**: 401/403 answers and failed token refreshes. These
//!   clear the stored session.
//! - **Configuration**: config file parsing, validation, or invalid patterns.
//! - **Storage**: the durable key-value store failed.
//! - **Internal**: I/O, JSON, and unclassified errors.
//!
//! Each error has a stable error code (e.g., `SFC-N001`) for programmatic handling.

pub mod suggestions;

use serde_json::Value;
use thiserror::Error;

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Transient transport failures (timeout, connection refused, reset).
    Network,
    /// Server rejected the request with a non-2xx status.
    Application,
    /// Session problems (401/403, missing or unrefreshable token).
    Authentication,
    /// Configuration issues (parse errors, invalid values, bad patterns).
    Configuration,
    /// Durable storage failures.
    Storage,
    /// Internal errors (bugs, unexpected state, unclassified).
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network error",
            Self::Application => "Application error",
            Self::Authentication => "Authentication error",
            Self::Configuration => "Configuration error",
            Self::Storage => "Storage error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Network => "N",
            Self::Application => "P",
            Self::Authentication => "A",
            Self::Configuration => "C",
            Self::Storage => "S",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the `sfc` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure or application error
    GeneralError = 1,
    /// Timeout or connection failure after retries
    NetworkError = 2,
    /// Config or response parse errors
    ParseError = 3,
    /// Not signed in, session rejected or refresh failed
    AuthRequired = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for storefront-client operations.
///
/// Each variant has:
/// - A stable error code (e.g., `SFC-A001`)
/// - A category for classification
/// - A retryable flag for retry logic
#[derive(Error, Debug)]
pub enum StorefrontError {
    // ==========================================================================
    // Transient network errors (Category: Network)
    // ==========================================================================
    /// The transport gave up waiting for a response.
    #[error("request timeout after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    /// The transport could not reach the server.
    #[error("connection failed for {url}: {message}")]
    Connection { url: String, message: String },

    // ==========================================================================
    // Application errors (Category: Application)
    // ==========================================================================
    /// The server answered with a non-2xx status.
    #[error("request failed with status {status}: {message}")]
    Application {
        status: u16,
        message: String,
        body: Option<Value>,
    },

    /// The response did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    // ==========================================================================
    // Authentication errors (Category: Authentication)
    // ==========================================================================
    /// The server rejected the session (401) or the permission (403).
    #[error("unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// The refresh endpoint failed; the session has been cleared.
    #[error("token refresh failed: {reason}")]
    RefreshFailed { reason: String },

    /// An operation needed a session but none is stored.
    #[error("not signed in")]
    NotAuthenticated,

    // ==========================================================================
    // Configuration errors (Category: Configuration)
    // ==========================================================================
    /// Error parsing configuration file.
    #[error("config parse error at {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// Invalid value in configuration.
    #[error("invalid config value for '{key}': {message}")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A cache invalidation pattern failed to compile.
    #[error("invalid cache pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    // ==========================================================================
    // Storage errors (Category: Storage)
    // ==========================================================================
    /// The durable key-value store failed.
    #[error("storage error for '{key}': {message}")]
    Storage { key: String, message: String },

    // ==========================================================================
    // I/O errors (Category: Internal)
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for storefront-client operations.
pub type Result<T> = std::result::Result<T, StorefrontError>;

impl StorefrontError {
    /// Classify a non-2xx response.
    ///
    /// 401 and 403 become [`StorefrontError::Unauthorized`]; everything else is
    /// an [`StorefrontError::Application`] error. The message is taken from the
    /// body's `message` (or `msg`) field when present.
    #[must_use]
    pub fn from_status(status: u16, body: Value) -> Self {
        let message = body
            .get("message")
            .or_else(|| body.get("msg"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map_or_else(|| default_status_message(status), str::to_string);

        if matches!(status, 401 | 403) {
            Self::Unauthorized { status, message }
        } else {
            let body = (!body.is_null()).then_some(body);
            Self::Application {
                status,
                message,
                body,
            }
        }
    }

    /// Map error to process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => ExitCode::NetworkError,

            Self::Unauthorized { .. } | Self::RefreshFailed { .. } | Self::NotAuthenticated => {
                ExitCode::AuthRequired
            }

            Self::InvalidResponse(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_)
            | Self::InvalidPattern(_)
            | Self::Json(_) => ExitCode::ParseError,

            Self::Application { .. } | Self::Storage { .. } | Self::Io(_) | Self::Other(_) => {
                ExitCode::GeneralError
            }
        }
    }

    /// Returns the error category for classification and routing.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. } | Self::Connection { .. } => ErrorCategory::Network,

            Self::Application { .. } | Self::InvalidResponse(_) => ErrorCategory::Application,

            Self::Unauthorized { .. } | Self::RefreshFailed { .. } | Self::NotAuthenticated => {
                ErrorCategory::Authentication
            }

            Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::Config(_)
            | Self::InvalidPattern(_) => ErrorCategory::Configuration,

            Self::Storage { .. } => ErrorCategory::Storage,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `SFC-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            // Network errors (N001-N099)
            Self::Timeout { .. } => "SFC-N001",
            Self::Connection { .. } => "SFC-N002",

            // Application errors (P001-P099)
            Self::Application { .. } => "SFC-P001",
            Self::InvalidResponse(_) => "SFC-P002",

            // Authentication errors (A001-A099)
            Self::Unauthorized { .. } => "SFC-A001",
            Self::RefreshFailed { .. } => "SFC-A002",
            Self::NotAuthenticated => "SFC-A003",

            // Configuration errors (C001-C099)
            Self::ConfigParse { .. } => "SFC-C001",
            Self::ConfigInvalid { .. } => "SFC-C002",
            Self::Config(_) => "SFC-C003",
            Self::InvalidPattern(_) => "SFC-C004",

            // Storage errors (S001-S099)
            Self::Storage { .. } => "SFC-S001",

            // Internal errors (X001-X099)
            Self::Io(_) => "SFC-X001",
            Self::Json(_) => "SFC-X002",
            Self::Other(_) => "SFC-X099",
        }
    }

    /// Whether the failure is transient and may succeed if the request is sent again.
    ///
    /// Only transport-level failures qualify. A response with any status code,
    /// including 5xx, is an answer from the server and is not retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }

    /// Whether this error invalidates the stored session.
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::RefreshFailed { .. })
    }

    /// HTTP status carried by the error, if the server answered.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Application { status, .. } | Self::Unauthorized { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Normalized, user-facing message shown in error toasts.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => "Request timed out, please try again".to_string(),
            Self::Connection { .. } => "Network unavailable, please check your connection".to_string(),
            Self::Application { message, .. } | Self::Unauthorized { message, .. } => {
                message.clone()
            }
            Self::RefreshFailed { .. } | Self::NotAuthenticated => {
                default_status_message(401)
            }
            other => other.to_string(),
        }
    }

    /// Returns actionable fix suggestions for this error.
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::Timeout { url, timeout_ms } => suggestions::timeout_suggestions(url, *timeout_ms),
            Self::Connection { url, .. } => suggestions::connection_suggestions(url),
            Self::Application { status, .. } => suggestions::application_suggestions(*status),
            Self::InvalidResponse(_) => suggestions::invalid_response_suggestions(),
            Self::Unauthorized { status, .. } => suggestions::unauthorized_suggestions(*status),
            Self::RefreshFailed { .. } | Self::NotAuthenticated => {
                suggestions::sign_in_suggestions()
            }
            Self::ConfigParse { path, message } => {
                suggestions::config_parse_suggestions(path, message)
            }
            Self::ConfigInvalid { key, value, message } => {
                suggestions::config_invalid_suggestions(key, value, message)
            }
            Self::Config(msg) => vec![FixSuggestion::new(
                vec!["sfc config show".to_string()],
                format!("Configuration error: {msg}"),
            )],
            Self::InvalidPattern(_) => vec![FixSuggestion::new(
                Vec::new(),
                "Cache invalidation patterns are regular expressions; escape literal URLs.",
            )],
            Self::Storage { key, .. } => suggestions::storage_suggestions(key),
            Self::Io(_) | Self::Json(_) | Self::Other(_) => Vec::new(),
        }
    }
}

/// Default toast text for a status code when the server sent no message.
#[must_use]
pub fn default_status_message(status: u16) -> String {
    match status {
        401 => "Unauthorized, please sign in again".to_string(),
        403 => "Access denied".to_string(),
        404 => "Resource not found".to_string(),
        500 => "Server error".to_string(),
        502 => "Bad gateway".to_string(),
        503 => "Service unavailable".to_string(),
        504 => "Gateway timeout".to_string(),
        other => format!("Request failed ({other})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn network_errors() -> Vec<StorefrontError> {
        vec![
            StorefrontError::Timeout {
                url: "/items".to_string(),
                timeout_ms: 10_000,
            },
            StorefrontError::Connection {
                url: "/items".to_string(),
                message: "connection refused".to_string(),
            },
        ]
    }

    #[test]
    fn error_category_code_prefix() {
        assert_eq!(ErrorCategory::Network.code_prefix(), "N");
        assert_eq!(ErrorCategory::Application.code_prefix(), "P");
        assert_eq!(ErrorCategory::Authentication.code_prefix(), "A");
        assert_eq!(ErrorCategory::Storage.code_prefix(), "S");
    }

    #[test]
    fn network_errors_are_retryable() {
        for err in network_errors() {
            assert!(err.is_retryable(), "{err:?} should be retryable");
            assert_eq!(err.category(), ErrorCategory::Network);
            assert_eq!(err.exit_code(), ExitCode::NetworkError);
        }
    }

    #[test]
    fn status_errors_are_never_retryable() {
        for status in [400, 404, 409, 500, 502, 503] {
            let err = StorefrontError::from_status(status, Value::Null);
            assert!(!err.is_retryable(), "status {status} must not retry");
        }
    }

    #[test]
    fn from_status_classifies_auth_failures() {
        for status in [401, 403] {
            let err = StorefrontError::from_status(status, Value::Null);
            assert!(matches!(err, StorefrontError::Unauthorized { .. }));
            assert!(err.is_auth_failure());
            assert_eq!(err.category(), ErrorCategory::Authentication);
        }

        let not_found = StorefrontError::from_status(404, Value::Null);
        assert!(matches!(
            not_found,
            StorefrontError::Application { status: 404, .. }
        ));
        assert!(!not_found.is_auth_failure());
    }

    #[test]
    fn from_status_prefers_server_message() {
        let err = StorefrontError::from_status(422, json!({"code": 422, "message": "SKU taken"}));
        assert_eq!(err.user_message(), "SKU taken");
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn from_status_falls_back_to_status_table() {
        assert_eq!(
            StorefrontError::from_status(404, json!({})).user_message(),
            "Resource not found"
        );
        assert_eq!(
            StorefrontError::from_status(418, Value::Null).user_message(),
            "Request failed (418)"
        );
        assert_eq!(
            StorefrontError::from_status(401, json!({"message": ""})).user_message(),
            "Unauthorized, please sign in again"
        );
    }

    #[test]
    fn error_codes_follow_format() {
        let errors = vec![
            StorefrontError::from_status(500, Value::Null),
            StorefrontError::from_status(401, Value::Null),
            StorefrontError::RefreshFailed {
                reason: "expired".to_string(),
            },
            StorefrontError::NotAuthenticated,
            StorefrontError::Config("bad".to_string()),
            StorefrontError::Storage {
                key: "token".to_string(),
                message: "locked".to_string(),
            },
        ];

        for err in errors.iter().chain(network_errors().iter()) {
            let code = err.error_code();
            assert!(code.starts_with("SFC-"), "bad code {code}");
            assert_eq!(&code[4..5], err.category().code_prefix());
            assert_eq!(code.len(), 8);
        }
    }

    #[test]
    fn auth_errors_exit_with_auth_required() {
        assert_eq!(
            StorefrontError::NotAuthenticated.exit_code(),
            ExitCode::AuthRequired
        );
        assert_eq!(
            StorefrontError::from_status(403, Value::Null).exit_code(),
            ExitCode::AuthRequired
        );
    }

    #[test]
    fn every_auth_error_suggests_sign_in() {
        let errors = [
            StorefrontError::from_status(401, Value::Null),
            StorefrontError::NotAuthenticated,
            StorefrontError::RefreshFailed {
                reason: "revoked".to_string(),
            },
        ];
        for err in errors {
            let suggestions = err.fix_suggestions();
            assert!(
                suggestions
                    .iter()
                    .any(|s| s.commands.iter().any(|c| c.contains("sfc login"))),
                "{err:?} should suggest sfc login"
            );
        }
    }
}
