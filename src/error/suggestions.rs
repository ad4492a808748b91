//! Fix suggestions for storefront-client errors.
//!
//! Maps error variants to copy-paste ready `sfc` commands plus a short
//! explanation of the failure.

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Primary fix commands in order of preference.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }
}

// =============================================================================
// Network
// =============================================================================

pub fn timeout_suggestions(url: &str, timeout_ms: u64) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!("SFC_TIMEOUT_MS={} sfc get {url}", timeout_ms.saturating_mul(2))],
            format!("No response from {url} within {timeout_ms}ms, even after retries."),
        )
        .with_prevention("Raise api.timeout_ms in config.toml for slow endpoints."),
    ]
}

pub fn connection_suggestions(url: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["sfc config show".to_string()],
        format!("Could not connect while requesting {url}. Check the base URL and your network."),
    )]
}

// =============================================================================
// Application
// =============================================================================

pub fn application_suggestions(status: u16) -> Vec<FixSuggestion> {
    match status {
        404 => vec![FixSuggestion::new(
            Vec::new(),
            "The resource does not exist. Check the path and api.api_version.",
        )],
        500..=599 => vec![
            FixSuggestion::new(
                Vec::new(),
                format!("The server failed with status {status}."),
            )
            .with_prevention("Server errors are not retried automatically; try again later."),
        ],
        _ => Vec::new(),
    }
}

pub fn invalid_response_suggestions() -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["sfc get <PATH> --raw".to_string()],
        "The server answered with an unexpected body. Inspect the raw response.",
    )]
}

// =============================================================================
// Authentication
// =============================================================================

pub fn sign_in_suggestions() -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["sfc login --username <USER>".to_string()],
            "No usable session is stored. Sign in again to obtain a new token pair.",
        )
        .with_prevention("Sessions refresh automatically while the refresh token is valid."),
    ]
}

pub fn unauthorized_suggestions(status: u16) -> Vec<FixSuggestion> {
    let context = if status == 403 {
        "The server refused access for the current session. The session was cleared."
    } else {
        "The server rejected the access token. The session was cleared."
    };
    vec![FixSuggestion::new(
        vec!["sfc login --username <USER>".to_string(), "sfc token".to_string()],
        context,
    )]
}

// =============================================================================
// Configuration / storage
// =============================================================================

pub fn config_parse_suggestions(path: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["sfc config path".to_string()],
        format!("{path} is not valid TOML: {message}"),
    )]
}

pub fn config_invalid_suggestions(key: &str, value: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["sfc config show".to_string()],
        format!("'{value}' is not a valid value for {key}: {message}"),
    )]
}

pub fn storage_suggestions(key: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["sfc logout".to_string()],
            format!("The stored value for '{key}' could not be read or written."),
        )
        .with_prevention("Set auth.token_store = \"file\" if the OS keyring is unavailable."),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_suggestion_doubles_timeout() {
        let suggestions = timeout_suggestions("/orders", 5000);
        assert!(suggestions[0].commands[0].contains("SFC_TIMEOUT_MS=10000"));
        assert!(suggestions[0].prevention.is_some());
    }

    #[test]
    fn forbidden_context_differs_from_unauthorized() {
        let forbidden = unauthorized_suggestions(403);
        let unauthorized = unauthorized_suggestions(401);
        assert_ne!(forbidden[0].context, unauthorized[0].context);
    }

    #[test]
    fn client_errors_have_no_generic_suggestion() {
        assert!(application_suggestions(409).is_empty());
        assert_eq!(application_suggestions(503).len(), 1);
    }
}
