//! Loading and error hints surfaced by the pipeline.

use std::sync::Arc;

/// Receives loading and error hints.
///
/// The pipeline calls `show_loading` before the first transport attempt and
/// pairs it with one `hide_loading` once the request settles. `show_error`
/// fires for failures the caller did not suppress.
pub trait Notifier: Send + Sync {
    fn show_loading(&self, text: &str);
    fn hide_loading(&self);
    fn show_error(&self, message: &str);
}

/// Callback invoked with the login route when the session is rejected.
pub type AuthRedirect = Arc<dyn Fn(&str) + Send + Sync>;

/// Emits hints as tracing events. Used by the `sfc` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show_loading(&self, text: &str) {
        tracing::info!(text, "Loading");
    }

    fn hide_loading(&self) {
        tracing::trace!("Loading finished");
    }

    fn show_error(&self, message: &str) {
        tracing::warn!(message, "Request failed");
    }
}

/// Discards every hint.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn show_loading(&self, _text: &str) {}
    fn hide_loading(&self) {}
    fn show_error(&self, _message: &str) {}
}

/// Redirect that only logs the target route.
#[must_use]
pub fn log_redirect() -> AuthRedirect {
    Arc::new(|route: &str| {
        tracing::info!(route, "Session rejected; sign in again");
    })
}
