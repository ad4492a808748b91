//! CLI argument parsing and command dispatch.

pub mod args;
pub mod auth;
pub mod config;
pub mod request;

use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

pub use args::{Cli, Commands, OutputFormat};

use crate::core::client::{ClientBuilder, StorefrontClient};
use crate::core::notify::{Notifier, SilentNotifier};
use crate::error::Result;
use crate::storage::config::ResolvedConfig;
use crate::storage::paths::AppPaths;
use crate::util::env::stderr_is_tty;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: ResolvedConfig,
    pub paths: AppPaths,
    pub format: OutputFormat,
    pub no_color: bool,
}

impl Context {
    /// Build a client for this invocation and restore the saved session.
    ///
    /// # Errors
    ///
    /// Returns error if the session directory or HTTP client cannot be set up.
    pub async fn client(&self, keep_envelopes: bool) -> Result<StorefrontClient> {
        self.paths.ensure_dirs()?;
        let notifier: Arc<dyn Notifier> = if self.config.show_loading && stderr_is_tty() {
            Arc::new(TerminalNotifier {
                no_color: self.no_color,
            })
        } else {
            Arc::new(SilentNotifier)
        };

        let mut builder = ClientBuilder::from_config(&self.config, self.paths.token_store_dir())
            .notifier(notifier)
            .on_auth_failure(Arc::new(|route: &str| {
                tracing::info!(route, "Session rejected");
                eprintln!("Session expired. Run `sfc login` to sign in again.");
            }));
        if keep_envelopes {
            builder = builder.keep_envelopes();
        }
        let client = builder.build()?;
        if let Err(err) = client.restore_session().await {
            tracing::warn!(error = %err, "Could not restore saved session");
        }
        Ok(client)
    }

    /// Print `value` as pretty (human) or single-line (json) JSON.
    ///
    /// # Errors
    ///
    /// Returns error if `value` cannot be serialized.
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = match self.format {
            OutputFormat::Human => serde_json::to_string_pretty(value)?,
            OutputFormat::Json => serde_json::to_string(value)?,
        };
        println!("{text}");
        Ok(())
    }

    /// Style a status line for human output.
    #[must_use]
    pub fn headline(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.bold().green().to_string()
        }
    }
}

/// Writes loading hints to stderr. Errors are rendered by the binary.
#[derive(Debug, Clone, Copy)]
struct TerminalNotifier {
    no_color: bool,
}

impl Notifier for TerminalNotifier {
    fn show_loading(&self, text: &str) {
        if self.no_color {
            eprintln!("{text}");
        } else {
            eprintln!("{}", text.dimmed());
        }
    }

    fn hide_loading(&self) {}

    fn show_error(&self, message: &str) {
        tracing::debug!(message, "Request failed");
    }
}
