//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};

use crate::core::request::Method;
use crate::error::{Result, StorefrontError};
use crate::storage::config::ConfigOverrides;

/// Storefront API client - cached, token-aware requests from the terminal.
#[derive(Parser, Debug)]
#[command(name = "sfc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    // === Global flags ===
    /// Output format
    #[arg(long, value_enum, default_value = "human", global = true)]
    pub format: OutputFormat,

    /// Shorthand for --format json
    #[arg(long, global = true)]
    pub json: bool,

    /// API base URL, version included (overrides config and SFC_BASE_URL)
    #[arg(long, value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, value_name = "MS", global = true)]
    pub timeout_ms: Option<u64>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress loading hints
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    #[must_use]
    pub const fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }

    /// Configuration layer contributed by the command line.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        let retry_count = match &self.command {
            Commands::Get(args) => args.retry,
            _ => None,
        };
        ConfigOverrides {
            environment: None,
            base_url: self.base_url.clone(),
            timeout_ms: self.timeout_ms,
            retry_count,
            no_loading: self.quiet,
        }
    }
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON and readable status lines
    #[default]
    Human,
    /// Single-line JSON
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a GET request (cacheable)
    Get(GetArgs),

    /// Send a POST request
    Post(BodyArgs),

    /// Send a PUT request
    Put(BodyArgs),

    /// Send a DELETE request
    Delete(BodyArgs),

    /// Sign in and store the session
    Login(LoginArgs),

    /// Sign out and clear the stored session
    Logout,

    /// Show the stored session
    Token,

    /// Print the response-cache key for a request (no network)
    CacheKey(CacheKeyArgs),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Arguments for `get`.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Path relative to the base URL, or an absolute URL
    pub path: String,

    /// Query parameter (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Cache the response for this many milliseconds
    #[arg(long, value_name = "MS")]
    pub cache_ttl: Option<u64>,

    /// Retry budget for transient failures
    #[arg(long, value_name = "N")]
    pub retry: Option<u32>,

    /// Print the response envelope as received
    #[arg(long)]
    pub raw: bool,
}

/// Arguments for `post`, `put` and `delete`.
#[derive(Args, Debug)]
pub struct BodyArgs {
    pub path: String,

    /// JSON request body
    #[arg(short, long, value_name = "JSON")]
    pub data: Option<String>,

    /// Query parameter (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Print the response envelope as received
    #[arg(long)]
    pub raw: bool,
}

impl BodyArgs {
    /// Parse `--data`.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::Json`] if the body is not valid JSON.
    pub fn body(&self) -> Result<Option<Value>> {
        self.data
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(StorefrontError::from)
    }
}

/// Arguments for `login`.
#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(short, long)]
    pub username: String,

    #[arg(long, env = "SFC_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Arguments for `cache-key`.
#[derive(Args, Debug)]
pub struct CacheKeyArgs {
    /// HTTP method (GET, POST, PUT, DELETE)
    pub method: String,

    pub path: String,

    /// Query parameter (repeatable)
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,
}

impl CacheKeyArgs {
    /// # Errors
    ///
    /// Returns [`StorefrontError::Config`] for an unknown method.
    pub fn method(&self) -> Result<Method> {
        Method::from_name(&self.method).ok_or_else(|| {
            StorefrontError::Config(format!(
                "Unknown method '{}'. Valid methods: GET, POST, PUT, DELETE",
                self.method
            ))
        })
    }
}

/// `config` subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the resolved configuration and where each value came from
    Show,
    /// Print the config file path
    Path,
}

/// Parse repeated `KEY=VALUE` arguments into a params object.
///
/// Values that read as JSON scalars (`1`, `true`, `null`) keep that type;
/// everything else is a string.
///
/// # Errors
///
/// Returns [`StorefrontError::Config`] for an argument without `=`.
pub fn parse_params(pairs: &[String]) -> Result<Option<Value>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut map = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(StorefrontError::Config(format!(
                "Invalid parameter '{pair}'. Expected KEY=VALUE"
            )));
        };
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(scalar @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => scalar,
            _ => Value::String(raw.to_string()),
        };
        map.insert(key.trim().to_string(), value);
    }
    Ok(Some(Value::Object(map)))
}
