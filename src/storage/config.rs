//! Configuration file loading and resolution.
//!
//! Loads configuration from:
//! - Linux: `~/.config/storefront-client/config.toml`
//! - macOS: `~/Library/Application Support/com.storefront.storefront-client/config.toml`
//! - Windows: `%APPDATA%/storefront/storefront-client/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults (some depend on `api.environment`)
//!
//! ## Environment Variables
//!
//! - `SFC_CONFIG`: Override config file path
//! - `SFC_ENV`: Deployment environment (development, testing, production)
//! - `SFC_BASE_URL`: Full API base URL, version included
//! - `SFC_TIMEOUT_MS`: Request timeout in milliseconds
//! - `SFC_RETRY_COUNT`: Retries for transient GET failures
//! - `SFC_CACHE_CAPACITY`: Response cache capacity
//! - `SFC_NO_LOADING`: Suppress loading hints (1, true, yes)

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use super::kv::StoreKind;
use crate::core::cache::CacheConfig;
use crate::core::pipeline::PipelineConfig;
use crate::core::token::TokenConfig;
use crate::error::{Result, StorefrontError};

// =============================================================================
// Environment Variable Names
// =============================================================================

pub const ENV_CONFIG: &str = "SFC_CONFIG";
pub const ENV_ENVIRONMENT: &str = "SFC_ENV";
pub const ENV_BASE_URL: &str = "SFC_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "SFC_TIMEOUT_MS";
pub const ENV_RETRY_COUNT: &str = "SFC_RETRY_COUNT";
pub const ENV_CACHE_CAPACITY: &str = "SFC_CACHE_CAPACITY";
pub const ENV_NO_LOADING: &str = "SFC_NO_LOADING";

/// Upper bound accepted for `api.timeout_ms`.
pub const MAX_TIMEOUT_MS: u64 = 300_000;

// =============================================================================
// Environment
// =============================================================================

/// Deployment environment. Selects the default host and timeout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    #[default]
    Production,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }

    /// Host used when no base URL is configured.
    #[must_use]
    pub const fn default_host(self) -> &'static str {
        match self {
            Self::Development => "https://dev-api.example.com",
            Self::Testing => "https://test-api.example.com",
            Self::Production => "https://api.example.com",
        }
    }

    #[must_use]
    pub const fn default_timeout_ms(self) -> u64 {
        match self {
            Self::Production => 10_000,
            Self::Development | Self::Testing => 15_000,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(StorefrontError::ConfigInvalid {
                key: "api.environment".to_string(),
                value: s.to_string(),
                message: "expected development, testing or production".to_string(),
            }),
        }
    }
}

// =============================================================================
// File Model
// =============================================================================

/// Contents of `config.toml`. Every section and field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSection,
    pub cache: CacheSection,
    pub auth: AuthSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub environment: Environment,
    /// Full base URL. When unset, the environment host plus `api_version`.
    pub base_url: Option<String>,
    pub api_version: String,
    /// Defaults to the environment timeout.
    pub timeout_ms: Option<u64>,
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub show_loading: bool,
    pub loading_text: String,
    pub show_error: bool,
    /// Defaults to on in development.
    pub log_requests: Option<bool>,
    pub slow_request_threshold_ms: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            base_url: None,
            api_version: "/v1".to_string(),
            timeout_ms: None,
            retry_count: 2,
            retry_delay_ms: 1000,
            show_loading: true,
            loading_text: "Loading...".to_string(),
            show_error: true,
            log_requests: None,
            slow_request_threshold_ms: 3000,
        }
    }
}

impl ApiSection {
    /// Base URL for `environment` when none is configured explicitly.
    #[must_use]
    pub fn default_base_url(&self, environment: Environment) -> String {
        format!(
            "{}/{}",
            environment.default_host(),
            self.api_version.trim_matches('/')
        )
        .trim_end_matches('/')
        .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub capacity: usize,
    pub default_ttl_ms: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
            default_ttl_ms: 30 * 60 * 1000,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub login_path: String,
    pub refresh_path: String,
    pub logout_path: String,
    pub refresh_threshold_secs: u64,
    /// Route handed to the navigation callback when the session is rejected.
    pub login_route: String,
    /// One of `file`, `keyring`, `memory`.
    pub token_store: String,
    pub token_key: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            login_path: "/api/auth/login".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            refresh_threshold_secs: 300,
            login_route: "/pages/user/login/index".to_string(),
            token_store: StoreKind::File.to_string(),
            token_key: "token".to_string(),
        }
    }
}

impl Config {
    /// Load from the default path, or `SFC_CONFIG` when set.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::ConfigParse`] for malformed TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| StorefrontError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| StorefrontError::Config(format!("Failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        tracing::debug!(?path, "Config file saved");
        Ok(())
    }

    /// Config file path, honoring `SFC_CONFIG`.
    #[must_use]
    pub fn config_path() -> PathBuf {
        std::env::var(ENV_CONFIG)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| AppPaths::new().config_file(), PathBuf::from)
    }

    /// Validate file values.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::ConfigInvalid`] naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.api.base_url {
            validate_base_url(url)?;
        }
        if let Some(timeout_ms) = self.api.timeout_ms {
            validate_timeout(timeout_ms)?;
        }
        validate_capacity(self.cache.capacity)?;
        self.auth.token_store.parse::<StoreKind>()?;
        if self.auth.token_key.trim().is_empty() {
            return Err(invalid("auth.token_key", "", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: impl fmt::Display, message: &str) -> StorefrontError {
    StorefrontError::ConfigInvalid {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

fn validate_base_url(url: &str) -> Result<()> {
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(invalid("api.base_url", url, "must be an http(s) URL")),
    }
}

fn validate_timeout(timeout_ms: u64) -> Result<()> {
    if (1..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
        Ok(())
    } else {
        Err(invalid(
            "api.timeout_ms",
            timeout_ms,
            "must be between 1 and 300000",
        ))
    }
}

fn validate_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        Err(invalid("cache.capacity", capacity, "must be at least 1"))
    } else {
        Ok(())
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Values given on the command line. `None` defers to lower layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub environment: Option<Environment>,
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry_count: Option<u32>,
    pub no_loading: bool,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    Env,
    ConfigFile,
    #[default]
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Tracks the source of each overridable value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub environment: ConfigSource,
    pub base_url: ConfigSource,
    pub timeout: ConfigSource,
    pub retry_count: ConfigSource,
    pub cache_capacity: ConfigSource,
    pub show_loading: ConfigSource,
}

/// Final configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub environment: Environment,
    pub base_url: String,
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub show_loading: bool,
    pub loading_text: String,
    pub show_error: bool,
    pub log_requests: bool,
    pub slow_request_threshold: Duration,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
    pub auth: AuthSection,
    pub token_store: StoreKind,
    pub sources: ConfigSources,
}

impl ResolvedConfig {
    /// Resolve against the process environment and the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is malformed or any resolved
    /// value is invalid.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let config = Config::load()?;
        Self::resolve(overrides, &config, |key| std::env::var(key).ok())
    }

    /// Merge `overrides`, variables visible through `env`, and `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StorefrontError::ConfigInvalid`] for unparsable environment
    /// values or values that fail validation.
    pub fn resolve(
        overrides: &ConfigOverrides,
        config: &Config,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        config.validate()?;
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let mut sources = ConfigSources::default();

        let environment = if let Some(environment) = overrides.environment {
            sources.environment = ConfigSource::Cli;
            environment
        } else if let Some(value) = env(ENV_ENVIRONMENT) {
            sources.environment = ConfigSource::Env;
            value.parse()?
        } else {
            sources.environment = ConfigSource::ConfigFile;
            config.api.environment
        };

        let base_url = Self::resolve_base_url(overrides, config, environment, &env, &mut sources.base_url)?;
        let timeout = Self::resolve_timeout(overrides, config, environment, &env, &mut sources.timeout)?;

        let retry_count = if let Some(count) = overrides.retry_count {
            sources.retry_count = ConfigSource::Cli;
            count
        } else if let Some(value) = env(ENV_RETRY_COUNT) {
            sources.retry_count = ConfigSource::Env;
            parse_env(ENV_RETRY_COUNT, &value)?
        } else {
            sources.retry_count = ConfigSource::ConfigFile;
            config.api.retry_count
        };

        let cache_capacity = if let Some(value) = env(ENV_CACHE_CAPACITY) {
            sources.cache_capacity = ConfigSource::Env;
            let capacity = parse_env(ENV_CACHE_CAPACITY, &value)?;
            validate_capacity(capacity)?;
            capacity
        } else {
            sources.cache_capacity = ConfigSource::ConfigFile;
            config.cache.capacity
        };

        let show_loading = if overrides.no_loading {
            sources.show_loading = ConfigSource::Cli;
            false
        } else if env(ENV_NO_LOADING).is_some_and(|v| is_truthy(&v)) {
            sources.show_loading = ConfigSource::Env;
            false
        } else {
            sources.show_loading = ConfigSource::ConfigFile;
            config.api.show_loading
        };

        Ok(Self {
            environment,
            base_url,
            timeout,
            retry_count,
            retry_delay: Duration::from_millis(config.api.retry_delay_ms),
            show_loading,
            loading_text: config.api.loading_text.clone(),
            show_error: config.api.show_error,
            log_requests: config
                .api
                .log_requests
                .unwrap_or(environment == Environment::Development),
            slow_request_threshold: Duration::from_millis(config.api.slow_request_threshold_ms),
            cache_enabled: config.cache.enabled,
            cache_capacity,
            cache_ttl: Duration::from_millis(config.cache.default_ttl_ms),
            sweep_interval: Duration::from_secs(config.cache.sweep_interval_secs.max(1)),
            auth: config.auth.clone(),
            token_store: config.auth.token_store.parse()?,
            sources,
        })
    }

    fn resolve_base_url(
        overrides: &ConfigOverrides,
        config: &Config,
        environment: Environment,
        env: &impl Fn(&str) -> Option<String>,
        source: &mut ConfigSource,
    ) -> Result<String> {
        let url = if let Some(url) = &overrides.base_url {
            *source = ConfigSource::Cli;
            url.clone()
        } else if let Some(url) = env(ENV_BASE_URL) {
            *source = ConfigSource::Env;
            url
        } else if let Some(url) = &config.api.base_url {
            *source = ConfigSource::ConfigFile;
            url.clone()
        } else {
            *source = ConfigSource::Default;
            config.api.default_base_url(environment)
        };
        validate_base_url(&url)?;
        Ok(url.trim_end_matches('/').to_string())
    }

    fn resolve_timeout(
        overrides: &ConfigOverrides,
        config: &Config,
        environment: Environment,
        env: &impl Fn(&str) -> Option<String>,
        source: &mut ConfigSource,
    ) -> Result<Duration> {
        let timeout_ms = if let Some(ms) = overrides.timeout_ms {
            *source = ConfigSource::Cli;
            ms
        } else if let Some(value) = env(ENV_TIMEOUT_MS) {
            *source = ConfigSource::Env;
            parse_env(ENV_TIMEOUT_MS, &value)?
        } else if let Some(ms) = config.api.timeout_ms {
            *source = ConfigSource::ConfigFile;
            ms
        } else {
            *source = ConfigSource::Default;
            environment.default_timeout_ms()
        };
        validate_timeout(timeout_ms)?;
        Ok(Duration::from_millis(timeout_ms))
    }

    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            base_url: self.base_url.clone(),
            timeout: self.timeout,
            retry_count: self.retry_count,
            retry_delay: self.retry_delay,
            show_loading: self.show_loading,
            loading_text: self.loading_text.clone(),
            show_error: self.show_error,
            cache_enabled: self.cache_enabled,
            log_requests: self.log_requests,
            slow_request_threshold: self.slow_request_threshold,
        }
    }

    #[must_use]
    pub const fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            capacity: self.cache_capacity,
            default_ttl: self.cache_ttl,
            sweep_interval: self.sweep_interval,
        }
    }

    #[must_use]
    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            refresh_threshold: Duration::from_secs(self.auth.refresh_threshold_secs),
            storage_key: self.auth.token_key.clone(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(key, value, "not a valid number"))
}

/// `1`, `true`, `yes` and `on` (any case) are truthy.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
