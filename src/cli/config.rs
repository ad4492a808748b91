//! `config show` and `config path` commands.

use serde::Serialize;

use super::args::ConfigCommand;
use super::{Context, OutputFormat};
use crate::error::Result;
use crate::storage::config::{Config, ResolvedConfig};
use crate::util::time::format_duration;

/// Flattened view of the resolved configuration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReport {
    pub config_path: String,
    pub environment: String,
    pub base_url: String,
    pub base_url_source: String,
    pub timeout_ms: u128,
    pub timeout_source: String,
    pub retry_count: u32,
    pub retry_delay_ms: u128,
    pub show_loading: bool,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    pub cache_ttl_ms: u128,
    pub token_store: String,
    pub token_store_dir: String,
    pub login_route: String,
}

impl ConfigReport {
    #[must_use]
    pub fn new(config: &ResolvedConfig, config_path: String, token_store_dir: String) -> Self {
        Self {
            config_path,
            environment: config.environment.to_string(),
            base_url: config.base_url.clone(),
            base_url_source: config.sources.base_url.to_string(),
            timeout_ms: config.timeout.as_millis(),
            timeout_source: config.sources.timeout.to_string(),
            retry_count: config.retry_count,
            retry_delay_ms: config.retry_delay.as_millis(),
            show_loading: config.show_loading,
            cache_enabled: config.cache_enabled,
            cache_capacity: config.cache_capacity,
            cache_ttl_ms: config.cache_ttl.as_millis(),
            token_store: config.token_store.to_string(),
            token_store_dir,
            login_route: config.auth.login_route.clone(),
        }
    }
}

/// # Errors
///
/// Returns error if the report cannot be serialized.
pub fn execute(ctx: &Context, command: &ConfigCommand) -> Result<()> {
    let config_path = Config::config_path();
    match command {
        ConfigCommand::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
        ConfigCommand::Show => {
            let report = ConfigReport::new(
                &ctx.config,
                config_path.display().to_string(),
                ctx.paths.token_store_dir().display().to_string(),
            );
            match ctx.format {
                OutputFormat::Json => ctx.print_json(&report),
                OutputFormat::Human => {
                    print_human(ctx, &report);
                    Ok(())
                }
            }
        }
    }
}

fn print_human(ctx: &Context, report: &ConfigReport) {
    let sources = &ctx.config.sources;
    println!("{}", ctx.headline("Storefront client configuration"));
    println!("  config file      {}", report.config_path);
    println!(
        "  environment      {} ({})",
        report.environment, sources.environment
    );
    println!(
        "  base url         {} ({})",
        report.base_url, report.base_url_source
    );
    println!(
        "  timeout          {} ({})",
        format_duration(ctx.config.timeout),
        report.timeout_source
    );
    println!(
        "  retries          {} x {} backoff ({})",
        report.retry_count,
        format_duration(ctx.config.retry_delay),
        sources.retry_count
    );
    println!(
        "  cache            {} entries, ttl {}{} ({})",
        report.cache_capacity,
        format_duration(ctx.config.cache_ttl),
        if report.cache_enabled { "" } else { ", disabled" },
        sources.cache_capacity
    );
    println!(
        "  token store      {} at {}",
        report.token_store, report.token_store_dir
    );
}
