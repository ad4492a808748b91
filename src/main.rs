//! sfc - Storefront API client
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;

use storefront_client::cli::{self, Cli, Commands, Context, OutputFormat};
use storefront_client::core::logging;
use storefront_client::core::request::Method;
use storefront_client::error::StorefrontError;
use storefront_client::storage::{AppPaths, ResolvedConfig};
use storefront_client::util::env::should_use_color;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = cli
        .log_level
        .as_deref()
        .and_then(logging::LogLevel::from_arg)
        .or_else(logging::parse_log_level_from_env)
        .unwrap_or_default();
    let log_format = if cli.json_output {
        logging::LogFormat::Json
    } else {
        logging::parse_log_format_from_env().unwrap_or_default()
    };
    logging::init(
        log_level,
        log_format,
        logging::parse_log_file_from_env(),
        cli.verbose,
    );

    let format = cli.effective_format();
    let no_color = !should_use_color(cli.no_color);

    match run(cli, format, no_color).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = %e, code = e.error_code(), "Command failed");
            eprintln!("{}", render_error(&e, format, no_color));
            ExitCode::from(u8::try_from(i32::from(e.exit_code())).unwrap_or(1))
        }
    }
}

async fn run(cli: Cli, format: OutputFormat, no_color: bool) -> storefront_client::Result<()> {
    // No config or network needed.
    if let Commands::CacheKey(args) = &cli.command {
        return cli::request::execute_cache_key(args);
    }

    let ctx = Context {
        config: ResolvedConfig::load(&cli.overrides())?,
        paths: AppPaths::new(),
        format,
        no_color,
    };

    match &cli.command {
        Commands::Get(args) => cli::request::execute_get(&ctx, args).await,
        Commands::Post(args) => cli::request::execute_with_body(&ctx, Method::Post, args).await,
        Commands::Put(args) => cli::request::execute_with_body(&ctx, Method::Put, args).await,
        Commands::Delete(args) => cli::request::execute_with_body(&ctx, Method::Delete, args).await,
        Commands::Login(args) => cli::auth::execute_login(&ctx, args).await,
        Commands::Logout => cli::auth::execute_logout(&ctx).await,
        Commands::Token => cli::auth::execute_token(&ctx).await,
        Commands::Config(command) => cli::config::execute(&ctx, command),
        Commands::CacheKey(args) => cli::request::execute_cache_key(args),
    }
}

fn render_error(err: &StorefrontError, format: OutputFormat, no_color: bool) -> String {
    let suggestions = err.fix_suggestions();

    if format == OutputFormat::Json {
        let payload = serde_json::json!({
            "error": {
                "code": err.error_code(),
                "category": err.category().to_string(),
                "message": err.user_message(),
                "detail": err.to_string(),
                "status": err.status(),
                "retryable": err.is_retryable(),
                "suggestions": suggestions
                    .iter()
                    .flat_map(|s| s.commands.iter().cloned())
                    .collect::<Vec<_>>(),
            }
        });
        return payload.to_string();
    }

    let mut out = if no_color {
        format!("error[{}]: {}", err.error_code(), err.user_message())
    } else {
        format!(
            "{}{}{} {}",
            "error[".red().bold(),
            err.error_code().red().bold(),
            "]:".red().bold(),
            err.user_message()
        )
    };
    if err.user_message() != err.to_string() {
        out.push_str(&format!("\n  {}", err));
    }
    for suggestion in &suggestions {
        out.push_str(&format!("\n\n  {}", suggestion.context));
        for command in &suggestion.commands {
            let command = if no_color {
                command.clone()
            } else {
                command.cyan().to_string()
            };
            out.push_str(&format!("\n    $ {command}"));
        }
        if let Some(prevention) = &suggestion.prevention {
            out.push_str(&format!("\n  tip: {prevention}"));
        }
    }
    out
}
