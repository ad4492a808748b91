//! `login`, `logout` and `token` commands.

use chrono::Utc;

use super::args::LoginArgs;
use super::{Context, OutputFormat};
use crate::core::models::{SessionPhase, SessionStatus};
use crate::error::Result;
use crate::util::time::format_countdown_from;

/// One-line summary of a session for human output.
#[must_use]
pub fn describe_session(status: &SessionStatus) -> String {
    let Some(expire_at) = status.expire_at else {
        return "Not signed in".to_string();
    };
    let countdown = format_countdown_from(expire_at, Utc::now());
    match status.phase {
        SessionPhase::Unauthenticated => "Not signed in".to_string(),
        SessionPhase::RefreshPending => format!("Signed in, refreshing (token expires {countdown})"),
        SessionPhase::Authenticated if status.needs_refresh => {
            format!("Signed in, token expires {countdown} (refresh due)")
        }
        SessionPhase::Authenticated => format!("Signed in, token expires {countdown}"),
    }
}

fn print_status(ctx: &Context, status: &SessionStatus) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => ctx.print_json(status),
        OutputFormat::Human => {
            println!("{}", ctx.headline(&describe_session(status)));
            Ok(())
        }
    }
}

/// # Errors
///
/// Returns the login request error or a storage error.
pub async fn execute_login(ctx: &Context, args: &LoginArgs) -> Result<()> {
    let client = ctx.client(false).await?;
    let status = client.login(&args.username, &args.password).await;
    client.shutdown();
    print_status(ctx, &status?)
}

/// # Errors
///
/// Returns error if the stored session cannot be removed.
pub async fn execute_logout(ctx: &Context) -> Result<()> {
    let client = ctx.client(false).await?;
    let result = client.logout().await;
    client.shutdown();
    result?;
    print_status(ctx, &client.status())
}

/// # Errors
///
/// Returns error if the token store cannot be opened.
pub async fn execute_token(ctx: &Context) -> Result<()> {
    let client = ctx.client(false).await?;
    let status = client.status();
    client.shutdown();
    print_status(ctx, &status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn describes_each_phase() {
        let signed_out = SessionStatus {
            phase: SessionPhase::Unauthenticated,
            expire_at: None,
            expires_in_secs: None,
            needs_refresh: false,
        };
        assert_eq!(describe_session(&signed_out), "Not signed in");

        let fresh = SessionStatus {
            phase: SessionPhase::Authenticated,
            expire_at: Some(Utc::now() + TimeDelta::hours(2) + TimeDelta::seconds(30)),
            expires_in_secs: Some(7230),
            needs_refresh: false,
        };
        assert_eq!(describe_session(&fresh), "Signed in, token expires in 2h 0m");

        let due = SessionStatus {
            needs_refresh: true,
            expire_at: Some(Utc::now() + TimeDelta::seconds(90)),
            ..fresh
        };
        assert!(describe_session(&due).ends_with("(refresh due)"));
    }
}
