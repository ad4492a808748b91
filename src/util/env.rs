//! Terminal detection for the `sfc` binary.

use std::io::IsTerminal;

#[must_use]
pub fn stdout_is_tty() -> bool {
    std::io::stdout().is_terminal()
}

#[must_use]
pub fn stderr_is_tty() -> bool {
    std::io::stderr().is_terminal()
}

/// Whether colored output is allowed, given the `--no-color` flag, an
/// environment lookup and whether the target stream is a terminal.
#[must_use]
pub fn color_allowed(
    no_color_flag: bool,
    env: impl Fn(&str) -> Option<String>,
    is_tty: bool,
) -> bool {
    if no_color_flag || env("NO_COLOR").is_some() {
        return false;
    }
    if env("TERM").is_some_and(|term| term == "dumb") {
        return false;
    }
    is_tty
}

/// Whether stderr diagnostics should be colored.
#[must_use]
pub fn should_use_color(no_color_flag: bool) -> bool {
    color_allowed(no_color_flag, |key| std::env::var(key).ok(), stderr_is_tty())
}
