//! Integration tests for logging initialization.
//!
//! The global subscriber can be installed once per process, so the JSON file
//! test is the only one that installs it.

use storefront_client::core::logging::{self, LogFormat, LogLevel};
use storefront_client::test_utils::TestDir;

#[test]
fn json_logs_are_written_to_the_log_file() {
    let dir = TestDir::new();
    let path = dir.file_path("sfc.log");

    logging::init(LogLevel::Info, LogFormat::Json, Some(path.clone()), false);
    tracing::info!(target: "storefront_client::cache", key = "GET:/items:{}", "Cache set");
    tracing::debug!(target: "storefront_client::cache", "below the configured level");

    // An explicit RUST_LOG replaces the default directive.
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }

    let content = dir.read_file("sfc.log").unwrap();
    let line = content.lines().next().expect("one log line");
    let event: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(event["level"], "INFO");
    assert_eq!(event["fields"]["message"], "Cache set");
    assert_eq!(event["fields"]["key"], "GET:/items:{}");
    assert!(!content.contains("below the configured level"));

    // Later calls keep the first subscriber.
    logging::init(LogLevel::Trace, LogFormat::Human, None, true);
}

#[test]
fn default_directive_covers_library_and_binary() {
    assert_eq!(
        logging::default_directive(LogLevel::Debug),
        "storefront_client=debug,sfc=debug"
    );
}
