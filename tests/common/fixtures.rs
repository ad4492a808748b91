//! Fixture loading and client factories for integration tests.
//!
//! ```rust,ignore
//! use common::fixtures::*;
//!
//! let page: serde_json::Value = load_fixture("catalog/items_page1.json");
//! let h = scripted_client();
//! h.transport.push_ok(page);
//! ```
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use storefront_client::core::pipeline::PipelineConfig;
use storefront_client::core::token::TokenRefresher;
use storefront_client::storage::kv::{KeyValueStore, MemoryStore};
use storefront_client::test_utils::{
    RecordingNotifier, ScriptedTransport, make_test_pipeline_config, recording_redirect,
};
use storefront_client::{ClientBuilder, StorefrontClient};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

/// Load and deserialize `tests/fixtures/<path>`.
///
/// # Panics
///
/// Panics if the file cannot be read or parsed.
pub fn load_fixture<T: DeserializeOwned>(path: &str) -> T {
    let full_path = fixtures_dir().join(path);
    let content = fs::read_to_string(&full_path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {e}", full_path.display()));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {e}", full_path.display()))
}

pub fn fixture_value(path: &str) -> Value {
    load_fixture(path)
}

/// Pipeline config with short, deterministic retry timing.
pub fn fast_retry_config(base_url: &str) -> PipelineConfig {
    PipelineConfig {
        base_url: base_url.to_string(),
        retry_delay: Duration::from_millis(20),
        timeout: Duration::from_secs(2),
        ..make_test_pipeline_config()
    }
}

/// Everything a client test might want to inspect.
pub struct Harness {
    pub client: StorefrontClient,
    pub transport: Arc<ScriptedTransport>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemoryStore>,
    pub redirects: Arc<Mutex<Vec<String>>>,
}

/// Client over a [`ScriptedTransport`] with default interceptors.
pub fn scripted_client() -> Harness {
    scripted_client_with(None)
}

/// Like [`scripted_client`] with an explicit token refresher.
pub fn scripted_client_with(refresher: Option<Arc<dyn TokenRefresher>>) -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let store = Arc::new(MemoryStore::new());
    let (redirect, redirects) = recording_redirect();

    let store_handle: Arc<dyn KeyValueStore> = store.clone();
    let mut builder = ClientBuilder::new()
        .pipeline_config(make_test_pipeline_config())
        .transport(transport.clone())
        .notifier(notifier.clone())
        .store(store_handle)
        .on_auth_failure(redirect);
    if let Some(refresher) = refresher {
        builder = builder.refresher(refresher);
    }

    Harness {
        client: builder.build().expect("client builds"),
        transport,
        notifier,
        store,
        redirects,
    }
}
