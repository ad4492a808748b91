//! Token refresh coordination seen from the request path.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use storefront_client::StorefrontError;
use storefront_client::core::models::{SessionPhase, TokenState};
use storefront_client::core::token::{TokenManager, TokenRefresher};
use storefront_client::storage::kv::KeyValueStore;
use storefront_client::test_utils::{CountingRefresher, make_test_envelope, make_test_token_info};

use common::fixtures::{Harness, scripted_client_with};
use common::logger::TestLogger;

fn with_refresher(refresher: &Arc<CountingRefresher>) -> Harness {
    let refresher: Arc<dyn TokenRefresher> = refresher.clone();
    scripted_client_with(Some(refresher))
}

/// Wait for the background refresh, if any, to finish.
async fn settle(tokens: &TokenManager) {
    while tokens.is_refresh_pending() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn bearer_of(h: &Harness, call: usize) -> Option<String> {
    h.transport.calls()[call].headers.get("Authorization").cloned()
}

#[tokio::test]
async fn concurrent_reads_near_expiry_trigger_one_refresh() {
    let log = TestLogger::new("concurrent_reads_near_expiry_trigger_one_refresh");
    let refresher = Arc::new(CountingRefresher::succeeding(
        make_test_token_info("renewed", 7200),
        Duration::from_millis(50),
    ));
    let h = with_refresher(&refresher);
    let tokens = h.client.tokens().clone();
    tokens
        .set_token(&make_test_token_info("near", 120))
        .await
        .unwrap();

    log.phase("read");
    let (a, b) = tokio::join!(async { tokens.get_token() }, async { tokens.get_token() });
    assert_eq!(a.as_deref(), Some("near"));
    assert_eq!(b.as_deref(), Some("near"));
    assert_eq!(tokens.phase(), SessionPhase::RefreshPending);

    settle(&tokens).await;
    assert_eq!(refresher.calls(), 1);
    assert_eq!(tokens.get_token().as_deref(), Some("renewed"));
    log.finish_ok();
}

#[tokio::test]
async fn expired_token_blocks_requests_on_a_single_refresh() {
    let refresher = Arc::new(CountingRefresher::succeeding(
        make_test_token_info("renewed", 7200),
        Duration::from_millis(50),
    ));
    let h = with_refresher(&refresher);
    h.transport.always_ok(make_test_envelope(json!("ok")));
    h.client
        .tokens()
        .set_token(&make_test_token_info("stale", 0))
        .await
        .unwrap();

    let (a, b, c, d) = tokio::join!(
        h.client.get("/orders", None),
        h.client.get("/cart", None),
        h.client.get("/user/profile", None),
        h.client.get("/coupons", None),
    );
    for result in [a, b, c, d] {
        assert_eq!(result.unwrap(), json!("ok"));
    }

    assert_eq!(refresher.calls(), 1);
    assert_eq!(h.transport.call_count(), 4);
    for call in 0..4 {
        assert_eq!(bearer_of(&h, call).as_deref(), Some("Bearer renewed"));
    }
}

#[tokio::test]
async fn near_expiry_request_is_sent_with_current_token() {
    let refresher = Arc::new(CountingRefresher::succeeding(
        make_test_token_info("renewed", 7200),
        Duration::from_millis(50),
    ));
    let h = with_refresher(&refresher);
    h.transport.always_ok(make_test_envelope(json!([])));
    h.client
        .tokens()
        .set_token(&make_test_token_info("near", 60))
        .await
        .unwrap();

    h.client.get("/items", None).await.unwrap();
    assert_eq!(bearer_of(&h, 0).as_deref(), Some("Bearer near"));

    settle(h.client.tokens()).await;
    h.client.get("/items", None).await.unwrap();
    assert_eq!(bearer_of(&h, 1).as_deref(), Some("Bearer renewed"));
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn refreshed_session_is_persisted() {
    let refresher = Arc::new(CountingRefresher::succeeding(
        make_test_token_info("renewed", 7200),
        Duration::ZERO,
    ));
    let h = with_refresher(&refresher);
    h.client
        .tokens()
        .set_token(&make_test_token_info("stale", 0))
        .await
        .unwrap();

    h.client.tokens().refresh().await.unwrap();

    let stored: TokenState =
        serde_json::from_value(h.store.get("token").await.unwrap().unwrap()).unwrap();
    assert_eq!(stored.access_token, "renewed");
    assert_eq!(stored.refresh_token, "refresh-renewed");
}

#[tokio::test]
async fn failed_refresh_for_expired_token_signs_out() {
    let refresher = Arc::new(CountingRefresher::failing(Duration::from_millis(20)));
    let h = with_refresher(&refresher);
    h.client
        .tokens()
        .set_token(&make_test_token_info("stale", 0))
        .await
        .unwrap();

    let (a, b) = tokio::join!(h.client.get("/orders", None), h.client.get("/cart", None));
    for result in [a, b] {
        assert!(matches!(result, Err(StorefrontError::RefreshFailed { .. })));
    }

    assert_eq!(refresher.calls(), 1);
    assert_eq!(h.transport.call_count(), 0);
    assert_eq!(h.client.tokens().phase(), SessionPhase::Unauthenticated);
    assert_eq!(h.store.get("token").await.unwrap(), None);
    assert!(
        h.redirects
            .lock()
            .unwrap()
            .iter()
            .all(|route| route == "/pages/user/login/index")
    );
    assert!(!h.redirects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn background_refresh_failure_does_not_fail_the_request() {
    let refresher = Arc::new(CountingRefresher::failing(Duration::from_millis(20)));
    let h = with_refresher(&refresher);
    h.transport.always_ok(make_test_envelope(json!({"id": 3})));
    h.client
        .tokens()
        .set_token(&make_test_token_info("near", 60))
        .await
        .unwrap();

    let order = h.client.get("/orders/3", None).await.unwrap();
    assert_eq!(order, json!({"id": 3}));

    settle(h.client.tokens()).await;
    assert_eq!(refresher.calls(), 1);
    assert!(!h.client.tokens().is_logged_in());
    assert!(h.redirects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn sign_out_during_refresh_stays_signed_out() {
    let refresher = Arc::new(CountingRefresher::succeeding(
        make_test_token_info("renewed", 7200),
        Duration::from_millis(50),
    ));
    let h = with_refresher(&refresher);
    h.client
        .tokens()
        .set_token(&make_test_token_info("near", 60))
        .await
        .unwrap();

    assert_eq!(h.client.tokens().get_token().as_deref(), Some("near"));
    h.client.logout().await.unwrap();
    settle(h.client.tokens()).await;

    assert_eq!(h.client.tokens().state(), None);
    assert_eq!(h.store.get("token").await.unwrap(), None);
}
