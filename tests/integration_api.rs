mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chain_tx_tracker::api::{create_router, AppState};
use chain_tx_tracker::blockchain::ChainAdapter;
use chain_tx_tracker::config::TrackerConfig;
use chain_tx_tracker::database::Database;
use chain_tx_tracker::models::NormalizedTransaction;
use chain_tx_tracker::tracking::Tracker;
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;

use common::*;

/// Helper function to create a test state with one tracked chain and sample events
fn setup_state() -> AppState {
    let database = Arc::new(Database::new_in_memory().expect("Failed to create test database"));

    for (i, hash) in ["0xaaa", "0xbbb", "0xccc"].iter().enumerate() {
        database
            .record_event(&NormalizedTransaction {
                chain: "ethereum".to_string(),
                hash: hash.to_string(),
                from: "0x1111111111111111111111111111111111111111".to_string(),
                to: "0x2222222222222222222222222222222222222222".to_string(),
                value: 1_500_000_000_000_000_000,
                currency: "ETH".to_string(),
                block: 100 + i as u64,
                timestamp: 1640995200,
            })
            .expect("Failed to store test event");
    }
    database.set_watermark("ethereum", 102).expect("Failed to set watermark");

    let settings = TrackerConfig {
        start_from_latest: false,
        shutdown_grace_ms: 100,
        ..TrackerConfig::default()
    };
    let tracker = Tracker::with_adapters(
        settings,
        vec![Arc::new(MockAdapter::new("ethereum", 0, 102)) as Arc<dyn ChainAdapter>],
        database.clone(),
        Arc::new(RecordingSink::default()),
    );

    AppState {
        tracker: Arc::new(tracker),
        database,
    }
}

async fn send(state: &AppState, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = create_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = setup_state();

    let (status, json) = send(&state, "GET", "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["chains"], 1);
    assert!(json["retrying"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_status_endpoints() {
    let state = setup_state();

    let (status, json) = send(&state, "GET", "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_events"], 3);
    assert_eq!(json["chains"][0]["chain"], "ethereum");
    assert_eq!(json["chains"][0]["watermark"], 102);

    let (status, json) = send(&state, "GET", "/chains/ethereum/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["chain"], "ethereum");
    assert!(json.get("state").is_some());
    assert!(json.get("health").is_some());

    let (status, json) = send(&state, "GET", "/chains/solana/status").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "unknown_chain");
}

#[tokio::test]
async fn test_chain_control_endpoints() {
    let state = setup_state();

    let (status, json) = send(&state, "POST", "/chains/ethereum/pause").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["chain"], "ethereum");
    assert_eq!(json["action"], "pause");

    // Pausing again is not an error
    let (status, _) = send(&state, "POST", "/chains/ethereum/pause").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&state, "POST", "/chains/solana/pause").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&state, "POST", "/chains/ethereum/stop").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&state, "POST", "/chains/ethereum/resume").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "invalid_transition");

    state.tracker.shutdown().await;
}

#[tokio::test]
async fn test_global_control_endpoints() {
    let state = setup_state();

    let (status, json) = send(&state, "POST", "/pause").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["chain"].is_null());
    assert_eq!(json["statuses"].as_array().unwrap().len(), 1);

    let (status, _) = send(&state, "POST", "/resume").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(&state, "POST", "/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"], "stop");

    state.tracker.join().await;
}

#[tokio::test]
async fn test_events_endpoint_with_pagination() {
    let state = setup_state();

    let (status, json) = send(&state, "GET", "/events?limit=2&offset=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events"].as_array().unwrap().len(), 2);
    assert_eq!(json["events"][0]["hash"], "0xccc");
    assert_eq!(json["total_count"], 3);
    assert_eq!(json["has_more"], true);
    // Values are decimal strings of the smallest unit
    assert_eq!(json["events"][0]["value"], "1500000000000000000");

    let (status, json) = send(&state, "GET", "/events?limit=2&offset=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events"].as_array().unwrap().len(), 1);
    assert_eq!(json["has_more"], false);

    let (status, json) = send(&state, "GET", "/events?chain=bsc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_count"], 0);
}

#[tokio::test]
async fn test_events_endpoint_rejects_bad_limits() {
    let state = setup_state();

    let (status, json) = send(&state, "GET", "/events?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_parameter");

    let (status, _) = send(&state, "GET", "/events?limit=5000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_watermarks_endpoint() {
    let state = setup_state();

    let (status, json) = send(&state, "GET", "/watermarks").await;

    assert_eq!(status, StatusCode::OK);
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["chain"], "ethereum");
    assert!(rows[0]["last_block"].as_u64().unwrap() >= 102);
}
