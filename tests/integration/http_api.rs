//! HTTP API tests driven through the router without a socket.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use tower::ServiceExt;

use mcam::bridge::mock::MockBridge;
use mcam::error::BridgeError;
use mcam::server::{AppState, router};

use crate::common::fixtures::config;

const TOKEN: &str = "s3cret-token";

fn app(bridge: &Arc<MockBridge>, token: Option<&str>) -> (Router, AppState) {
    let mut config = config();
    config.server.api_token = token.map(ToString::to_string);
    let state = AppState::new(&config, None, bridge.clone());
    (router(state.clone()), state)
}

async fn send(app: Router, method: Method, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

// ===== Public routes =====

#[tokio::test]
async fn test_index_reports_auth_state() {
    let bridge = Arc::new(MockBridge::new(["A"]));

    let (open, _) = app(&bridge, None);
    let (status, json) = send(open, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["service"], "mcam");
    assert_eq!(json["auth_enabled"], false);
    assert_eq!(json["session_timeout_seconds"], 10.0);

    let (locked, _) = app(&bridge, Some(TOKEN));
    let (status, json) = send(locked, Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["auth_enabled"], true);
}

#[tokio::test]
async fn test_health_is_public_and_lists_devices() {
    let bridge = Arc::new(MockBridge::new(["B", "A"]));
    let (router, _) = app(&bridge, Some(TOKEN));

    let (status, json) = send(router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["devices"][0]["serial"], "A");
    assert_eq!(json["devices"][1]["serial"], "B");
}

#[tokio::test]
async fn test_health_leaves_cache_untouched() {
    let bridge = Arc::new(MockBridge::new(["A", "B"]));
    let (router, state) = app(&bridge, None);

    let (status, _) = send(router.clone(), Method::POST, "/prime", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.cache.serials(), vec!["A", "B"]);
    bridge.clear_calls();

    let (status, json) = send(router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["devices"].as_array().unwrap().len(), 2);
    assert_eq!(state.cache.serials(), vec!["A", "B"]);
    for serial in ["A", "B"] {
        assert_eq!(bridge.commands_for(serial), vec!["echo ok"]);
    }
}

// ===== Auth =====

#[tokio::test]
async fn test_missing_token_is_rejected_before_device_work() {
    let bridge = Arc::new(MockBridge::new(["A"]));

    for path in ["/prime", "/capture"] {
        let (router, _) = app(&bridge, Some(TOKEN));
        let (status, json) = send(router, Method::POST, path, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["kind"], "unauthorized");

        let (router, _) = app(&bridge, Some(TOKEN));
        let (status, _) = send(router, Method::POST, path, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    assert!(bridge.calls().is_empty());
}

#[tokio::test]
async fn test_valid_token_is_accepted() {
    let bridge = Arc::new(MockBridge::new(["A"]));
    let (router, _) = app(&bridge, Some(TOKEN));

    let (status, json) = send(router, Method::POST, "/prime", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["primed_devices"], 1);
}

#[tokio::test]
async fn test_no_configured_token_means_open_access() {
    let bridge = Arc::new(MockBridge::new(["A"]));
    let (router, _) = app(&bridge, None);

    let (status, _) = send(router, Method::POST, "/prime", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cli_token_overrides_config() {
    let bridge = Arc::new(MockBridge::new(["A"]));
    let state = AppState::new(&config(), None, bridge.clone())
        .with_api_token(Some("from-cli".to_string()));
    assert!(state.auth_enabled());

    let (status, _) = send(router(state.clone()), Method::POST, "/prime", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(router(state), Method::POST, "/prime", Some("from-cli")).await;
    assert_eq!(status, StatusCode::OK);
}

// ===== Prime and capture =====

#[tokio::test]
async fn test_prime_response_shape() {
    let bridge = Arc::new(MockBridge::new(["B", "A"]));
    bridge.fail_command("B", "am start", "Activity not found");
    let (router, state) = app(&bridge, None);

    let (status, json) = send(router, Method::POST, "/prime", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["service"], "mcam");
    assert!(json["session_id"].is_string());
    assert_eq!(json["count"], 2);
    assert_eq!(json["primed_devices"], 1);

    let devices = json["devices"].as_array().unwrap();
    assert_eq!(devices[0]["serial"], "A");
    assert_eq!(devices[0]["ok"], true);
    assert_eq!(devices[0]["replaced"], false);
    assert!(devices[0].get("error").is_none());
    assert_eq!(devices[1]["serial"], "B");
    assert_eq!(devices[1]["ok"], false);
    assert_eq!(devices[1]["error"]["kind"], "command_failed");

    assert_eq!(state.cache.serials(), vec!["A"]);
}

#[tokio::test]
async fn test_capture_response_embeds_images_in_order() {
    let bridge = Arc::new(MockBridge::new(["C", "A", "B"]));
    let (router, state) = app(&bridge, None);

    let (status, json) = send(router, Method::POST, "/capture", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 3);
    assert_eq!(json["captured"], 3);

    let devices = json["devices"].as_array().unwrap();
    let serials: Vec<&str> = devices.iter().map(|d| d["serial"].as_str().unwrap()).collect();
    assert_eq!(serials, vec!["A", "B", "C"]);
    for (i, entry) in devices.iter().enumerate() {
        assert_eq!(entry["position"], format!("device_{}", i + 1));
        assert_eq!(entry["format"], "png");
        assert_eq!(entry["width"], 4);
        assert_eq!(entry["height"], 3);
        assert!(!entry["image_base64"].as_str().unwrap().is_empty());
    }
    assert!(state.cache.is_empty());
}

#[tokio::test]
async fn test_capture_with_no_devices_is_empty_success() {
    let bridge = Arc::new(MockBridge::new(Vec::<String>::new()));
    let (router, _) = app(&bridge, None);

    let (status, json) = send(router, Method::POST, "/capture", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 0);
    assert_eq!(json["devices"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_discovery_failure_is_bad_gateway() {
    let bridge = Arc::new(MockBridge::new(["A"]));
    bridge.fail_discovery(BridgeError::Spawn("adb: not found".to_string()));
    let (router, _) = app(&bridge, None);

    let (status, json) = send(router, Method::POST, "/capture", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error"]["kind"], "discovery_failed");
    assert!(json["error"]["message"].as_str().unwrap().contains("adb: not found"));
    assert_eq!(bridge.device_call_count(), 0);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let bridge = Arc::new(MockBridge::new(["A"]));
    let (router, _) = app(&bridge, None);
    let (status, _) = send(router, Method::GET, "/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
