//! Integration tests for the measurement upload endpoint
//!
//! Requests go through the full router (middleware included) against
//! in-memory stores, so no database or socket is needed.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use measure_saver::{
    AllowedKeys, Measurement, MeasurementStore, MemoryStore, StoreError, StoreResult,
};
use serde_json::{json, Value};
use server::{build_router, ServerConfig, ServerState};
use tower::ServiceExt;

const TEST_BODY: &str = r#"{"browserID":"test","deviceType":"device","notes":"notes","download":1000,"upload":1000,"latency":10,"results":{}}"#;

/// Store whose every operation fails
struct BrokenStore;

#[async_trait]
impl MeasurementStore for BrokenStore {
    async fn insert(&self, _record: Measurement) -> StoreResult<Measurement> {
        Err(StoreError::Unavailable(
            "connection refused to db-internal.example:5432".into(),
        ))
    }

    async fn create_table_if_not_exists(&self) -> StoreResult<()> {
        Err(StoreError::Closed)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Err(StoreError::Closed)
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn router_with(store: Arc<dyn MeasurementStore>, keys: Option<AllowedKeys>) -> Router {
    let state = ServerState::new(ServerConfig::default(), store, keys);
    build_router(Arc::new(state))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_valid_measurement_round_trips() {
    let store = Arc::new(MemoryStore::new());
    let router = router_with(store.clone(), None);

    let (status, body) = send(router, post("/v0/measurements?appid=x", TEST_BODY)).await;
    assert_eq!(status, StatusCode::OK);

    let stored: Measurement = serde_json::from_value(body.clone()).unwrap();
    assert_ne!(stored.id, 0);
    assert_eq!(stored.browser_id, "test");
    assert_eq!(stored.device_type, "device");
    assert_eq!(stored.notes, "notes");
    assert_eq!(stored.download, 1000.0);
    assert_eq!(stored.upload, 1000.0);
    assert_eq!(stored.latency, 10);
    assert!(stored.timestamp.is_some());
    assert!(body.get("results").is_some());

    assert_eq!(store.rows(), vec![stored]);
}

#[tokio::test]
async fn test_explicit_zeroes_are_accepted() {
    let store = Arc::new(MemoryStore::new());
    let router = router_with(store.clone(), None);

    let body = r#"{"browserID":"b","download":0,"upload":0,"latency":0}"#;
    let (status, body) = send(router, post("/v0/measurements?appid=x", body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["download"], 0.0);
    assert_eq!(body["upload"], 0.0);
    assert_eq!(body["latency"], 0);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_missing_browser_id_is_bad_request() {
    let store = Arc::new(MemoryStore::new());
    let router = router_with(store.clone(), None);

    let body = r#"{"download":1,"upload":1,"latency":1}"#;
    let (status, body) = send(router, post("/v0/measurements?appid=x", body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(body["error"]["details"]["violations"][0]["field"], "browserID");
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_every_violation_is_listed() {
    let router = router_with(Arc::new(MemoryStore::new()), None);

    let (status, body) = send(router, post("/v0/measurements?appid=x", r#"{"BrowserID": "test"}"#)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["error"]["details"]["violations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, ["download", "upload", "latency"]);
}

#[tokio::test]
async fn test_missing_appid_is_bad_request() {
    let store = Arc::new(MemoryStore::new());

    for uri in ["/v0/measurements", "/v0/measurements?appid=", "/v0/measurements?other=1"] {
        let router = router_with(store.clone(), None);
        let (status, body) = send(router, post(uri, TEST_BODY)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "MISSING_APP_ID");
    }

    // Checked before the body is looked at.
    let router = router_with(store.clone(), None);
    let (status, body) = send(router, post("/v0/measurements", "thisisnotjson")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_APP_ID");

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let router = router_with(Arc::new(MemoryStore::new()), None);

    let (status, body) = send(router, post("/v0/measurements?appid=x", "thisisnotjson")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_BODY");
}

#[tokio::test]
async fn test_non_object_body_is_bad_request() {
    let store = Arc::new(MemoryStore::new());

    for body in [r#"["test",0,0,0]"#, "null", r#""x""#, "42"] {
        let router = router_with(store.clone(), None);
        let (status, response) = send(router, post("/v0/measurements?appid=x", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["error"]["code"], "INVALID_BODY", "{body}");
    }

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_info_blocks_round_trip_untouched() {
    let store = Arc::new(MemoryStore::new());
    let router = router_with(store.clone(), None);

    let client_info = json!({ "city": "Rome", "hostname": "h1", "asn": 3269 });
    let server_info = json!({ "site": "rom01", "tags": ["a", "b"], "load": null });
    let body = json!({
        "browserID": "b",
        "download": 1,
        "upload": 1,
        "latency": 1,
        "clientInfo": client_info,
        "serverInfo": server_info,
    });
    let (status, body) = send(router, post("/v0/measurements?appid=x", &body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clientInfo"], client_info);
    assert_eq!(body["serverInfo"], server_info);
}

#[tokio::test]
async fn test_empty_uuid_does_not_collide() {
    let store = Arc::new(MemoryStore::new());
    let body = r#"{"uuid":"","browserID":"b","download":1,"upload":1,"latency":1}"#;

    for expected_id in [1, 2] {
        let router = router_with(store.clone(), None);
        let (status, response) = send(router, post("/v0/measurements?appid=x", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["id"], expected_id);
        assert!(response.get("uuid").is_none());
    }

    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn test_body_without_content_type_is_still_decoded() {
    let router = router_with(Arc::new(MemoryStore::new()), None);

    let request = Request::builder()
        .method("POST")
        .uri("/v0/measurements?appid=x")
        .body(Body::from(TEST_BODY))
        .unwrap();
    let (status, _) = send(router, request).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_storage_failure_is_internal_error_without_detail() {
    let router = router_with(Arc::new(BrokenStore), None);

    let (status, body) = send(router, post("/v0/measurements?appid=x", TEST_BODY)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "STORAGE_ERROR");
    let rendered = body.to_string();
    assert!(!rendered.contains("db-internal"));
    assert!(!rendered.contains("5432"));
}

#[tokio::test]
async fn test_duplicate_uuid_is_internal_error() {
    let store = Arc::new(MemoryStore::new());
    let body = r#"{"uuid":"ndt-1","browserID":"b","download":1,"upload":1,"latency":1}"#;

    let (first, _) = send(router_with(store.clone(), None), post("/v0/measurements?appid=x", body)).await;
    let (second, _) = send(router_with(store.clone(), None), post("/v0/measurements?appid=x", body)).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_client_supplied_id_is_ignored() {
    let store = Arc::new(MemoryStore::new());
    let router = router_with(store.clone(), None);

    let body = json!({
        "id": 4242,
        "browserID": "b",
        "download": 1.5,
        "upload": 2.5,
        "latency": 3,
        "clientInfo": { "city": "Milan", "latitude": 45.46 },
        "serverInfo": { "site": "mil04" },
    });
    let (status, body) = send(router, post("/v0/measurements?appid=x", &body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["clientInfo"]["city"], "Milan");
    assert_eq!(body["serverInfo"]["site"], "mil04");
}

fn keys(list: &[&str]) -> AllowedKeys {
    AllowedKeys::new(list.iter().map(|k| k.to_string()))
}

#[tokio::test]
async fn test_key_gate_rejects_unknown_key_before_handler() {
    let store = Arc::new(MemoryStore::new());

    for uri in [
        "/v0/measurements?appid=x&key=nope",
        "/v0/measurements?appid=x",
        "/v0/measurements?appid=x&key=",
    ] {
        let router = router_with(store.clone(), Some(keys(&["foo", "bar"])));
        let (status, body) = send(router, post(uri, TEST_BODY)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"]["code"], "AUTH_FAILED");
    }

    // Rejected before appid and body are looked at.
    let router = router_with(store.clone(), Some(keys(&["foo"])));
    let (status, _) = send(router, post("/v0/measurements?key=nope", "thisisnotjson")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(store.is_empty());
}

#[tokio::test]
async fn test_key_gate_admits_valid_key() {
    let store = Arc::new(MemoryStore::new());
    let router = router_with(store.clone(), Some(keys(&["foo", "bar"])));

    let (status, body) = send(router, post("/v0/measurements?appid=x&key=bar", TEST_BODY)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["browserID"], "test");
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn test_key_gate_from_key_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "foo\nbar\n# comment\n\n").unwrap();

    let config = ServerConfig {
        keys_files: vec![file.path().to_path_buf()],
        ..Default::default()
    };
    let allowed = server::server::load_allowed_keys(&config).unwrap().unwrap();
    assert_eq!(allowed, keys(&["foo", "bar"]));

    let store = Arc::new(MemoryStore::new());
    let router = router_with(store.clone(), Some(allowed.clone()));
    let (status, _) = send(router, post("/v0/measurements?appid=x&key=foo", TEST_BODY)).await;
    assert_eq!(status, StatusCode::OK);

    let router = router_with(store, Some(allowed));
    let (status, _) = send(router, post("/v0/measurements?appid=x&key=%23%20comment", TEST_BODY)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_no_key_files_disables_gate() {
    let allowed = server::server::load_allowed_keys(&ServerConfig::default()).unwrap();
    assert!(allowed.is_none());
}

#[tokio::test]
async fn test_health_endpoints_stay_public() {
    let store = Arc::new(MemoryStore::new());

    let router = router_with(store.clone(), Some(keys(&["foo"])));
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let router = router_with(store, Some(keys(&["foo"])));
    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
    let (status, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["components"]["key_gate"], "enabled");
}

#[tokio::test]
async fn test_readiness_fails_when_store_is_down() {
    let router = router_with(Arc::new(BrokenStore), None);
    let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();

    let (status, body) = send(router, request).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_unknown_route_and_request_id() {
    let router = router_with(Arc::new(MemoryStore::new()), None);
    let request = Request::builder()
        .uri("/tests")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "req-123");
}

#[tokio::test]
async fn test_prepare_store_creates_schema() {
    let store = MemoryStore::new();
    server::server::prepare_store(&store).await.unwrap();
    assert!(store.table_created());

    assert!(server::server::prepare_store(&BrokenStore).await.is_err());
}
