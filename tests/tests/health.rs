//! Tests for health check endpoints.

use axum::http::StatusCode;
use integration_tests::setup::TestContext;
use telemetry::health;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new();

    let response = ctx.server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    let status = body["status"].as_str().unwrap_or("");
    assert!(
        status == "healthy" || status == "degraded" || status == "unhealthy",
        "Status should be 'healthy', 'degraded', or 'unhealthy', got '{}'",
        status
    );
    assert_eq!(body["store_backend"], "flaky");
    assert!(body["store_connected"].is_boolean());
    assert!(body["geo_healthy"].is_boolean());
    assert!(body["metrics"]["events_received"].is_u64());
    assert!(body["metrics"]["rebuild_in_progress"].is_boolean());
}

/// Readiness follows the store probe.
#[tokio::test]
async fn test_ready_follows_store_health() {
    let ctx = TestContext::new();

    health().store.set_unhealthy("probe failed");
    ctx.server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = ctx.server.get("/health").await.json();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["store_connected"], false);

    health().store.set_healthy();
    ctx.server.get("/health/ready").await.assert_status_ok();
}

#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new();

    ctx.server.get("/health/live").await.assert_status_ok();
}

/// Ingestion shows up in the metrics snapshot.
#[tokio::test]
async fn test_metrics_count_ingestion() {
    let ctx = TestContext::new();
    let before: serde_json::Value = ctx.server.get("/health").await.json();

    ctx.server
        .post("/telemetry")
        .json(&integration_tests::fixtures::open_event("anon-m", "Canon"))
        .await
        .assert_status_ok();

    let after: serde_json::Value = ctx.server.get("/health").await.json();
    let received = |body: &serde_json::Value| body["metrics"]["events_received"].as_u64().unwrap();
    assert!(received(&after) > received(&before));
}

/// Test that health endpoints don't require authentication
#[tokio::test]
async fn test_health_endpoints_no_auth_required() {
    let ctx = TestContext::with_tokens(Default::default());

    for path in ["/health", "/health/ready", "/health/live"] {
        let response = ctx.server.get(path).await;
        assert_ne!(
            response.status_code(),
            StatusCode::UNAUTHORIZED,
            "{} should not require auth",
            path
        );
    }
}

/// Cross-origin requests get CORS headers.
#[tokio::test]
async fn test_cors_headers_on_routes() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .get("/health")
        .add_header("origin", "https://app.example.com")
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header("access-control-allow-origin").to_str().unwrap(),
        "*"
    );
}
