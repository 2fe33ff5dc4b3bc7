//! Legacy migration endpoint.

use axum::http::StatusCode;
use integration_tests::{
    fixtures::{self, MIGRATE_TOKEN},
    setup::TestContext,
};
use kv_store::Command;
use serde_json::{json, Value};

async fn seed_legacy(ctx: &TestContext) {
    ctx.seed(vec![
        Command::sadd("telemetry:unique:all", vec!["u1".into(), "u2".into(), "u3".into()]),
        Command::sadd("telemetry:unique:city:Lyon", vec!["u1".into(), "u2".into()]),
        Command::sadd("telemetry:unique:city:Oslo", vec!["u3".into()]),
        Command::sadd("telemetry:unique:lang:fr", vec!["u1".into()]),
    ])
    .await;
}

#[tokio::test]
async fn test_migrate_requires_token() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/telemetry/migrate")
        .json(&json!({ "day": "2024-01-01" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_snapshot_dry_run_by_default() {
    let ctx = TestContext::new();
    seed_legacy(&ctx).await;

    let response = ctx
        .server
        .post("/telemetry/migrate")
        .add_header("x-migrate-token", MIGRATE_TOKEN)
        .json(&json!({ "start_day": "2024-01-01", "end_day": "2024-01-02" }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["mode"], "legacy-snapshot-copy");
    assert_eq!(body["dry_run"], true);
    assert!(body["warning"].as_str().unwrap().contains("historical"));
    assert_eq!(body["legacy_key_counts"]["all"], 1);
    assert_eq!(body["legacy_key_counts"]["city"], 2);
    assert_eq!(body["legacy_key_counts"]["lang"], 1);
    assert_eq!(body["planned_write_sets"], 2 * 4);
    assert!(body.get("migrated").is_none());

    assert!(ctx.store.keys("telemetry:day:*").is_empty());
}

/// Applying unions the flat sets into each day without dropping members
/// the day already had.
#[tokio::test]
async fn test_snapshot_copy_applies() {
    let ctx = TestContext::new();
    seed_legacy(&ctx).await;
    ctx.seed(vec![Command::sadd(
        "telemetry:day:2024-01-01:unique:city:Lyon",
        vec!["u9".into()],
    )])
    .await;

    let response = ctx
        .server
        .post("/telemetry/migrate")
        .add_header("x-migrate-token", MIGRATE_TOKEN)
        .json(&json!({ "day": "2024-01-01", "dry_run": false }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["migrated"]["days"], 1);

    let lyon = ctx.store.members("telemetry:day:2024-01-01:unique:city:Lyon");
    assert_eq!(lyon.len(), 3);
    assert!(lyon.contains("u9"));
    assert_eq!(
        ctx.store.members("telemetry:day:2024-01-01:unique:all").len(),
        3
    );
    assert!(ctx
        .store
        .members("telemetry:day:2024-01-01:unique:lang:fr")
        .contains("u1"));
}

#[tokio::test]
async fn test_snapshot_requires_days() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/telemetry/migrate")
        .add_header("x-migrate-token", MIGRATE_TOKEN)
        .json(&json!({ "mode": "legacy-snapshot-copy" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_mode_rejected() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/telemetry/migrate")
        .add_header("x-migrate-token", MIGRATE_TOKEN)
        .json(&json!({ "mode": "everything", "day": "2024-01-01" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

/// All-time counters are recomputed from the day counters.
#[tokio::test]
async fn test_total_counters_recomputed() {
    let ctx = TestContext::new();
    ctx.server
        .post("/telemetry")
        .add_header("x-vercel-ip-city", "Lyon")
        .json(&fixtures::batch_payload(fixtures::open_events(4, "Canon")))
        .await
        .assert_status_ok();

    // Totals drift away from the day counters.
    ctx.seed(vec![
        Command::set("telemetry:total:event:open", 1000),
        Command::set("telemetry:total:city:Lyon:event:open", 7),
    ])
    .await;

    let response = ctx
        .server
        .post("/telemetry/migrate")
        .add_header("x-migrate-token", MIGRATE_TOKEN)
        .json(&json!({ "mode": "total-counters" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["mode"], "total-counters");
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["totals"]["telemetry:total:event:open"], 4);
    assert_eq!(ctx.counter("telemetry:total:event:open"), 1000);

    let response = ctx
        .server
        .post("/telemetry/migrate")
        .add_header("x-migrate-token", MIGRATE_TOKEN)
        .json(&json!({ "mode": "total-counters", "dry_run": false }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert!(body["writes"].as_u64().unwrap() > 0);

    assert_eq!(ctx.counter("telemetry:total:event:open"), 4);
    assert_eq!(ctx.counter("telemetry:total:city:Lyon:event:open"), 4);
    assert_eq!(ctx.counter("telemetry:total:brand:Canon:event:open"), 4);
    assert_eq!(
        ctx.counter("telemetry:total:city:Lyon:brand:Canon:event:open"),
        4
    );
}
