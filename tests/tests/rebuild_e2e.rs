//! Rebuild endpoints: auth, dry run, repair of drifted aggregates, cron.

use axum::http::StatusCode;
use integration_tests::{
    fixtures::{self, CRON_TOKEN, FIXED_DAY, REBUILD_TOKEN},
    setup::TestContext,
};
use kv_store::Command;
use serde_json::{json, Value};

const DAY_OPENS: &str = "telemetry:day:2023-11-14:event:open";
const CITY_BRAND: &str = "telemetry:day:2023-11-14:city:Lyon:brand:Canon:event:open";

/// Three opens from Lyon on the fixed day.
async fn seed_day(ctx: &TestContext) {
    let payload = fixtures::batch_payload(fixtures::open_events(3, "Canon"));
    ctx.server
        .post("/telemetry")
        .add_header("x-vercel-ip-city", "Lyon")
        .add_header("x-vercel-ip-country", "FR")
        .json(&payload)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_rebuild_requires_token() {
    let ctx = TestContext::new();
    let body = json!({ "day": FIXED_DAY });

    let response = ctx.server.post("/telemetry/rebuild").json(&body).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let error: Value = response.json();
    assert_eq!(error["code"], "AUTH_001");

    let response = ctx
        .server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", "wrong")
        .json(&body)
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let error: Value = response.json();
    assert_eq!(error["code"], "AUTH_003");
    assert_eq!(error["error"], "Unauthorized");
}

#[tokio::test]
async fn test_rebuild_unconfigured_secret_is_server_error() {
    let ctx = TestContext::with_tokens(Default::default());

    let response = ctx
        .server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", "anything")
        .json(&json!({ "day": FIXED_DAY }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let error: Value = response.json();
    assert_eq!(error["code"], "CONF_001");
}

/// Dry run reports the plan and writes nothing.
#[tokio::test]
async fn test_rebuild_dry_run() {
    let ctx = TestContext::new();
    seed_day(&ctx).await;
    ctx.seed(vec![Command::set(DAY_OPENS, 99)]).await;

    let response = ctx
        .server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", REBUILD_TOKEN)
        .json(&json!({ "day": FIXED_DAY }))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header("cache-control").to_str().unwrap(),
        "no-store, max-age=0"
    );
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["days"], json!([FIXED_DAY]));

    let summary = &body["summaries"][0];
    assert_eq!(summary["day"], FIXED_DAY);
    assert_eq!(summary["stream_key"], "telemetry:raw:day:2023-11-14");
    assert_eq!(summary["raw_events"], 3);
    assert_eq!(summary["opens_keys"], 9);
    assert_eq!(summary["unique_keys"], 6);
    assert_eq!(summary["applied"], false);

    assert_eq!(ctx.counter(DAY_OPENS), 99);
}

/// Applying restores drifted counters and lost set members from the log.
#[tokio::test]
async fn test_rebuild_apply_repairs_drift() {
    let ctx = TestContext::new();
    seed_day(&ctx).await;
    ctx.seed(vec![
        Command::set(DAY_OPENS, 99),
        Command::set(CITY_BRAND, 1),
        Command::del(vec!["telemetry:day:2023-11-14:unique:all".into()]),
    ])
    .await;

    let request = json!({ "day": FIXED_DAY, "apply": true });
    let response = ctx
        .server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", REBUILD_TOKEN)
        .json(&request)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["dry_run"], false);
    assert_eq!(body["summaries"][0]["applied"], true);

    assert_eq!(ctx.counter(DAY_OPENS), 3);
    assert_eq!(ctx.counter(CITY_BRAND), 3);
    assert_eq!(
        ctx.store.members("telemetry:day:2023-11-14:unique:all").len(),
        3
    );

    // Running it again changes nothing.
    ctx.server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", REBUILD_TOKEN)
        .json(&request)
        .await
        .assert_status_ok();
    assert_eq!(ctx.counter(DAY_OPENS), 3);
    assert_eq!(ctx.counter(CITY_BRAND), 3);
}

/// Counters that drifted below the log are restored.
#[tokio::test]
async fn test_rebuild_restores_drifted_counter() {
    let ctx = TestContext::new();
    seed_day(&ctx).await;

    // The raw entry exists but the aggregates never saw it.
    ctx.seed(vec![Command::set(DAY_OPENS, 2)]).await;

    ctx.server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", REBUILD_TOKEN)
        .json(&json!({ "day": FIXED_DAY, "dry_run": false }))
        .await
        .assert_status_ok();

    assert_eq!(ctx.counter(DAY_OPENS), 3);
}

/// One failing command in the fan-out batch leaves the raw record behind;
/// a rebuild of the day recounts it.
#[tokio::test]
async fn test_rebuild_repairs_partial_batch_failure() {
    let ctx = TestContext::new();
    // INCR on a set fails with WRONGTYPE; the rest of the batch still runs.
    ctx.seed(vec![Command::sadd(DAY_OPENS, vec!["junk".into()])])
        .await;

    ctx.server
        .post("/telemetry")
        .add_header("x-vercel-ip-city", "Lyon")
        .json(&fixtures::open_event("anon-1", "Canon"))
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ctx.store.stream_len("telemetry:raw:day:2023-11-14"), 1);
    assert_eq!(ctx.counter(CITY_BRAND), 1);

    ctx.server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", REBUILD_TOKEN)
        .json(&json!({ "day": FIXED_DAY, "apply": true, "reset_day_keys": true }))
        .await
        .assert_status_ok();

    assert_eq!(ctx.counter(DAY_OPENS), 1);
    assert_eq!(ctx.counter(CITY_BRAND), 1);
    assert!(ctx
        .store
        .members("telemetry:day:2023-11-14:unique:all")
        .contains("anon-1"));
}

#[tokio::test]
async fn test_rebuild_reset_removes_stray_keys() {
    let ctx = TestContext::new();
    seed_day(&ctx).await;
    let stray = "telemetry:day:2023-11-14:city:Nowhere:event:open";
    ctx.seed(vec![Command::set(stray, 5)]).await;

    let response = ctx
        .server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", REBUILD_TOKEN)
        .json(&json!({ "day": FIXED_DAY, "apply": true, "reset_day_keys": true }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["reset_day_keys"], true);
    assert!(body["summaries"][0]["deleted_day_keys"].as_u64().unwrap() > 0);

    assert!(ctx.store.get(stray).is_none());
    assert_eq!(ctx.counter(DAY_OPENS), 3);
    // Outside the day namespace; untouched.
    assert_eq!(ctx.store.stream_len("telemetry:raw:day:2023-11-14"), 3);
    assert_eq!(ctx.counter("telemetry:total:event:open"), 3);
}

/// A held lock fails that day only; the response carries the same report.
#[tokio::test]
async fn test_rebuild_lock_conflict_reports_failed_day() {
    let ctx = TestContext::new();
    seed_day(&ctx).await;
    ctx.seed(vec![Command::set("telemetry:lock:rebuild:2023-11-14", "other")])
        .await;

    let response = ctx
        .server
        .post("/telemetry/rebuild")
        .add_header("x-rebuild-token", REBUILD_TOKEN)
        .json(&json!({ "start_day": "2023-11-14", "end_day": "2023-11-15", "apply": true }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["ok"], false);
    assert_eq!(body["summaries"][0]["error"], "rebuild already running");
    assert!(body["summaries"][1].get("error").is_none());
}

#[tokio::test]
async fn test_rebuild_rejects_bad_ranges() {
    let ctx = TestContext::new();
    let post = |body: Value| {
        ctx.server
            .post("/telemetry/rebuild")
            .add_header("x-rebuild-token", REBUILD_TOKEN)
            .json(&body)
    };

    post(json!({})).await.assert_status(StatusCode::BAD_REQUEST);
    post(json!({ "day": "14/11/2023" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    post(json!({ "start_day": "2023-11-15", "end_day": "2023-11-14" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    post(json!({ "start_day": "2023-01-01", "end_day": "2023-03-01" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    post(json!({ "day": FIXED_DAY, "page_size": 10 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cron_uses_bearer_and_scope() {
    let ctx = TestContext::new();

    ctx.server
        .get("/telemetry/rebuild-cron")
        .add_header("x-rebuild-token", REBUILD_TOKEN)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let bearer = format!("Bearer {}", CRON_TOKEN);
    let response = ctx
        .server
        .get("/telemetry/rebuild-cron")
        .add_header("authorization", &bearer)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["scope"], "yesterday");
    assert_eq!(body["dry_run"], false);
    assert_eq!(body["days"].as_array().map(Vec::len), Some(1));

    let response = ctx
        .server
        .post("/telemetry/rebuild-cron")
        .add_query_param("scope", "today")
        .add_header("authorization", &bearer)
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["scope"], "today");

    ctx.server
        .get("/telemetry/rebuild-cron")
        .add_query_param("scope", "last-week")
        .add_header("authorization", &bearer)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}
