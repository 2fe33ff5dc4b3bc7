//! Stats endpoint: totals, exact unions and labeled estimates.

use axum::http::StatusCode;
use engine_core::auth::AccessTokens;
use integration_tests::{
    fixtures::{self, FIXED_DAY, FIXED_HOUR},
    setup::{default_tokens, TestContext},
};
use kv_store::Command;
use serde_json::{json, Value};

async fn ingest_from(ctx: &TestContext, city: &str, events: Vec<Value>) {
    ctx.server
        .post("/telemetry")
        .add_header("x-vercel-ip-city", city)
        .add_header("x-vercel-ip-country", "FR")
        .json(&fixtures::batch_payload(events))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_stats_for_single_day() {
    let ctx = TestContext::new();
    ingest_from(&ctx, "Lyon", fixtures::open_events(3, "Canon")).await;
    ingest_from(
        &ctx,
        "Paris",
        vec![
            fixtures::open_event("anon-0", "Sony"),
            fixtures::open_event("anon-p", "Sony"),
        ],
    )
    .await;

    let response = ctx
        .server
        .get("/telemetry/stats")
        .add_query_param("day", FIXED_DAY)
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["days"], json!([FIXED_DAY]));
    assert_eq!(body["city_totals"]["Lyon"], 3);
    assert_eq!(body["city_totals"]["Paris"], 2);
    assert_eq!(body["brand_totals"]["Canon"], 3);
    assert_eq!(body["brand_totals"]["Sony"], 2);
    assert_eq!(body["city_brand_totals"]["Paris"]["Sony"], 2);
    assert_eq!(body["hour_totals"][FIXED_HOUR], 5);

    // anon-0 opened in both cities; the global count is a union.
    assert_eq!(body["global_unique_total"]["value"], 4);
    assert_eq!(body["global_unique_total"]["source"], "exact");
    assert_eq!(body["city_unique_totals"]["Lyon"]["value"], 3);
    assert_eq!(body["city_unique_totals"]["Lyon"]["source"], "exact");
    assert!(body.get("warnings").is_none());
}

/// Opens without day sets get estimated uniques and a warning.
#[tokio::test]
async fn test_stats_estimates_are_labeled() {
    let ctx = TestContext::new();
    ctx.seed(vec![
        Command::set("telemetry:day:2024-01-01:city:A:brand:Canon:event:open", 80),
        Command::set("telemetry:day:2024-01-01:city:B:brand:Canon:event:open", 20),
        Command::sadd(
            "telemetry:unique:all",
            (0..10).map(|i| format!("u{}", i)).collect(),
        ),
    ])
    .await;

    let body: Value = ctx
        .server
        .get("/telemetry/stats")
        .add_query_param("day", "2024-01-01")
        .await
        .json();

    assert_eq!(body["city_totals"]["A"], 80);
    assert_eq!(body["global_unique_total"]["source"], "legacy-snapshot");
    assert_eq!(body["city_unique_totals"]["A"]["value"], 8);
    assert_eq!(body["city_unique_totals"]["A"]["source"], "estimated");
    assert_eq!(body["city_unique_totals"]["B"]["value"], 2);
    assert!(!body["warnings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_stats_window_is_clamped() {
    let ctx = TestContext::new();

    let body: Value = ctx
        .server
        .get("/telemetry/stats")
        .add_query_param("days", "90")
        .await
        .json();
    assert_eq!(body["days"].as_array().unwrap().len(), 30);

    let body: Value = ctx.server.get("/telemetry/stats").await.json();
    assert_eq!(body["days"].as_array().unwrap().len(), 7);
    assert_eq!(body["global_unique_total"]["value"], 0);
}

#[tokio::test]
async fn test_stats_rejects_bad_day() {
    let ctx = TestContext::new();

    ctx.server
        .get("/telemetry/stats")
        .add_query_param("day", "2024-13-45")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stats_token_when_configured() {
    let ctx = TestContext::with_tokens(AccessTokens {
        stats: Some("stats-secret".into()),
        ..default_tokens()
    });

    ctx.server
        .get("/telemetry/stats")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    ctx.server
        .get("/telemetry/stats")
        .add_header("x-stats-token", "stats-secret")
        .await
        .assert_status_ok();

    ctx.server
        .get("/telemetry/stats")
        .add_query_param("token", "stats-secret")
        .await
        .assert_status_ok();
}
