//! API routes.

pub mod health;
pub mod ingest;
pub mod migrate;
pub mod rebuild;
pub mod stats;

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Operator responses are never cached.
    let operator = Router::new()
        .route("/telemetry/rebuild", post(rebuild::rebuild_handler))
        .route(
            "/telemetry/rebuild-cron",
            get(rebuild::cron_handler).post(rebuild::cron_handler),
        )
        .route("/telemetry/migrate", post(migrate::migrate_handler))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, max-age=0"),
        ));

    Router::new()
        .route("/telemetry", post(ingest::ingest_handler))
        .route("/telemetry/stats", get(stats::stats_handler))
        .route("/health", get(health::health_handler))
        .route("/health/ready", get(health::ready_handler))
        .route("/health/live", get(health::live_handler))
        .merge(operator)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
