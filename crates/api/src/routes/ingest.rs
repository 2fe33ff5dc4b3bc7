//! Ingestion endpoint handler.
//!
//! Accepts a single open event or `{ "events": [...] }`. Every item is
//! validated before anything is written; a single bad item rejects the
//! whole request.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use engine_core::{
    limits::{MAX_BATCH_EVENTS, MAX_BATCH_SIZE_BYTES},
    validate_items, IngestPayload, ValidationErrorCode,
};
use std::time::Instant;
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::extractors::ClientIp;
use crate::response::{ApiError, BatchIngestResponse, IngestResponse};
use crate::state::AppState;

/// POST /telemetry
pub async fn ingest_handler(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let start = Instant::now();

    metrics().batches_received.inc();

    // Check payload size before parsing
    if body.len() > MAX_BATCH_SIZE_BYTES {
        return Err(ApiError::validation(
            ValidationErrorCode::BatchTooLarge.code(),
            vec![format!(
                "Payload size {}KB exceeds {}KB limit",
                body.len() / 1024,
                MAX_BATCH_SIZE_BYTES / 1024
            )],
        ));
    }

    let payload = IngestPayload::parse(&body)?;
    let received = payload.items.len();

    if received > MAX_BATCH_EVENTS {
        return Err(ApiError::validation(
            ValidationErrorCode::BatchTooLarge.code(),
            vec![format!(
                "Batch has {} events, exceeds {} limit",
                received, MAX_BATCH_EVENTS
            )],
        ));
    }
    metrics().events_received.inc_by(received as u64);

    let events = validate_items(&payload.items, Utc::now()).map_err(|errors| {
        warn!(received, rejected = errors.len(), "Request rejected by validation");
        metrics()
            .events_failed_validation
            .inc_by(errors.len() as u64);
        ApiError::invalid_items(errors)
    })?;

    let location = state.geo.resolve(&headers, client_ip.as_deref()).await;
    debug!(city = %location.city, country = %location.country, "Location resolved");
    let events: Vec<_> = events
        .into_iter()
        .map(|event| event.with_location(&location))
        .collect();

    let outcome = state.processor.process_batch(&events).await?;

    info!(
        received,
        processed = outcome.processed(),
        deduped = outcome.deduped(),
        latency_ms = start.elapsed().as_millis() as u64,
        "Ingestion complete"
    );

    if payload.batch {
        return Ok(Json(BatchIngestResponse::new(received, outcome)).into_response());
    }

    let (Some(event), Some(item)) = (events.first(), outcome.items.first()) else {
        return Err(ApiError::internal("Internal error"));
    };
    Ok(Json(IngestResponse {
        ok: true,
        deduped: item.deduped(),
        event_id: item.event_id.clone(),
        day: item.day.clone(),
        hour: item.hour.clone(),
        city: event.city.clone(),
        country: event.country.clone(),
        event: event.event.clone(),
    })
    .into_response())
}
