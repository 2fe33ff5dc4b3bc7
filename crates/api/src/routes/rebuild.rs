//! Operator rebuild endpoints.

use axum::{
    body::Bytes,
    extract::{Query, State},
};
use engine_core::{DayScope, RebuildRequest};
use serde::Deserialize;
use tracing::info;

use crate::extractors::{Authorized, CronToken, RebuildToken};
use crate::response::{ApiError, RebuildResponse};
use crate::state::AppState;
use worker::RebuildOptions;

/// POST /telemetry/rebuild
pub async fn rebuild_handler(
    State(state): State<AppState>,
    _auth: Authorized<RebuildToken>,
    body: Bytes,
) -> Result<RebuildResponse, ApiError> {
    let request = RebuildRequest::parse(&body)?;
    let days = request.days()?;
    let apply = request.apply();
    let reset = request.reset_day_keys();

    let options = RebuildOptions::new(days)
        .apply(apply)
        .reset_day_keys(reset)
        .page_size(request.page_size.unwrap_or(state.worker.page_size));

    info!(days = ?options.days, apply, reset, "Rebuild requested");
    let report = state.rebuild.run(&options).await;
    Ok(RebuildResponse::new(report, apply, reset))
}

#[derive(Debug, Default, Deserialize)]
pub struct CronQuery {
    pub scope: Option<String>,
}

/// GET|POST /telemetry/rebuild-cron
///
/// Always applies; reset follows server configuration.
pub async fn cron_handler(
    State(state): State<AppState>,
    _auth: Authorized<CronToken>,
    Query(query): Query<CronQuery>,
) -> Result<RebuildResponse, ApiError> {
    let scope = match query.scope.as_deref() {
        Some(scope) => DayScope::parse(scope)?,
        None => state.worker.rebuild_scope,
    };

    let options = state.worker.rebuild_options(scope);
    info!(scope = scope.as_str(), days = ?options.days, "Cron rebuild triggered");
    let report = state.rebuild.run(&options).await;
    Ok(RebuildResponse::new(report, true, options.reset_day_keys).with_scope(scope.as_str()))
}
