//! Read-only reporting endpoint.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use engine_core::{trailing_days, StatsQuery};

use crate::extractors::{Authorized, StatsToken};
use crate::response::{ApiError, StatsResponse};
use crate::state::AppState;

/// GET /telemetry/stats?day=YYYY-MM-DD | ?days=N
pub async fn stats_handler(
    State(state): State<AppState>,
    _auth: Authorized<StatsToken>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let days = match query.single_day()? {
        Some(day) => vec![day],
        None => trailing_days(Utc::now(), query.window()),
    };

    let report = worker::collect_stats(state.store.as_ref(), days).await?;
    Ok(Json(StatsResponse { ok: true, report }))
}
