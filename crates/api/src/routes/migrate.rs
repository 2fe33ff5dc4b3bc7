//! Legacy migration endpoint.

use axum::{body::Bytes, extract::State, Json};
use engine_core::{MigrateRequest, MigrationMode};
use tracing::info;

use crate::extractors::{Authorized, MigrateToken};
use crate::response::{ApiError, MigrateResponse};
use crate::state::AppState;

/// POST /telemetry/migrate
pub async fn migrate_handler(
    State(state): State<AppState>,
    _auth: Authorized<MigrateToken>,
    body: Bytes,
) -> Result<Json<MigrateResponse>, ApiError> {
    let request = MigrateRequest::parse(&body)?;
    let mode = request.mode()?;
    let days = match mode {
        MigrationMode::LegacySnapshotCopy => request.days()?,
        // Totals are recomputed from every stored day.
        MigrationMode::TotalCounters => Vec::new(),
    };
    let dry_run = request.dry_run();

    info!(mode = mode.as_str(), days = days.len(), dry_run, "Migration requested");
    let report = state.migrator.run(mode, days, dry_run).await?;
    Ok(Json(MigrateResponse { ok: true, report }))
}
