//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine_core::{ItemError, ValidationErrorCode};
use ingest::{BatchOutcome, IngestOutcome};
use serde::{Deserialize, Serialize};
use telemetry::MetricsSnapshot;
use tracing::error;
use worker::{MigrationReport, RebuildReport, StatsReport};

/// Single-event ingestion result.
#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub ok: bool,
    pub deduped: bool,
    pub event_id: String,
    pub day: String,
    pub hour: String,
    pub city: String,
    pub country: String,
    pub event: String,
}

/// Batch ingestion result.
#[derive(Debug, Serialize)]
pub struct BatchIngestResponse {
    pub ok: bool,
    pub received: usize,
    pub processed: usize,
    pub deduped: usize,
    pub items: Vec<IngestOutcome>,
}

impl BatchIngestResponse {
    pub fn new(received: usize, outcome: BatchOutcome) -> Self {
        Self {
            ok: true,
            received,
            processed: outcome.processed(),
            deduped: outcome.deduped(),
            items: outcome.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RebuildResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'static str>,
    pub dry_run: bool,
    pub reset_day_keys: bool,
    #[serde(flatten)]
    pub report: RebuildReport,
}

impl RebuildResponse {
    pub fn new(report: RebuildReport, apply: bool, reset_day_keys: bool) -> Self {
        Self {
            ok: report.is_ok(),
            scope: None,
            dry_run: !apply,
            reset_day_keys,
            report,
        }
    }

    pub fn with_scope(mut self, scope: &'static str) -> Self {
        self.scope = Some(scope);
        self
    }

    /// 200 when every day succeeded, 500 with the same body otherwise.
    pub fn status(&self) -> StatusCode {
        if self.ok {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for RebuildResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct MigrateResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: MigrationReport,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub report: StatsReport,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub store_backend: &'static str,
    pub store_connected: bool,
    pub geo_healthy: bool,
    pub metrics: MetricsSnapshot,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error type with coded errors.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(
            StatusCode::BAD_REQUEST,
            ValidationErrorCode::InvalidFormat.code(),
            msg,
        )
    }

    pub fn unauthorized(code: impl Into<String>) -> Self {
        Self::with_code(StatusCode::UNAUTHORIZED, code, "Unauthorized")
    }

    pub fn storage() -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "DB_001", "Storage error")
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_001", msg)
    }

    pub fn validation(code: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            response: ErrorResponse::new("Validation failed", code)
                .with_details(serde_json::json!(errors)),
        }
    }

    /// Per-item rejections of an ingestion request.
    pub fn invalid_items(errors: Vec<ItemError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            response: ErrorResponse::new(
                "Validation failed",
                ValidationErrorCode::InvalidFormat.code(),
            )
            .with_details(serde_json::json!(errors)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<engine_core::Error> for ApiError {
    fn from(err: engine_core::Error) -> Self {
        use engine_core::Error;

        match err {
            Error::Auth { code, .. } => ApiError::unauthorized(code),
            Error::ValidationWithCode { code, message, .. } => {
                ApiError::validation(code, vec![message])
            }
            Error::InvalidEvent { index, source } => {
                ApiError::invalid_items(vec![ItemError::new(index, &source)])
            }
            Error::Validation(msg) => ApiError::bad_request(msg),
            Error::Serialization(e) => ApiError::bad_request(format!("Invalid JSON: {}", e)),
            Error::Storage(detail) => {
                error!(detail = %detail, "Storage error");
                ApiError::storage()
            }
            Error::Config(msg) => {
                error!(detail = %msg, "Server misconfigured");
                ApiError::with_code(StatusCode::INTERNAL_SERVER_ERROR, "CONF_001", msg)
            }
            Error::Conflict(msg) => ApiError::with_code(StatusCode::CONFLICT, "CONFLICT_001", msg),
            Error::Internal(msg) => {
                error!(detail = %msg, "Internal error");
                ApiError::internal("Internal error")
            }
        }
    }
}
