//! Unified error types for the tally engine.
//!
//! Error codes:
//! - AUTH_001, AUTH_003: Access token errors
//! - VALID_001-002: Validation errors
//! - DB_001: Storage errors
//! - CONF_001: Server configuration errors

use thiserror::Error;

use crate::event::EventValidationError;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Access token error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    /// AUTH_001: Access token is required
    MissingToken,
    /// AUTH_003: Access token does not match
    InvalidToken,
}

impl AuthErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingToken => "AUTH_001",
            Self::InvalidToken => "AUTH_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        401
    }
}

/// Validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Invalid JSON / Invalid format
    InvalidFormat,
    /// VALID_002: Batch exceeds the event or byte limit
    BatchTooLarge,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "VALID_001",
            Self::BatchTooLarge => "VALID_002",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Store command failed
    StoreFailed,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreFailed => "DB_001",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        500
    }
}

/// Unified error type for the tally engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Access token error with code.
    #[error("[{code}] {message}")]
    Auth {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Validation error with code.
    #[error("[{code}] {message}")]
    ValidationWithCode {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    #[error("validation error: {0}")]
    Validation(String),

    /// A single event inside a request failed validation.
    #[error("event[{index}]: {source}")]
    InvalidEvent {
        index: usize,
        #[source]
        source: EventValidationError,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing store failure: transport, HTTP status or per-command error reply.
    #[error("storage error: {0}")]
    Storage(String),

    /// Another rebuild holds the day lock.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The server is missing a required setting (e.g. an access token).
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an access token error.
    pub fn auth(code: AuthErrorCode, msg: impl Into<String>) -> Self {
        Self::Auth {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a validation error with code.
    pub fn validation_code(code: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::ValidationWithCode {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_event(index: usize, source: EventValidationError) -> Self {
        Self::InvalidEvent { index, source }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Auth { http_status, .. } => *http_status,
            Self::ValidationWithCode { http_status, .. } => *http_status,
            Self::Validation(_) => 400,
            Self::InvalidEvent { .. } => 400,
            Self::Serialization(_) => 400,
            Self::Storage(_) => DbErrorCode::StoreFailed.http_status(),
            Self::Conflict(_) => 409,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Auth { code, .. } => Some(code),
            Self::ValidationWithCode { code, .. } => Some(code),
            Self::Validation(_) | Self::InvalidEvent { .. } | Self::Serialization(_) => {
                Some(ValidationErrorCode::InvalidFormat.code())
            }
            Self::Storage(_) => Some(DbErrorCode::StoreFailed.code()),
            Self::Config(_) => Some("CONF_001"),
            Self::Conflict(_) | Self::Internal(_) => None,
        }
    }

    /// Storage failures are transient from the caller's point of view.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Conflict(_))
    }
}
