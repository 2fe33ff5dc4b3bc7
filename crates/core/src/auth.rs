//! Shared-secret checks for the operator endpoints.
//!
//! This module provides:
//! - Configured secrets per operation (`AccessTokens`)
//! - Token extraction from `Authorization: Bearer` and custom headers
//! - Constant-time comparison

use serde::{Deserialize, Serialize};

use crate::error::{AuthErrorCode, Error, Result};

/// Operator operations guarded by a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Rebuild,
    Migrate,
    Cron,
    Stats,
}

impl TokenKind {
    /// Environment variable that configures the secret.
    pub fn setting(&self) -> &'static str {
        match self {
            Self::Rebuild => "TELEMETRY_REBUILD_TOKEN",
            Self::Migrate => "TELEMETRY_MIGRATE_TOKEN",
            Self::Cron => "CRON_SECRET",
            Self::Stats => "TELEMETRY_STATS_TOKEN",
        }
    }

    /// Header carrying the token. Cron uses `Authorization: Bearer`.
    pub fn header(&self) -> &'static str {
        match self {
            Self::Rebuild => "x-rebuild-token",
            Self::Migrate => "x-migrate-token",
            Self::Cron => "authorization",
            Self::Stats => "x-stats-token",
        }
    }

    /// Reporting stays open when no stats token is configured.
    pub fn required(&self) -> bool {
        !matches!(self, Self::Stats)
    }
}

/// Configured secrets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessTokens {
    #[serde(default)]
    pub rebuild: Option<String>,
    #[serde(default)]
    pub migrate: Option<String>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub stats: Option<String>,
}

impl AccessTokens {
    pub fn secret(&self, kind: TokenKind) -> Option<&str> {
        let value = match kind {
            TokenKind::Rebuild => &self.rebuild,
            TokenKind::Migrate => &self.migrate,
            TokenKind::Cron => &self.cron,
            TokenKind::Stats => &self.stats,
        };
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Check a presented token for `kind`.
    ///
    /// A required secret that is not configured is a server error, not a
    /// client one.
    pub fn verify(&self, kind: TokenKind, presented: Option<&str>) -> Result<()> {
        let Some(secret) = self.secret(kind) else {
            if kind.required() {
                return Err(Error::config(format!("Missing {}", kind.setting())));
            }
            return Ok(());
        };

        let presented = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::auth(AuthErrorCode::MissingToken, "Unauthorized"))?;

        if !constant_time_eq(secret.as_bytes(), presented.as_bytes()) {
            return Err(Error::auth(AuthErrorCode::InvalidToken, "Unauthorized"));
        }
        Ok(())
    }
}

/// Token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let value = header?.trim();
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Comparison time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
