//! Operator request bodies and query parameters.

use serde::Deserialize;
use validator::Validate;

use crate::day::resolve_day_range;
use crate::error::{Error, Result};
use crate::limits::{DEFAULT_STATS_DAYS, MAX_STATS_DAYS};

/// Body of `POST /telemetry/rebuild`. An empty body is a dry run of nothing
/// and fails day resolution.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RebuildRequest {
    pub start_day: Option<String>,
    pub end_day: Option<String>,
    pub day: Option<String>,
    pub dry_run: Option<bool>,
    pub apply: Option<bool>,
    pub reset_day_keys: Option<bool>,
    /// Must match limits::MIN_REBUILD_PAGE_SIZE / MAX_REBUILD_PAGE_SIZE.
    #[validate(range(min = 50, max = 5000))]
    pub page_size: Option<usize>,
}

impl RebuildRequest {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let request: Self = parse_body(body)?;
        request
            .validate()
            .map_err(|e| Error::validation(format!("Invalid rebuild request: {}", e)))?;
        Ok(request)
    }

    pub fn days(&self) -> Result<Vec<String>> {
        resolve_days(&self.start_day, &self.end_day, &self.day)
    }

    /// Dry run unless `apply` is true or `dry_run` is explicitly false.
    pub fn apply(&self) -> bool {
        self.apply == Some(true) || self.dry_run == Some(false)
    }

    pub fn reset_day_keys(&self) -> bool {
        self.reset_day_keys.unwrap_or(false)
    }
}

/// Legacy migration modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationMode {
    /// Union the flat all-time sets into each requested day.
    #[default]
    LegacySnapshotCopy,
    /// Recompute all-time counters from day counters.
    TotalCounters,
}

impl MigrationMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "" | "legacy-snapshot-copy" => Ok(Self::LegacySnapshotCopy),
            "total-counters" => Ok(Self::TotalCounters),
            other => Err(Error::validation(format!("Unsupported mode '{}'", other))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LegacySnapshotCopy => "legacy-snapshot-copy",
            Self::TotalCounters => "total-counters",
        }
    }
}

/// Body of `POST /telemetry/migrate`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MigrateRequest {
    pub mode: Option<String>,
    pub start_day: Option<String>,
    pub end_day: Option<String>,
    pub day: Option<String>,
    pub dry_run: Option<bool>,
}

impl MigrateRequest {
    pub fn parse(body: &[u8]) -> Result<Self> {
        parse_body(body)
    }

    pub fn mode(&self) -> Result<MigrationMode> {
        MigrationMode::parse(self.mode.as_deref().unwrap_or_default())
    }

    pub fn days(&self) -> Result<Vec<String>> {
        resolve_days(&self.start_day, &self.end_day, &self.day)
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run != Some(false)
    }
}

/// Query of `GET /telemetry/stats`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub day: Option<String>,
    /// Parsed leniently; anything unparseable falls back to the default.
    pub days: Option<String>,
    pub token: Option<String>,
}

impl StatsQuery {
    /// Day window length, clamped to 1..=30.
    pub fn window(&self) -> usize {
        self.days
            .as_deref()
            .and_then(|d| d.trim().parse::<i64>().ok())
            .map(|d| d.clamp(1, MAX_STATS_DAYS as i64) as usize)
            .unwrap_or(DEFAULT_STATS_DAYS)
    }

    /// A single explicit day, validated.
    pub fn single_day(&self) -> Result<Option<String>> {
        match self.day.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(day) => Ok(resolve_day_range(Some(day), None)?.into_iter().next()),
            None => Ok(None),
        }
    }
}

fn parse_body<T>(body: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| Error::validation(format!("Invalid JSON: {}", e)))
}

fn resolve_days(
    start: &Option<String>,
    end: &Option<String>,
    day: &Option<String>,
) -> Result<Vec<String>> {
    let start = start.as_deref().or(day.as_deref());
    let end = end.as_deref().or(day.as_deref());
    resolve_day_range(start, end)
}
