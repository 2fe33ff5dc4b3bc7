//! UTC day, hour and ISO week helpers.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{Error, Result};
use crate::limits::MAX_REBUILD_DAYS;

static DAY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("invalid day pattern"));

/// Calendar position of an event time, in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTime {
    /// `YYYY-MM-DD`
    pub day: String,
    /// `HH`, zero padded
    pub hour: String,
    /// `YYYY-Www`, ISO week
    pub week: String,
}

impl EventTime {
    /// Returns `None` when the timestamp is outside chrono's range.
    pub fn from_timestamp(ts: i64) -> Option<Self> {
        let time = DateTime::<Utc>::from_timestamp(ts, 0)?;
        Some(Self::from_datetime(&time))
    }

    pub fn from_datetime(time: &DateTime<Utc>) -> Self {
        let iso = time.iso_week();
        Self {
            day: time.format("%Y-%m-%d").to_string(),
            hour: format!("{:02}", time.hour()),
            week: format!("{}-W{:02}", iso.year(), iso.week()),
        }
    }
}

/// Which day a scheduled or cron rebuild targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayScope {
    Today,
    #[default]
    Yesterday,
}

impl DayScope {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            other => Err(Error::validation(format!(
                "scope must be 'today' or 'yesterday', got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Yesterday => "yesterday",
        }
    }

    /// Resolve against `now`.
    pub fn day(&self, now: DateTime<Utc>) -> String {
        let time = match self {
            Self::Today => now,
            Self::Yesterday => now - Duration::days(1),
        };
        time.format("%Y-%m-%d").to_string()
    }
}

/// Parse a strict `YYYY-MM-DD` day.
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    if !DAY_REGEX.is_match(value) {
        return Err(Error::validation(format!(
            "invalid day '{}': expected YYYY-MM-DD",
            value
        )));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| Error::validation(format!("invalid day '{}'", value)))
}

/// Expand an inclusive day range. `end` defaults to `start`.
pub fn resolve_day_range(start: Option<&str>, end: Option<&str>) -> Result<Vec<String>> {
    let start = start
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::validation("start_day or day is required"))?;
    let end = end.map(str::trim).filter(|s| !s.is_empty()).unwrap_or(start);

    let first = parse_day(start)?;
    let last = parse_day(end)?;
    if last < first {
        return Err(Error::validation("end_day must not be before start_day"));
    }

    let span = (last - first).num_days() as usize + 1;
    if span > MAX_REBUILD_DAYS {
        return Err(Error::validation(format!(
            "day range too large: {} days (max {})",
            span, MAX_REBUILD_DAYS
        )));
    }

    Ok(first
        .iter_days()
        .take(span)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect())
}

/// The `count` most recent days ending at `now`, oldest first.
pub fn trailing_days(now: DateTime<Utc>, count: usize) -> Vec<String> {
    (0..count)
        .rev()
        .map(|offset| (now - Duration::days(offset as i64)).format("%Y-%m-%d").to_string())
        .collect()
}
