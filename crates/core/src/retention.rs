//! Expiry policy for derived keys, markers and the raw log.

use serde::{Deserialize, Serialize};

const SECS_PER_DAY: u64 = 86_400;

/// TTL settings, all in days except the dedupe window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Day-scoped counters and day unique sets. Never below one day.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,
    /// Day unique sets; 0 means no expiry.
    #[serde(default)]
    pub unique_ttl_days: u64,
    /// Raw event log, independent of counter retention.
    #[serde(default = "default_raw_ttl_days")]
    pub raw_ttl_days: u64,
    /// Weekly per-user usage counters.
    #[serde(default = "default_week_ttl_days")]
    pub week_ttl_days: u64,
    /// Dedupe markers.
    #[serde(default = "default_dedupe_ttl_secs")]
    pub dedupe_ttl_secs: u64,
}

fn default_ttl_days() -> u64 {
    90
}

fn default_raw_ttl_days() -> u64 {
    365
}

fn default_week_ttl_days() -> u64 {
    56
}

fn default_dedupe_ttl_secs() -> u64 {
    172_800
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
            unique_ttl_days: 0,
            raw_ttl_days: default_raw_ttl_days(),
            week_ttl_days: default_week_ttl_days(),
            dedupe_ttl_secs: default_dedupe_ttl_secs(),
        }
    }
}

impl RetentionPolicy {
    /// Expiry of day-scoped counters.
    pub fn counter_ttl_secs(&self) -> u64 {
        self.ttl_days.max(1) * SECS_PER_DAY
    }

    /// Expiry of day unique sets, `None` when they are kept indefinitely.
    pub fn unique_ttl_secs(&self) -> Option<u64> {
        (self.unique_ttl_days > 0).then(|| self.unique_ttl_days * SECS_PER_DAY)
    }

    pub fn raw_ttl_secs(&self) -> u64 {
        self.raw_ttl_days.max(1) * SECS_PER_DAY
    }

    pub fn week_ttl_secs(&self) -> u64 {
        self.week_ttl_days.max(1) * SECS_PER_DAY
    }

    pub fn dedupe_ttl_secs(&self) -> u64 {
        self.dedupe_ttl_secs.max(1)
    }
}
