//! Raw event record: the immutable source of truth stored in the day log.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::day::EventTime;
use crate::event::NormalizedEvent;
use crate::keys::DimensionValues;
use crate::limits::{MAX_EVENT_TS, MILLIS_THRESHOLD};

/// Field order used when appending to the log.
pub const RAW_FIELDS: [&str; 12] = [
    "event",
    "event_id",
    "anon_id",
    "ts",
    "camera_brand",
    "camera_model",
    "language",
    "app_version",
    "os",
    "city",
    "country",
    "ingested_at",
];

/// One log entry. Every field is a raw, un-encoded string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEventRecord {
    pub event: String,
    pub event_id: String,
    pub anon_id: String,
    pub ts: String,
    pub camera_brand: String,
    pub camera_model: String,
    pub language: String,
    pub app_version: String,
    pub os: String,
    pub city: String,
    pub country: String,
    pub ingested_at: String,
}

impl RawEventRecord {
    pub fn from_event(event: &NormalizedEvent, ingested_at: DateTime<Utc>) -> Self {
        Self {
            event: event.event.clone(),
            event_id: event.event_id.clone(),
            anon_id: event.anon_id.clone(),
            ts: event.ts.to_string(),
            camera_brand: event.camera_brand.clone(),
            camera_model: event.camera_model.clone(),
            language: event.language.clone(),
            app_version: event.app_version.clone(),
            os: event.os.clone(),
            city: event.city.clone(),
            country: event.country.clone(),
            ingested_at: ingested_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Flattened `(field, value)` pairs in [`RAW_FIELDS`] order.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        RAW_FIELDS
            .iter()
            .map(|name| (name.to_string(), self.field(name).to_string()))
            .collect()
    }

    /// Rebuild a record from log fields. Unknown fields are ignored and
    /// missing ones read as empty.
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut record = Self::default();
        for (name, value) in fields {
            let slot = match name.as_str() {
                "event" => &mut record.event,
                "event_id" => &mut record.event_id,
                "anon_id" => &mut record.anon_id,
                "ts" => &mut record.ts,
                "camera_brand" => &mut record.camera_brand,
                "camera_model" => &mut record.camera_model,
                "language" => &mut record.language,
                "app_version" => &mut record.app_version,
                "os" => &mut record.os,
                "city" => &mut record.city,
                "country" => &mut record.country,
                "ingested_at" => &mut record.ingested_at,
                _ => continue,
            };
            *slot = value;
        }
        record
    }

    fn field(&self, name: &str) -> &str {
        match name {
            "event" => &self.event,
            "event_id" => &self.event_id,
            "anon_id" => &self.anon_id,
            "ts" => &self.ts,
            "camera_brand" => &self.camera_brand,
            "camera_model" => &self.camera_model,
            "language" => &self.language,
            "app_version" => &self.app_version,
            "os" => &self.os,
            "city" => &self.city,
            "country" => &self.country,
            "ingested_at" => &self.ingested_at,
            _ => "",
        }
    }

    /// Event time in seconds, or `None` for anything not a finite positive
    /// number. Millisecond values are accepted for older records.
    pub fn timestamp(&self) -> Option<i64> {
        let raw = self.ts.trim().parse::<f64>().ok()?;
        if !raw.is_finite() || raw <= 0.0 {
            return None;
        }
        let secs = if raw >= MILLIS_THRESHOLD { raw / 1000.0 } else { raw };
        let secs = secs.floor();
        (secs >= 1.0 && secs <= MAX_EVENT_TS as f64).then_some(secs as i64)
    }

    pub fn event_time(&self) -> Option<EventTime> {
        EventTime::from_timestamp(self.timestamp()?)
    }

    /// Normalized dimension values at the given hour.
    pub fn dimension_values(&self, hour: &str) -> DimensionValues {
        DimensionValues::new(
            &self.city,
            &self.country,
            &self.camera_brand,
            &self.camera_model,
            &self.language,
            hour,
        )
    }
}
