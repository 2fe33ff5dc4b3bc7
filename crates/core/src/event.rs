//! Open-event payload parsing, validation and normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::day::EventTime;
use crate::error::{Error, Result, ValidationErrorCode};
use crate::keys::{OTHER, UNKNOWN};
use crate::limits::{
    MAX_ANON_ID_LEN, MAX_ATTRIBUTE_LEN, MAX_EVENT_ID_LEN, MAX_EVENT_TS, MILLIS_THRESHOLD,
};

/// The only event type accepted.
pub const OPEN_EVENT: &str = "open";

/// Sentinel for unknown app version and os.
pub const UNKNOWN_LOWER: &str = "unknown";

/// Namespace for derived event ids.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f0c_7a5e_2d1b_4c8e_9a3f_51d2_e7b4_c019);

/// Why a single event was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventValidationError {
    #[error("Invalid payload: expected a JSON object")]
    NotAnObject,
    #[error("Invalid event")]
    InvalidEvent,
    #[error("Invalid anon_id")]
    InvalidAnonId,
    #[error("Invalid event_id")]
    InvalidEventId,
    #[error("Invalid ts")]
    InvalidTimestamp,
}

impl EventValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &'static str {
        match self {
            Self::NotAnObject => "event",
            Self::InvalidEvent => "event",
            Self::InvalidAnonId => "anon_id",
            Self::InvalidEventId => "event_id",
            Self::InvalidTimestamp => "ts",
        }
    }
}

/// Per-item rejection reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    pub index: usize,
    pub field: &'static str,
    pub message: String,
}

impl ItemError {
    pub fn new(index: usize, error: &EventValidationError) -> Self {
        Self {
            index,
            field: error.field(),
            message: error.to_string(),
        }
    }
}

/// Request body: a single event object or `{ "events": [...] }`.
#[derive(Debug, Clone)]
pub struct IngestPayload {
    pub items: Vec<Value>,
    /// True for the `{ "events": [...] }` form.
    pub batch: bool,
}

impl IngestPayload {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| {
            Error::validation_code(
                ValidationErrorCode::InvalidFormat,
                format!("Invalid JSON: {}", e),
            )
        })?;

        match value {
            Value::Object(mut obj) => match obj.remove("events") {
                Some(Value::Array(items)) if !items.is_empty() => Ok(Self { items, batch: true }),
                Some(Value::Array(_)) => Err(Error::validation_code(
                    ValidationErrorCode::InvalidFormat,
                    "events must not be empty",
                )),
                Some(_) => Err(Error::validation_code(
                    ValidationErrorCode::InvalidFormat,
                    "events must be an array",
                )),
                None => Ok(Self {
                    items: vec![Value::Object(obj)],
                    batch: false,
                }),
            },
            _ => Err(Error::validation_code(
                ValidationErrorCode::InvalidFormat,
                "Invalid payload: expected an event object or {\"events\": [...]}",
            )),
        }
    }
}

/// Server-resolved location. Raw values; encoding happens at key build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub country: String,
}

impl Location {
    pub fn new(city: &str, country: &str) -> Self {
        Self {
            city: clean_attribute(city, UNKNOWN),
            country: clean_attribute(country, UNKNOWN),
        }
    }

    pub fn is_unknown_city(&self) -> bool {
        self.city == UNKNOWN
    }
}

impl Default for Location {
    fn default() -> Self {
        Self {
            city: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
        }
    }
}

/// A validated open event ready for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub event: String,
    pub event_id: String,
    pub anon_id: String,
    /// Unix seconds.
    pub ts: i64,
    pub camera_brand: String,
    pub camera_model: String,
    pub language: String,
    pub app_version: String,
    pub os: String,
    pub city: String,
    pub country: String,
    pub time: EventTime,
}

impl NormalizedEvent {
    /// Validate one payload item. Client-supplied city/country are ignored.
    pub fn from_value(
        value: &Value,
        now: DateTime<Utc>,
    ) -> std::result::Result<Self, EventValidationError> {
        let obj = value.as_object().ok_or(EventValidationError::NotAnObject)?;

        let event = text_field(obj, "event");
        if event != OPEN_EVENT {
            return Err(EventValidationError::InvalidEvent);
        }

        let anon_id = text_field(obj, "anon_id");
        if anon_id.is_empty() || anon_id.chars().count() > MAX_ANON_ID_LEN {
            return Err(EventValidationError::InvalidAnonId);
        }

        let ts = normalize_timestamp(obj.get("ts"), now)?;
        let time = EventTime::from_timestamp(ts).ok_or(EventValidationError::InvalidTimestamp)?;

        let camera_brand = clean_attribute(&text_field(obj, "camera_brand"), OTHER);
        let camera_model = clean_attribute(&text_field(obj, "camera_model"), UNKNOWN);
        let language = clean_attribute(&text_field(obj, "language"), UNKNOWN);
        let app_version = clean_attribute(&text_field(obj, "app_version"), UNKNOWN_LOWER);
        let os = clean_attribute(&text_field(obj, "os"), UNKNOWN_LOWER);

        let supplied_id = text_field(obj, "event_id");
        let event_id = if supplied_id.is_empty() {
            derive_event_id(&[
                &anon_id,
                &event,
                &ts.to_string(),
                &camera_brand,
                &camera_model,
                &language,
                &app_version,
                &os,
            ])
        } else {
            supplied_id
        };
        if event_id.chars().count() > MAX_EVENT_ID_LEN {
            return Err(EventValidationError::InvalidEventId);
        }

        let location = Location::default();
        Ok(Self {
            event,
            event_id,
            anon_id,
            ts,
            camera_brand,
            camera_model,
            language,
            app_version,
            os,
            city: location.city,
            country: location.country,
            time,
        })
    }

    pub fn with_location(mut self, location: &Location) -> Self {
        self.city = location.city.clone();
        self.country = location.country.clone();
        self
    }
}

/// Validate every item before anything is written.
pub fn validate_items(
    items: &[Value],
    now: DateTime<Utc>,
) -> std::result::Result<Vec<NormalizedEvent>, Vec<ItemError>> {
    let mut events = Vec::with_capacity(items.len());
    let mut errors = Vec::new();

    for (index, item) in items.iter().enumerate() {
        match NormalizedEvent::from_value(item, now) {
            Ok(event) => events.push(event),
            Err(e) => errors.push(ItemError::new(index, &e)),
        }
    }

    if errors.is_empty() {
        Ok(events)
    } else {
        Err(errors)
    }
}

/// Seconds from a JSON `ts`. Missing, null or blank means `now`.
pub fn normalize_timestamp(
    value: Option<&Value>,
    now: DateTime<Utc>,
) -> std::result::Result<i64, EventValidationError> {
    let raw = match value {
        None | Some(Value::Null) => return Ok(now.timestamp()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(now.timestamp()),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    let raw = raw
        .filter(|v| v.is_finite() && *v > 0.0)
        .ok_or(EventValidationError::InvalidTimestamp)?;
    let secs = if raw >= MILLIS_THRESHOLD { raw / 1000.0 } else { raw };
    let secs = secs.floor();

    if secs < 1.0 || secs > MAX_EVENT_TS as f64 {
        return Err(EventValidationError::InvalidTimestamp);
    }
    Ok(secs as i64)
}

/// Name-based id over the identifying fields, so retries of the same open
/// collapse onto one marker.
pub fn derive_event_id(parts: &[&str]) -> String {
    let name = parts.join("|");
    Uuid::new_v5(&EVENT_ID_NAMESPACE, name.as_bytes()).to_string()
}

/// String view of a loosely typed field. Missing and null read as empty.
fn text_field(obj: &Map<String, Value>, name: &str) -> String {
    match obj.get(name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn clean_attribute(value: &str, sentinel: &str) -> String {
    let capped: String = value.trim().chars().take(MAX_ATTRIBUTE_LEN).collect();
    let capped = capped.trim_end();
    if capped.is_empty() {
        sentinel.to_string()
    } else {
        capped.to_string()
    }
}
