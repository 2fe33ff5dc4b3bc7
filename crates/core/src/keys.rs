//! Key scheme shared by ingestion, rebuild, migration and reporting.
//!
//! Layout:
//! - `telemetry:day:<day>:<dimension-path>:event:open`
//! - `telemetry:total:<dimension-path>:event:open`
//! - `telemetry:day:<day>:unique:all`, `telemetry:day:<day>:unique:<scope>:<value>`
//! - `telemetry:unique:all`, `telemetry:unique:<scope>:<value>`
//! - `telemetry:week:<iso-week>:user:<anon_id>`
//! - `telemetry:event:processed:<day>:<event_id>`
//! - `telemetry:raw:day:<day>`
//! - `telemetry:lock:rebuild:<day>`
//!
//! Every value segment goes through [`normalize_key_part`], so segments never
//! contain `:` and splitting a key on `:` is unambiguous.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::event::NormalizedEvent;
use crate::limits::MAX_KEY_PART_CHARS;

pub const KEY_PREFIX: &str = "telemetry";
pub const EVENT_SUFFIX: &str = "event:open";

/// Sentinel for unknown city, country, model and language.
pub const UNKNOWN: &str = "Unknown";
/// Sentinel for unknown camera brand.
pub const OTHER: &str = "Other";

/// Characters left unescaped by JavaScript's `encodeURIComponent`.
const KEY_PART: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Normalize a raw value into a key segment.
///
/// Decodes first so that feeding an already-normalized segment back in is a
/// no-op, then trims, caps at 64 characters, substitutes `sentinel` for empty
/// input and percent-encodes.
pub fn normalize_key_part(value: &str, sentinel: &str) -> String {
    let decoded = decode_key_part(value);
    let capped: String = decoded.trim().chars().take(MAX_KEY_PART_CHARS).collect();
    let capped = capped.trim_end();
    let part = if capped.is_empty() { sentinel } else { capped };
    utf8_percent_encode(part, KEY_PART).to_string()
}

/// Reverse the segment encoding. Input that does not decode to valid UTF-8 is
/// returned unchanged.
pub fn decode_key_part(value: &str) -> String {
    match percent_decode_str(value).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value.to_string(),
    }
}

/// Unique-set scopes below `unique:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    City,
    Brand,
    Model,
    Language,
    Country,
}

impl Scope {
    pub const ALL: [Scope; 5] = [
        Scope::City,
        Scope::Brand,
        Scope::Model,
        Scope::Language,
        Scope::Country,
    ];

    /// Key segment name.
    pub fn segment(&self) -> &'static str {
        match self {
            Self::City => "city",
            Self::Brand => "brand",
            Self::Model => "model",
            Self::Language => "lang",
            Self::Country => "country",
        }
    }

    pub fn sentinel(&self) -> &'static str {
        match self {
            Self::Brand => OTHER,
            _ => UNKNOWN,
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.segment() == segment)
    }

    fn value<'a>(&self, values: &'a DimensionValues) -> &'a str {
        match self {
            Self::City => &values.city,
            Self::Brand => &values.brand,
            Self::Model => &values.model,
            Self::Language => &values.language,
            Self::Country => &values.country,
        }
    }
}

/// Normalized, encoded attribute values of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionValues {
    pub city: String,
    pub country: String,
    pub brand: String,
    pub model: String,
    pub language: String,
    pub hour: String,
}

impl DimensionValues {
    /// Build from raw attribute values, normalizing each with its sentinel.
    pub fn new(
        city: &str,
        country: &str,
        brand: &str,
        model: &str,
        language: &str,
        hour: &str,
    ) -> Self {
        Self {
            city: normalize_key_part(city, UNKNOWN),
            country: normalize_key_part(country, UNKNOWN),
            brand: normalize_key_part(brand, OTHER),
            model: normalize_key_part(model, UNKNOWN),
            language: normalize_key_part(language, UNKNOWN),
            hour: normalize_key_part(hour, UNKNOWN),
        }
    }

    pub fn from_event(event: &NormalizedEvent) -> Self {
        Self::new(
            &event.city,
            &event.country,
            &event.camera_brand,
            &event.camera_model,
            &event.language,
            &event.time.hour,
        )
    }
}

/// One row of the dimension table.
pub struct Dimension {
    pub name: &'static str,
    path: fn(&DimensionValues) -> String,
    /// Written under `telemetry:day:<day>:`.
    pub day: bool,
    /// Written under `telemetry:total:`.
    pub total: bool,
}

impl Dimension {
    pub fn path(&self, values: &DimensionValues) -> String {
        (self.path)(values)
    }
}

fn city_brand_path(v: &DimensionValues) -> String {
    format!("city:{}:brand:{}", v.city, v.brand)
}

fn city_model_path(v: &DimensionValues) -> String {
    format!("city:{}:model:{}", v.city, v.model)
}

fn city_path(v: &DimensionValues) -> String {
    format!("city:{}", v.city)
}

fn brand_path(v: &DimensionValues) -> String {
    format!("brand:{}", v.brand)
}

fn model_path(v: &DimensionValues) -> String {
    format!("model:{}", v.model)
}

fn language_path(v: &DimensionValues) -> String {
    format!("lang:{}", v.language)
}

fn country_path(v: &DimensionValues) -> String {
    format!("country:{}", v.country)
}

fn total_path(_: &DimensionValues) -> String {
    String::new()
}

fn hour_path(v: &DimensionValues) -> String {
    format!("hour:{}", v.hour)
}

/// Counter dimensions, in write order.
pub static DIMENSIONS: &[Dimension] = &[
    Dimension { name: "city_brand", path: city_brand_path, day: true, total: true },
    Dimension { name: "city_model", path: city_model_path, day: true, total: true },
    Dimension { name: "city", path: city_path, day: true, total: true },
    Dimension { name: "brand", path: brand_path, day: true, total: true },
    Dimension { name: "model", path: model_path, day: true, total: true },
    Dimension { name: "language", path: language_path, day: true, total: true },
    Dimension { name: "country", path: country_path, day: true, total: true },
    Dimension { name: "total", path: total_path, day: true, total: true },
    Dimension { name: "hour", path: hour_path, day: true, total: false },
];

/// `telemetry:day:<day>`
pub fn day_namespace(day: &str) -> String {
    format!("{}:day:{}", KEY_PREFIX, day)
}

/// `telemetry:total`
pub fn total_namespace() -> String {
    format!("{}:total", KEY_PREFIX)
}

/// Append the dimension path and event suffix to a namespace.
pub fn counter_key(namespace: &str, path: &str) -> String {
    if path.is_empty() {
        format!("{}:{}", namespace, EVENT_SUFFIX)
    } else {
        format!("{}:{}:{}", namespace, path, EVENT_SUFFIX)
    }
}

pub fn day_counter_keys(day: &str, values: &DimensionValues) -> Vec<String> {
    let namespace = day_namespace(day);
    DIMENSIONS
        .iter()
        .filter(|d| d.day)
        .map(|d| counter_key(&namespace, &d.path(values)))
        .collect()
}

pub fn total_counter_keys(values: &DimensionValues) -> Vec<String> {
    let namespace = total_namespace();
    DIMENSIONS
        .iter()
        .filter(|d| d.total)
        .map(|d| counter_key(&namespace, &d.path(values)))
        .collect()
}

fn unique_keys(namespace: &str, values: &DimensionValues) -> Vec<String> {
    let mut keys = Vec::with_capacity(Scope::ALL.len() + 1);
    keys.push(format!("{}:unique:all", namespace));
    for scope in Scope::ALL {
        keys.push(unique_scope_key(namespace, scope, scope.value(values)));
    }
    keys
}

fn unique_scope_key(namespace: &str, scope: Scope, encoded_value: &str) -> String {
    format!("{}:unique:{}:{}", namespace, scope.segment(), encoded_value)
}

/// `unique:all` followed by one set per scope.
pub fn day_unique_keys(day: &str, values: &DimensionValues) -> Vec<String> {
    unique_keys(&day_namespace(day), values)
}

pub fn total_unique_keys(values: &DimensionValues) -> Vec<String> {
    unique_keys(KEY_PREFIX, values)
}

/// `telemetry:day:<day>:unique:all`
pub fn day_unique_all_key(day: &str) -> String {
    format!("{}:unique:all", day_namespace(day))
}

/// Day unique set for a raw (un-normalized) scope value.
pub fn day_unique_scope_key(day: &str, scope: Scope, value: &str) -> String {
    unique_scope_key(
        &day_namespace(day),
        scope,
        &normalize_key_part(value, scope.sentinel()),
    )
}

/// Flat all-time set, `telemetry:unique:all`.
pub fn legacy_unique_all_key() -> String {
    format!("{}:unique:all", KEY_PREFIX)
}

/// `telemetry:unique:<scope>:*`
pub fn legacy_unique_pattern(scope: Scope) -> String {
    format!("{}:unique:{}:*", KEY_PREFIX, scope.segment())
}

/// Encoded value suffix of a flat unique key for `scope`.
pub fn split_legacy_unique_key(key: &str, scope: Scope) -> Option<&str> {
    let prefix = format!("{}:unique:{}:", KEY_PREFIX, scope.segment());
    key.strip_prefix(prefix.as_str()).filter(|rest| !rest.is_empty() && !rest.contains(':'))
}

pub fn week_user_key(week: &str, anon_id: &str) -> String {
    format!(
        "{}:week:{}:user:{}",
        KEY_PREFIX,
        week,
        normalize_key_part(anon_id, UNKNOWN)
    )
}

pub fn dedupe_key(day: &str, event_id: &str) -> String {
    format!(
        "{}:event:processed:{}:{}",
        KEY_PREFIX,
        day,
        normalize_key_part(event_id, UNKNOWN)
    )
}

pub fn raw_log_key(day: &str) -> String {
    format!("{}:raw:day:{}", KEY_PREFIX, day)
}

pub fn rebuild_lock_key(day: &str) -> String {
    format!("{}:lock:rebuild:{}", KEY_PREFIX, day)
}

/// Everything a rebuild with reset owns for one day.
pub fn day_namespace_pattern(day: &str) -> String {
    format!("{}:*", day_namespace(day))
}

/// Day counters of one day (`day = "*"` for all days).
pub fn day_counter_pattern(day: &str) -> String {
    format!("{}:*:{}", day_namespace(day), EVENT_SUFFIX)
}

pub fn city_brand_pattern(day: &str) -> String {
    format!("{}:city:*:brand:*:{}", day_namespace(day), EVENT_SUFFIX)
}

pub fn hour_pattern(day: &str) -> String {
    format!("{}:hour:*:{}", day_namespace(day), EVENT_SUFFIX)
}

/// Where a counter key lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterNamespace {
    Day(String),
    Total,
}

/// A counter key split into its namespace and decoded `(segment, value)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterKey {
    pub namespace: CounterNamespace,
    pub segments: Vec<(String, String)>,
}

impl CounterKey {
    /// The segment names, e.g. `["city", "brand"]`.
    pub fn shape(&self) -> Vec<&str> {
        self.segments.iter().map(|(s, _)| s.as_str()).collect()
    }

    pub fn value(&self, segment: &str) -> Option<&str> {
        self.segments
            .iter()
            .find(|(s, _)| s == segment)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a day or total counter key. Returns `None` for anything else,
/// including unique sets and markers.
pub fn parse_counter_key(key: &str) -> Option<CounterKey> {
    let rest = key.strip_prefix(KEY_PREFIX)?.strip_prefix(':')?;
    let rest = rest.strip_suffix(EVENT_SUFFIX)?;

    let (namespace, path) = if let Some(after) = rest.strip_prefix("day:") {
        let (day, path) = after.split_once(':')?;
        (CounterNamespace::Day(day.to_string()), path)
    } else if let Some(path) = rest.strip_prefix("total:") {
        (CounterNamespace::Total, path)
    } else {
        return None;
    };

    let parts: Vec<&str> = path.split(':').filter(|p| !p.is_empty()).collect();
    if parts.len() % 2 != 0 {
        return None;
    }
    if parts.first() == Some(&"unique") {
        return None;
    }
    let segments = parts
        .chunks(2)
        .map(|pair| (pair[0].to_string(), decode_key_part(pair[1])))
        .collect();
    Some(CounterKey { namespace, segments })
}

/// Decoded `(city, brand)` of a city×brand day counter.
pub fn parse_city_brand_key(key: &str) -> Option<(String, String)> {
    let parsed = parse_counter_key(key)?;
    if parsed.shape() != ["city", "brand"] {
        return None;
    }
    Some((parsed.value("city")?.to_string(), parsed.value("brand")?.to_string()))
}

/// Hour (0..24) of an hour counter.
pub fn parse_hour_key(key: &str) -> Option<usize> {
    let parsed = parse_counter_key(key)?;
    if parsed.shape() != ["hour"] {
        return None;
    }
    parsed.value("hour")?.parse::<usize>().ok().filter(|h| *h < 24)
}
