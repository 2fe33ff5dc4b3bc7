//! Size limits and fixed constants shared by ingestion, rebuild and reporting.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so the rebuild page size bounds are duplicated in `request.rs`. Keep both
//! in sync when modifying.

// === Batch Limits ===

/// Maximum request body size in bytes (1MB).
pub const MAX_BATCH_SIZE_BYTES: usize = 1024 * 1024;

/// Maximum events per batch.
pub const MAX_BATCH_EVENTS: usize = 1000;

// === Event Field Limits (chars) ===

/// Anonymous user id max length.
pub const MAX_ANON_ID_LEN: usize = 64;

/// Client-supplied event id max length.
pub const MAX_EVENT_ID_LEN: usize = 128;

/// Free-text device attributes are truncated to this length before storage.
pub const MAX_ATTRIBUTE_LEN: usize = 128;

/// Key segments are capped at this many characters before encoding.
pub const MAX_KEY_PART_CHARS: usize = 64;

// === Timestamps ===

/// Timestamps at or above this value are milliseconds.
pub const MILLIS_THRESHOLD: f64 = 1e12;

/// Latest accepted event time (9999-12-31T23:59:59Z).
pub const MAX_EVENT_TS: i64 = 253_402_300_799;

// === Rebuild ===

/// Longest day range a single rebuild or migration request may cover.
pub const MAX_REBUILD_DAYS: usize = 31;

/// Raw log page size bounds for replay.
pub const MIN_REBUILD_PAGE_SIZE: usize = 50;
pub const MAX_REBUILD_PAGE_SIZE: usize = 5000;
pub const DEFAULT_REBUILD_PAGE_SIZE: usize = 500;

/// Commands per write round trip during rebuild.
pub const REBUILD_WRITE_CHUNK: usize = 200;

/// Keys per DEL round trip when resetting a day namespace.
pub const DELETE_CHUNK: usize = 200;

/// Commands per round trip for the legacy snapshot copy.
pub const MIGRATE_WRITE_CHUNK: usize = 120;

/// SCAN COUNT hint.
pub const SCAN_COUNT: usize = 1000;

/// Keys per MGET round trip.
pub const MGET_CHUNK: usize = 200;

/// Rebuild lock expiry, in case the holder dies mid-apply.
pub const REBUILD_LOCK_TTL_SECS: u64 = 900;

// === Reporting ===

/// Default and maximum day window for the stats endpoint.
pub const DEFAULT_STATS_DAYS: usize = 7;
pub const MAX_STATS_DAYS: usize = 30;
