//! One-off migrations from the flat, non-day-partitioned key layout.

use std::collections::BTreeMap;

use engine_core::keys::{self, CounterNamespace, Scope};
use engine_core::limits::{MIGRATE_WRITE_CHUNK, REBUILD_WRITE_CHUNK};
use engine_core::{MigrationMode, Result, RetentionPolicy};
use kv_store::{ops, unique, Command, SharedStore};
use serde::Serialize;
use tracing::info;

/// Attached to every snapshot-copy response.
pub const LEGACY_SNAPSHOT_WARNING: &str = "Legacy snapshot copy: every requested day receives the \
     same flat all-time sets, which does not reproduce the true historical per-day distribution.";

/// Flat sets found in the store.
#[derive(Debug, Clone, Default)]
pub struct LegacySnapshot {
    /// `telemetry:unique:all` has members.
    pub all: bool,
    pub scopes: BTreeMap<Scope, Vec<String>>,
}

impl LegacySnapshot {
    pub fn counts(&self) -> LegacyKeyCounts {
        let count = |scope| self.scopes.get(&scope).map_or(0, Vec::len);
        LegacyKeyCounts {
            all: u64::from(self.all),
            city: count(Scope::City),
            brand: count(Scope::Brand),
            model: count(Scope::Model),
            lang: count(Scope::Language),
            country: count(Scope::Country),
        }
    }

    /// Day sets written per day: `unique:all` plus one per flat scope set.
    pub fn sets_per_day(&self) -> usize {
        1 + self.scopes.values().map(Vec::len).sum::<usize>()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LegacyKeyCounts {
    pub all: u64,
    pub city: usize,
    pub brand: usize,
    pub model: usize,
    pub lang: usize,
    pub country: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigratedSummary {
    pub days: usize,
    pub writes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotMigration {
    pub mode: &'static str,
    pub dry_run: bool,
    pub warning: &'static str,
    pub days: Vec<String>,
    pub legacy_key_counts: LegacyKeyCounts,
    pub planned_write_sets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrated: Option<MigratedSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalsMigration {
    pub mode: &'static str,
    pub dry_run: bool,
    pub scanned_keys: usize,
    pub total_keys: usize,
    /// Planned all-time values, keyed by counter key.
    pub totals: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writes: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MigrationReport {
    Snapshot(SnapshotMigration),
    Totals(TotalsMigration),
}

/// Backfills the day-partitioned layout from legacy keys.
pub struct LegacyMigrator {
    store: SharedStore,
    retention: RetentionPolicy,
}

impl LegacyMigrator {
    pub fn new(store: SharedStore, retention: RetentionPolicy) -> Self {
        Self { store, retention }
    }

    pub async fn run(
        &self,
        mode: MigrationMode,
        days: Vec<String>,
        dry_run: bool,
    ) -> Result<MigrationReport> {
        match mode {
            MigrationMode::LegacySnapshotCopy => self
                .snapshot_copy(days, dry_run)
                .await
                .map(MigrationReport::Snapshot),
            MigrationMode::TotalCounters => {
                self.total_counters(dry_run).await.map(MigrationReport::Totals)
            }
        }
    }

    pub async fn collect_legacy(&self) -> Result<LegacySnapshot> {
        let store = self.store.as_ref();
        let all = unique::set_cardinality(store, &keys::legacy_unique_all_key()).await? > 0;

        let mut scopes = BTreeMap::new();
        for scope in Scope::ALL {
            let found = ops::scan_keys(store, &keys::legacy_unique_pattern(scope)).await?;
            let found: Vec<String> = found
                .into_iter()
                .filter(|k| keys::split_legacy_unique_key(k, scope).is_some())
                .collect();
            scopes.insert(scope, found);
        }
        Ok(LegacySnapshot { all, scopes })
    }

    /// Union every flat set into the matching day set of each day. Existing
    /// day members are kept.
    pub async fn snapshot_copy(&self, days: Vec<String>, dry_run: bool) -> Result<SnapshotMigration> {
        let legacy = self.collect_legacy().await?;
        let mut report = SnapshotMigration {
            mode: MigrationMode::LegacySnapshotCopy.as_str(),
            dry_run,
            warning: LEGACY_SNAPSHOT_WARNING,
            legacy_key_counts: legacy.counts(),
            planned_write_sets: days.len() * legacy.sets_per_day(),
            days,
            migrated: None,
        };
        if dry_run {
            return Ok(report);
        }

        let mut writes = 0;
        for day in &report.days {
            let commands = snapshot_commands(day, &legacy, self.retention.unique_ttl_secs());
            writes += ops::run_chunked(self.store.as_ref(), commands, MIGRATE_WRITE_CHUNK).await?;
        }
        info!(days = report.days.len(), writes, "Legacy snapshot copied into day sets");

        report.migrated = Some(MigratedSummary {
            days: report.days.len(),
            writes,
        });
        Ok(report)
    }

    /// Recompute all-time counters by summing every day counter.
    pub async fn total_counters(&self, dry_run: bool) -> Result<TotalsMigration> {
        let store = self.store.as_ref();
        let day_keys = ops::scan_keys(store, &keys::day_counter_pattern("*")).await?;
        let counts = ops::mget_counts(store, &day_keys).await?;
        let totals = sum_totals(day_keys.iter().map(String::as_str).zip(counts));

        let mut report = TotalsMigration {
            mode: MigrationMode::TotalCounters.as_str(),
            dry_run,
            scanned_keys: day_keys.len(),
            total_keys: totals.len(),
            totals,
            writes: None,
        };
        if dry_run {
            return Ok(report);
        }

        let commands = report
            .totals
            .iter()
            .map(|(key, value)| Command::set(key.clone(), value))
            .collect();
        let writes = ops::run_chunked(store, commands, REBUILD_WRITE_CHUNK).await?;
        info!(scanned = report.scanned_keys, writes, "All-time counters recomputed");
        report.writes = Some(writes);
        Ok(report)
    }
}

fn snapshot_commands(day: &str, legacy: &LegacySnapshot, unique_ttl: Option<u64>) -> Vec<Command> {
    let mut commands = Vec::new();
    let mut push = |destination: String, source: String| {
        commands.push(Command::SUnionStore {
            keys: vec![destination.clone(), source],
            destination: destination.clone(),
        });
        if let Some(ttl) = unique_ttl {
            commands.push(Command::expire(destination, ttl));
        }
    };

    if legacy.all {
        push(keys::day_unique_all_key(day), keys::legacy_unique_all_key());
    }
    for (scope, flat_keys) in &legacy.scopes {
        for flat in flat_keys {
            let Some(value) = keys::split_legacy_unique_key(flat, *scope) else {
                continue;
            };
            push(keys::day_unique_scope_key(day, *scope, value), flat.clone());
        }
    }
    commands
}

/// All-time counter values from `(day counter key, count)` pairs.
///
/// City×brand, city×model, model, language and country carry over one to
/// one. City, brand and the overall total are derived from city×brand so
/// they stay consistent with it. Hour counters have no all-time form.
fn sum_totals<'a, I>(entries: I) -> BTreeMap<String, u64>
where
    I: IntoIterator<Item = (&'a str, u64)>,
{
    let namespace = keys::total_namespace();
    let mut totals: BTreeMap<String, u64> = BTreeMap::new();
    let mut add = |path: String, count: u64| {
        *totals.entry(keys::counter_key(&namespace, &path)).or_default() += count;
    };

    for (key, count) in entries {
        if count == 0 {
            continue;
        }
        let Some(parsed) = keys::parse_counter_key(key) else {
            continue;
        };
        if !matches!(parsed.namespace, CounterNamespace::Day(_)) {
            continue;
        }

        let path = parsed
            .segments
            .iter()
            .map(|(segment, value)| {
                let sentinel = Scope::from_segment(segment).map_or(keys::UNKNOWN, |s| s.sentinel());
                format!("{}:{}", segment, keys::normalize_key_part(value, sentinel))
            })
            .collect::<Vec<_>>()
            .join(":");

        match parsed.shape().as_slice() {
            ["city", "brand"] => {
                let (Some(city), Some(brand)) = (parsed.value("city"), parsed.value("brand")) else {
                    continue;
                };
                add(
                    format!("city:{}", keys::normalize_key_part(city, keys::UNKNOWN)),
                    count,
                );
                add(
                    format!("brand:{}", keys::normalize_key_part(brand, keys::OTHER)),
                    count,
                );
                add(String::new(), count);
                add(path, count);
            }
            ["city", "model"] | ["model"] | ["lang"] | ["country"] => add(path, count),
            _ => {}
        }
    }
    totals
}
