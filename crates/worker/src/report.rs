//! Read-side aggregation for the stats endpoint.

use std::collections::BTreeMap;

use engine_core::keys::{self, Scope};
use engine_core::{
    consistency_warnings, estimate_scope_uniques, Result, ScopeObservation, UniqueCount,
};
use kv_store::{ops, unique, KvStore};
use serde::Serialize;
use tracing::debug;

/// Totals are keyed by decoded attribute values. Every unique count carries
/// its source; `warnings` is present whenever one of them is not exact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub days: Vec<String>,
    pub city_totals: BTreeMap<String, u64>,
    pub brand_totals: BTreeMap<String, u64>,
    pub city_brand_totals: BTreeMap<String, BTreeMap<String, u64>>,
    pub hour_totals: Vec<u64>,
    pub city_unique_totals: BTreeMap<String, UniqueCount>,
    pub global_unique_total: UniqueCount,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Open totals and unique visitors over `days`.
pub async fn collect_stats(store: &dyn KvStore, days: Vec<String>) -> Result<StatsReport> {
    let mut city_totals: BTreeMap<String, u64> = BTreeMap::new();
    let mut brand_totals: BTreeMap<String, u64> = BTreeMap::new();
    let mut city_brand_totals: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    let mut hour_totals = vec![0u64; 24];

    for day in &days {
        let city_brand_keys = ops::scan_keys(store, &keys::city_brand_pattern(day)).await?;
        let counts = ops::mget_counts(store, &city_brand_keys).await?;
        for (key, count) in city_brand_keys.iter().zip(counts) {
            if count == 0 {
                continue;
            }
            let Some((city, brand)) = keys::parse_city_brand_key(key) else {
                continue;
            };
            *city_totals.entry(city.clone()).or_default() += count;
            *brand_totals.entry(brand.clone()).or_default() += count;
            *city_brand_totals
                .entry(city)
                .or_default()
                .entry(brand)
                .or_default() += count;
        }

        let hour_keys = ops::scan_keys(store, &keys::hour_pattern(day)).await?;
        let counts = ops::mget_counts(store, &hour_keys).await?;
        for (key, count) in hour_keys.iter().zip(counts) {
            if let Some(hour) = keys::parse_hour_key(key) {
                hour_totals[hour] += count;
            }
        }
    }

    let global_unique_total = global_uniques(store, &days).await?;
    let city_unique_totals =
        city_uniques(store, &days, &city_totals, global_unique_total.value).await?;

    let warnings = consistency_warnings(
        std::iter::once(global_unique_total.source)
            .chain(city_unique_totals.values().map(|u| u.source)),
    );
    debug!(
        days = days.len(),
        cities = city_totals.len(),
        global_unique = global_unique_total.value,
        "Stats collected"
    );

    Ok(StatsReport {
        days,
        city_totals,
        brand_totals,
        city_brand_totals,
        hour_totals,
        city_unique_totals,
        global_unique_total,
        warnings,
    })
}

/// Union of the day `unique:all` sets. Falls back to the flat all-time set
/// when no day set in range has members.
async fn global_uniques(store: &dyn KvStore, days: &[String]) -> Result<UniqueCount> {
    let day_keys: Vec<String> = days.iter().map(|d| keys::day_unique_all_key(d)).collect();
    let exact = unique::union_cardinality(store, &day_keys).await?;
    if exact > 0 {
        return Ok(UniqueCount::exact(exact));
    }

    let legacy = unique::set_cardinality(store, &keys::legacy_unique_all_key()).await?;
    if legacy > 0 {
        return Ok(UniqueCount::legacy(legacy));
    }
    Ok(UniqueCount::exact(0))
}

async fn city_uniques(
    store: &dyn KvStore,
    days: &[String],
    city_totals: &BTreeMap<String, u64>,
    global_total: u64,
) -> Result<BTreeMap<String, UniqueCount>> {
    let groups: Vec<Vec<String>> = city_totals
        .keys()
        .map(|city| {
            days.iter()
                .map(|day| keys::day_unique_scope_key(day, Scope::City, city))
                .collect()
        })
        .collect();
    let exact = unique::union_cardinalities(store, groups).await?;

    let observations: Vec<ScopeObservation> = city_totals
        .iter()
        .zip(exact)
        .map(|((city, &opens), n)| ScopeObservation {
            value: city.clone(),
            opens,
            exact_unique: Some(n),
        })
        .collect();

    Ok(estimate_scope_uniques(global_total, &observations)
        .into_iter()
        .map(|e| (e.value, e.unique))
        .collect())
}
