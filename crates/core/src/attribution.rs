//! Unique-visitor attribution across scopes.
//!
//! Exact per-scope unique counts come from set unions. When a scope has opens
//! but no linkable set (data written before day-partitioned sets existed), its
//! unique count is estimated by distributing the global unique total across
//! the missing scopes in proportion to their opens.

use serde::{Deserialize, Serialize};

/// Where a unique count came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UniqueSource {
    /// Cardinality of a set union.
    Exact,
    /// Heuristic share of the global total.
    Estimated,
    /// Read from the flat all-time sets; not day-accurate.
    LegacySnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueCount {
    pub value: u64,
    pub source: UniqueSource,
}

impl UniqueCount {
    pub fn exact(value: u64) -> Self {
        Self {
            value,
            source: UniqueSource::Exact,
        }
    }

    pub fn estimated(value: u64) -> Self {
        Self {
            value,
            source: UniqueSource::Estimated,
        }
    }

    pub fn legacy(value: u64) -> Self {
        Self {
            value,
            source: UniqueSource::LegacySnapshot,
        }
    }
}

/// Input for one scope value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeObservation {
    pub value: String,
    pub opens: u64,
    /// Cardinality of the scope's set union, when one exists.
    pub exact_unique: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeEstimate {
    pub value: String,
    pub opens: u64,
    pub unique: UniqueCount,
}

/// Fill in unique counts for every observed scope.
///
/// Non-zero exact counts are kept (capped at the scope's opens). Each scope
/// with opens but no exact count gets at least 1; the remaining budget
/// `max(global_total - sum_known, missing)` is split by floor share of opens,
/// never exceeding a scope's opens, and leftover units go one at a time to
/// scopes ordered by opens desc, value asc. Output order matches input order.
pub fn estimate_scope_uniques(
    global_total: u64,
    observations: &[ScopeObservation],
) -> Vec<ScopeEstimate> {
    let mut results: Vec<ScopeEstimate> = observations
        .iter()
        .map(|obs| {
            let unique = match obs.exact_unique {
                Some(n) if n > 0 => UniqueCount::exact(n.min(obs.opens)),
                Some(_) if obs.opens == 0 => UniqueCount::exact(0),
                _ => UniqueCount::estimated(0),
            };
            ScopeEstimate {
                value: obs.value.clone(),
                opens: obs.opens,
                unique,
            }
        })
        .collect();

    let known: u64 = results
        .iter()
        .filter(|r| r.unique.source == UniqueSource::Exact)
        .map(|r| r.unique.value)
        .sum();

    let mut missing: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.unique.source == UniqueSource::Estimated && r.opens > 0)
        .map(|(i, _)| i)
        .collect();
    if missing.is_empty() {
        return results;
    }
    missing.sort_by(|&a, &b| {
        results[b]
            .opens
            .cmp(&results[a].opens)
            .then_with(|| results[a].value.cmp(&results[b].value))
    });

    let missing_count = missing.len() as u64;
    let budget = global_total.saturating_sub(known).max(missing_count);
    for &i in &missing {
        results[i].unique.value = 1;
    }

    let remaining = budget - missing_count;
    let missing_opens: u64 = missing.iter().map(|&i| results[i].opens).sum();
    let mut allocated = 0u64;
    if remaining > 0 && missing_opens > 0 {
        for &i in &missing {
            let headroom = results[i].opens - results[i].unique.value;
            let share = (u128::from(remaining) * u128::from(results[i].opens)
                / u128::from(missing_opens)) as u64;
            let share = share.min(headroom);
            results[i].unique.value += share;
            allocated += share;
        }
    }

    let mut leftover = remaining - allocated;
    while leftover > 0 {
        let mut progressed = false;
        for &i in &missing {
            if leftover == 0 {
                break;
            }
            if results[i].unique.value < results[i].opens {
                results[i].unique.value += 1;
                leftover -= 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    results
}

/// Caveats for a response containing the given sources. Empty when all exact.
pub fn consistency_warnings<I>(sources: I) -> Vec<String>
where
    I: IntoIterator<Item = UniqueSource>,
{
    let mut estimated = false;
    let mut legacy = false;
    for source in sources {
        match source {
            UniqueSource::Exact => {}
            UniqueSource::Estimated => estimated = true,
            UniqueSource::LegacySnapshot => legacy = true,
        }
    }

    let mut warnings = Vec::new();
    if legacy {
        warnings.push(
            "Unique counts marked legacy-snapshot come from the flat all-time sets and are not \
             day-accurate; multi-day totals may double count users."
                .to_string(),
        );
    }
    if estimated {
        warnings.push(
            "Unique counts marked estimated are a proportional share of the global unique total, \
             not exact per-scope counts."
                .to_string(),
        );
    }
    warnings
}
