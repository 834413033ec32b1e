//! Cross-entity statistics over nested per-entity fields.
//!
//! A field path is a dot-delimited walk into each entity's JSON state
//! (`macro.inflation`, `military.units.0.strength`). Entities where the
//! path is missing, or resolves to something other than a JSON number, are
//! excluded from the statistic rather than treated as zero.
//!
//! Entities are visited in the map's iteration order, which for the
//! ordered entity map is sorted by id and therefore stable within and
//! across runs.

use std::collections::BTreeMap;

use chronoscope_types::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Summary statistics for one field path across entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    /// Number of qualifying entities.
    pub count: usize,
    /// Sum of qualifying values.
    pub sum: f64,
    /// Arithmetic mean, or `0.0` when no entity qualifies.
    pub mean: f64,
    /// Smallest qualifying value.
    pub min: Option<f64>,
    /// Largest qualifying value.
    pub max: Option<f64>,
}

/// Walk a dot-delimited path into a JSON value.
///
/// Objects are entered by key and arrays by numeric index. An empty path
/// resolves to the value itself; empty segments never match.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| {
        if segment.is_empty() {
            return None;
        }
        match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
    })
}

/// Numeric values of `path` for every qualifying entity, in map order.
pub fn values<'a>(
    entities: &'a BTreeMap<EntityId, Value>,
    path: &'a str,
) -> impl Iterator<Item = f64> + 'a {
    entities
        .values()
        .filter_map(move |state| resolve_path(state, path).and_then(Value::as_f64))
}

/// Mean of `path` across entities; `0.0` when no entity qualifies.
pub fn mean(entities: &BTreeMap<EntityId, Value>, path: &str) -> f64 {
    stats(entities, path).mean
}

/// Sum of `path` across qualifying entities.
pub fn sum(entities: &BTreeMap<EntityId, Value>, path: &str) -> f64 {
    values(entities, path).sum()
}

/// Number of entities where `path` resolves to a number.
pub fn count(entities: &BTreeMap<EntityId, Value>, path: &str) -> usize {
    values(entities, path).count()
}

/// Count, sum, mean, min and max of `path` in a single pass.
pub fn stats(entities: &BTreeMap<EntityId, Value>, path: &str) -> FieldStats {
    let mut out = FieldStats::default();
    // Divisor kept as a float so the mean needs no integer-to-float cast.
    let mut divisor = 0.0_f64;

    for value in values(entities, path) {
        out.count = out.count.saturating_add(1);
        divisor += 1.0;
        out.sum += value;
        out.min = Some(out.min.map_or(value, |m| m.min(value)));
        out.max = Some(out.max.map_or(value, |m| m.max(value)));
    }

    if out.count > 0 {
        out.mean = out.sum / divisor;
    }
    out
}
