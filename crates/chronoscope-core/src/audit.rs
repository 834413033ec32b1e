//! Audit model: normalization and summaries of per-step change-logs.
//!
//! Backends emit audit payloads of varying completeness. [`normalize`]
//! turns whatever arrived into an [`AuditRecord`] whose collections are
//! always present, so nothing downstream has to handle "absent". The
//! queries in [`AuditQuery`] and [`summarize`] are pure functions of the
//! record.

use std::collections::BTreeSet;

use chronoscope_types::{AuditRecord, FieldChange};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Counts describing one audit record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    /// Number of reducers that ran.
    pub reducer_count: usize,
    /// Number of recorded field changes.
    pub change_count: usize,
    /// Number of triggers that fired.
    pub trigger_count: usize,
    /// Number of reducer errors.
    pub error_count: usize,
}

/// Normalize a raw audit payload.
///
/// Missing collections become empty, both `camelCase` and `snake_case`
/// keys are accepted, and non-string identifiers are coerced to strings.
/// A non-object payload (including `null`) yields the empty record.
pub fn normalize(raw: &Value) -> AuditRecord {
    let Some(object) = raw.as_object() else {
        return AuditRecord::default();
    };

    AuditRecord {
        reducer_sequence: string_list(object, &["reducerSequence", "reducer_sequence"]),
        field_changes: collection(object, &["fieldChanges", "field_changes"])
            .iter()
            .filter_map(field_change)
            .collect(),
        triggers_fired: string_list(object, &["triggersFired", "triggers_fired"]),
        errors: string_list(object, &["errors"]),
    }
}

/// Count the entries of each collection in a record.
pub fn summarize(record: &AuditRecord) -> AuditSummary {
    AuditSummary {
        reducer_count: record.reducer_sequence.len(),
        change_count: record.field_changes.len(),
        trigger_count: record.triggers_fired.len(),
        error_count: record.errors.len(),
    }
}

/// Read-only queries over a normalized record.
pub trait AuditQuery {
    /// Changes whose path equals `prefix` or is nested beneath it.
    fn changes_under(&self, prefix: &str) -> Vec<&FieldChange>;

    /// Changes made by the named reducer.
    fn changes_by(&self, reducer: &str) -> Vec<&FieldChange>;

    /// Distinct changed paths, sorted.
    fn touched_paths(&self) -> BTreeSet<&str>;

    /// Whether any reducer reported an error.
    fn has_errors(&self) -> bool;
}

impl AuditQuery for AuditRecord {
    fn changes_under(&self, prefix: &str) -> Vec<&FieldChange> {
        self.field_changes
            .iter()
            .filter(|change| path_is_under(&change.path, prefix))
            .collect()
    }

    fn changes_by(&self, reducer: &str) -> Vec<&FieldChange> {
        self.field_changes
            .iter()
            .filter(|change| change.reducer_name == reducer)
            .collect()
    }

    fn touched_paths(&self) -> BTreeSet<&str> {
        self.field_changes
            .iter()
            .map(|change| change.path.as_str())
            .collect()
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

fn path_is_under(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// First present collection among `keys`; anything that is not an array
/// counts as empty.
fn collection<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| object.get(*key))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn string_list(object: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    collection(object, keys)
        .iter()
        .filter(|value| !value.is_null())
        .map(coerce_to_string)
        .collect()
}

fn field_change(raw: &Value) -> Option<FieldChange> {
    let object = raw.as_object()?;
    let path = object.get("path").map(coerce_to_string)?;
    let pick = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| object.get(*key))
            .cloned()
            .unwrap_or(Value::Null)
    };

    Some(FieldChange {
        path,
        old_value: pick(&["oldValue", "old_value"]),
        new_value: pick(&["newValue", "new_value"]),
        reducer_name: ["reducerName", "reducer_name", "reducer"]
            .iter()
            .find_map(|key| object.get(*key))
            .map(coerce_to_string)
            .unwrap_or_default(),
    })
}

/// Render an identifier-ish JSON value as a string.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(object) => ["message", "name", "id"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .map_or_else(|| value.to_string(), ToOwned::to_owned),
        // Numbers, booleans, null and arrays use their compact JSON text.
        other => other.to_string(),
    }
}
