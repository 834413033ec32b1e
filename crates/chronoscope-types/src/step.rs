//! Step records and the state they carry.
//!
//! A [`Step`] is one recorded simulation timestep: the resulting
//! [`StateSnapshot`], the normalized [`AuditRecord`] of what changed, and
//! the time it was recorded. Steps are keyed by `timestep` and are only
//! ever replaced wholesale, never edited field by field.
//!
//! Collaborators hand over the looser [`StepPayload`] wire form; a payload
//! becomes a `Step` only after validation in `chronoscope-core`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::EntityId;

/// Weighted adjacency between named nodes: `source -> target -> weight`.
pub type WeightedAdjacency = BTreeMap<String, BTreeMap<String, f64>>;

/// Full simulation state after a timestep.
///
/// Entity states are arbitrary nested JSON; the engine never assumes a
/// schema beyond what a query path asks for. All maps are ordered so that
/// iteration (and therefore aggregate summation) is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct StateSnapshot {
    /// Per-entity state keyed by entity id.
    #[serde(default)]
    pub entities: BTreeMap<EntityId, serde_json::Value>,
    /// Named weighted adjacency matrices (trade flows, alliances, ...).
    #[serde(default)]
    pub matrices: BTreeMap<String, WeightedAdjacency>,
    /// Named global scalar series values at this timestep.
    #[serde(default)]
    pub scalar_series: BTreeMap<String, f64>,
}

impl StateSnapshot {
    /// Look up one entity's state.
    pub fn entity(&self, id: &str) -> Option<&serde_json::Value> {
        self.entities.get(id)
    }
}

/// One field mutation recorded by a reducer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct FieldChange {
    /// Dot-delimited path of the mutated field (e.g. `FR.macro.inflation`).
    pub path: String,
    /// Value before the reducer ran.
    pub old_value: serde_json::Value,
    /// Value after the reducer ran.
    pub new_value: serde_json::Value,
    /// Name of the reducer that made the change.
    pub reducer_name: String,
}

/// Normalized change-log of a single step.
///
/// Every collection is always present (possibly empty) once a record has
/// been through normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct AuditRecord {
    /// Reducers in the order they executed.
    #[serde(default)]
    pub reducer_sequence: Vec<String>,
    /// Field mutations in the order they were recorded.
    #[serde(default)]
    pub field_changes: Vec<FieldChange>,
    /// Identifiers of triggers that fired during the step.
    #[serde(default)]
    pub triggers_fired: Vec<String>,
    /// Error messages raised by reducers during the step.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// One validated simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Step {
    /// Timestep number; unique within a timeline.
    pub timestep: u64,
    /// State after the step was applied.
    pub state: StateSnapshot,
    /// Normalized audit trail. Absent only for a synthesized bootstrap step.
    #[serde(default)]
    pub audit: Option<AuditRecord>,
    /// When the step was recorded (or ingested, if the backend omitted it).
    pub created_at: DateTime<Utc>,
}

/// Raw step as delivered by a collaborator, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct StepPayload {
    /// Timestep number; required and non-negative for a valid step.
    #[serde(default)]
    pub timestep: Option<i64>,
    /// Resulting state; an absent state is treated as empty.
    #[serde(default)]
    pub state: Option<StateSnapshot>,
    /// Raw, unnormalized audit payload.
    #[serde(default)]
    pub audit: Option<serde_json::Value>,
    /// Recording time, if the backend supplied one.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_deserializes_with_missing_sections() {
        let json = r#"{"entities": {"FR": {"macro": {"inflation": 0.03}}}}"#;
        let snapshot: StateSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.entities.len(), 1);
        assert!(snapshot.matrices.is_empty());
        assert!(snapshot.scalar_series.is_empty());
        assert!(snapshot.entity("FR").is_some());
        assert!(snapshot.entity("DE").is_none());
    }

    #[test]
    fn payload_accepts_camel_case_fields() {
        let json = r#"{
            "timestep": 4,
            "state": {"scalarSeries": {"oil": 81.5}},
            "audit": {"reducerSequence": ["trade"]},
            "createdAt": "2024-03-01T12:00:00Z"
        }"#;
        let payload: StepPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.timestep, Some(4));
        let state = payload.state.unwrap();
        assert_eq!(state.scalar_series.get("oil").copied(), Some(81.5));
        assert!(payload.audit.is_some());
        assert!(payload.created_at.is_some());
    }

    #[test]
    fn payload_tolerates_missing_timestep() {
        let payload: StepPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(payload.timestep, None);
        assert_eq!(payload.state, None);
    }

    #[test]
    fn step_serializes_camel_case() {
        let step = Step {
            timestep: 1,
            state: StateSnapshot::default(),
            audit: Some(AuditRecord::default()),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&step).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.pointer("/audit/reducerSequence").is_some());
        assert!(value.pointer("/state/scalarSeries").is_some());
    }
}
