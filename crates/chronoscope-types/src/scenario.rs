//! Scenario-level payloads exchanged with the simulation backend.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::ScenarioId;
use crate::step::{StateSnapshot, StepPayload};

/// Short listing entry for a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ScenarioSummary {
    /// Scenario identifier.
    pub id: ScenarioId,
    /// Display name.
    pub name: String,
    /// Latest timestep the backend has computed, if any.
    #[serde(default)]
    pub current_timestep: Option<u64>,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Scenario detail used to bootstrap a timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct ScenarioDetail {
    /// Timestep of the current state, if the backend reports one.
    #[serde(default)]
    pub current_timestep: Option<i64>,
    /// Current state, present even when no history has been recorded.
    #[serde(default)]
    pub current_state: Option<StateSnapshot>,
    /// Recorded history, in any order.
    #[serde(default)]
    pub history: Vec<StepPayload>,
}

/// Push notification announcing that a step is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct PushEvent {
    /// Scenario the step belongs to.
    pub scenario_id: ScenarioId,
    /// Timestep of the announced step.
    pub timestep: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn detail_defaults_to_empty_history() {
        let detail: ScenarioDetail =
            serde_json::from_str(r#"{"currentTimestep": 3, "currentState": {}}"#).unwrap();
        assert_eq!(detail.current_timestep, Some(3));
        assert!(detail.current_state.is_some());
        assert!(detail.history.is_empty());
    }

    #[test]
    fn push_event_wire_format() {
        let event: PushEvent =
            serde_json::from_str(r#"{"scenarioId": "s-1", "timestep": 5}"#).unwrap();
        assert_eq!(event.scenario_id.as_str(), "s-1");
        assert_eq!(event.timestep, 5);
    }
}
