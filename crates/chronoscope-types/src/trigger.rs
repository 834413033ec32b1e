//! Persisted trigger drafts.
//!
//! Drafts are produced by an external authoring surface. The engine only
//! reads `condition.when`, which is the exact string handed to the
//! condition evaluator; `action` is carried through untouched.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// When a trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TriggerCondition {
    /// Boolean condition expression.
    pub when: String,
    /// Fire at most once.
    #[serde(default)]
    pub once: bool,
}

/// A trigger as stored by the authoring surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TriggerDraft {
    /// Trigger name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Firing condition.
    pub condition: TriggerCondition,
    /// Opaque action payload.
    #[serde(default)]
    pub action: serde_json::Value,
    /// Number of turns after which the trigger stops being evaluated.
    #[serde(default)]
    pub expires_after_turns: Option<u64>,
}
