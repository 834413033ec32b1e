//! Timeline loading status.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Whether a foreground fetch (bootstrap or advance) is in flight.
///
/// Transitions `Idle -> Loading` when a foreground fetch starts and back to
/// `Idle` when it settles, whatever the outcome. Push-triggered fetches
/// never change the status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub enum TimelineStatus {
    /// No foreground fetch in flight.
    #[default]
    Idle,
    /// A bootstrap or advance is in flight.
    Loading,
}

impl TimelineStatus {
    /// Human-readable label for logging.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
        }
    }
}
