//! Shared type definitions for the Chronoscope timeline engine.
//!
//! This crate is the single source of truth for the data model shared by
//! the pure core and the async client. Types defined here flow downstream
//! to `TypeScript` via `ts-rs` for the consuming dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- String newtypes for scenario and entity identifiers
//! - [`step`] -- Steps, state snapshots, audit records and the raw wire payload
//! - [`scenario`] -- Scenario listings, bootstrap detail and push events
//! - [`trigger`] -- Persisted trigger drafts
//! - [`status`] -- Timeline loading status

pub mod ids;
pub mod scenario;
pub mod status;
pub mod step;
pub mod trigger;

// Re-export all public types at crate root for convenience.
pub use ids::{EntityId, ScenarioId};
pub use scenario::{PushEvent, ScenarioDetail, ScenarioSummary};
pub use status::TimelineStatus;
pub use step::{AuditRecord, FieldChange, StateSnapshot, Step, StepPayload, WeightedAdjacency};
pub use trigger::{TriggerCondition, TriggerDraft};
