//! Pure timeline logic for Chronoscope.
//!
//! Everything in this crate is synchronous and free of I/O. The async
//! controller in `chronoscope-client` owns the mutable timeline and calls
//! into these functions under its lock.
//!
//! # Modules
//!
//! - [`reconcile`] -- Ordered, deduplicated merge of incoming steps.
//! - [`ingest`] -- Validation of raw payloads into [`Step`] records.
//! - [`audit`] -- Audit normalization, summaries and queries.
//! - [`aggregate`] -- Cross-entity statistics over nested field paths.
//! - [`condition`] -- Gate, tokenizer, parser and interpreter for trigger
//!   conditions.
//! - [`trigger`] -- Replaying trigger drafts over a timeline.
//! - [`error`] -- [`ValidationError`] and [`EvaluationError`].
//!
//! [`Step`]: chronoscope_types::Step

pub mod aggregate;
pub mod audit;
pub mod condition;
pub mod error;
pub mod ingest;
pub mod reconcile;
pub mod trigger;

pub use aggregate::FieldStats;
pub use audit::{AuditQuery, AuditSummary};
pub use condition::{Condition, evaluate, validate};
pub use error::{EvaluationError, ValidationError};
pub use reconcile::{Timestepped, reconcile, reconcile_all};
pub use trigger::{StepFault, TriggerReport, scan, validate_draft};
