//! Replaying trigger drafts over a timeline.
//!
//! A draft's `condition.when` is compiled once and evaluated against each
//! step in ascending order. The scan stops at the expiry window or, for
//! `once` triggers, after the first firing. A runtime fault on one step is
//! recorded and the scan moves on.

use std::borrow::Borrow;

use chronoscope_types::{Step, TriggerDraft};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::Condition;
use crate::error::{EvaluationError, ValidationError};

/// A runtime fault raised while evaluating one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFault {
    /// Step the fault occurred on.
    pub timestep: u64,
    /// Rendered error.
    pub message: String,
}

/// Outcome of replaying one draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerReport {
    /// Draft name.
    pub name: String,
    /// Timesteps where the condition held.
    pub fired: Vec<u64>,
    /// Steps whose evaluation faulted.
    pub faults: Vec<StepFault>,
    /// Number of steps evaluated before the scan ended.
    pub evaluated: usize,
    /// Whether the scan ended because the expiry window closed.
    pub expired: bool,
}

/// Check a draft before it is persisted or scanned.
///
/// # Errors
///
/// [`EvaluationError::Rejected`] with
/// [`ValidationError::EmptyTriggerName`] for a blank name, otherwise
/// whatever [`Condition::compile`] reports for `condition.when`.
pub fn validate_draft(draft: &TriggerDraft) -> Result<Condition, EvaluationError> {
    if draft.name.trim().is_empty() {
        return Err(ValidationError::EmptyTriggerName.into());
    }
    Condition::compile(&draft.condition.when)
}

/// Replay a draft over `steps`, which must be ascending by timestep.
///
/// # Errors
///
/// Fails only when the draft itself is invalid; see [`validate_draft`].
pub fn scan<S: Borrow<Step>>(
    draft: &TriggerDraft,
    steps: &[S],
) -> Result<TriggerReport, EvaluationError> {
    let condition = validate_draft(draft)?;
    let mut report = TriggerReport {
        name: draft.name.clone(),
        ..TriggerReport::default()
    };

    let expires_at = steps.first().and_then(|first| {
        draft
            .expires_after_turns
            .map(|turns| Borrow::<Step>::borrow(first).timestep.saturating_add(turns))
    });

    for step in steps {
        let step: &Step = step.borrow();
        if expires_at.is_some_and(|end| step.timestep >= end) {
            report.expired = true;
            break;
        }
        report.evaluated = report.evaluated.saturating_add(1);

        match condition.evaluate(step) {
            Ok(true) => {
                report.fired.push(step.timestep);
                if draft.condition.once {
                    break;
                }
            }
            Ok(false) => {}
            Err(e) => {
                debug!(
                    trigger = %draft.name,
                    timestep = step.timestep,
                    error = %e,
                    "Condition faulted"
                );
                report.faults.push(StepFault {
                    timestep: step.timestep,
                    message: e.to_string(),
                });
            }
        }
    }

    debug!(
        trigger = %draft.name,
        evaluated = report.evaluated,
        fired = report.fired.len(),
        faults = report.faults.len(),
        expired = report.expired,
        "Trigger scan complete"
    );
    Ok(report)
}
