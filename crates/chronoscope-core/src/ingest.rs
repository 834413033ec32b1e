//! Validation of raw step payloads into [`Step`] records.
//!
//! Runs before anything reaches the reconciler: a payload without a usable
//! timestep is rejected here, at the call site, and never merged.

use chrono::{DateTime, Utc};
use chronoscope_types::{StateSnapshot, Step, StepPayload};

use crate::audit;
use crate::error::ValidationError;

/// Convert a raw timestep into a step key.
///
/// # Errors
///
/// Returns [`ValidationError::MissingTimestep`] or
/// [`ValidationError::NegativeTimestep`].
pub fn timestep_of(raw: Option<i64>) -> Result<u64, ValidationError> {
    let timestep = raw.ok_or(ValidationError::MissingTimestep)?;
    u64::try_from(timestep).map_err(|_err| ValidationError::NegativeTimestep { timestep })
}

/// Validate a payload into a step, stamping `received_at` when the backend
/// did not record a creation time.
///
/// A missing state is treated as empty and a missing audit normalizes to
/// the empty record, so only synthesized bootstrap steps ever lack one.
///
/// # Errors
///
/// Returns a [`ValidationError`] when the timestep is missing or negative.
pub fn validate_step(
    payload: StepPayload,
    received_at: DateTime<Utc>,
) -> Result<Step, ValidationError> {
    let timestep = timestep_of(payload.timestep)?;
    let audit = payload
        .audit
        .as_ref()
        .map_or_else(Default::default, audit::normalize);

    Ok(Step {
        timestep,
        state: payload.state.unwrap_or_default(),
        audit: Some(audit),
        created_at: payload.created_at.unwrap_or(received_at),
    })
}

/// Build the stand-in step used when a scenario has a current state but no
/// recorded history. It has no audit trail.
pub const fn synthesize_bootstrap(
    timestep: u64,
    state: StateSnapshot,
    created_at: DateTime<Utc>,
) -> Step {
    Step {
        timestep,
        state,
        audit: None,
        created_at,
    }
}
