//! Immutable view of a timeline at one instant.

use std::sync::Arc;

use chronoscope_core::reconcile::{self, Timestepped};
use chronoscope_types::{ScenarioId, Step, TimelineStatus};

/// A timeline as observed by readers and listeners.
///
/// Snapshots are never mutated. Every controller mutation builds a new one
/// and swaps it in, so a reader holding an `Arc<TimelineSnapshot>` always
/// sees a consistent ordering, cursor and status. Step bodies are shared
/// between consecutive snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineSnapshot {
    scenario: Option<ScenarioId>,
    steps: Vec<Arc<Step>>,
    cursor: Option<usize>,
    status: TimelineStatus,
}

impl TimelineSnapshot {
    pub(crate) fn empty(scenario: Option<ScenarioId>) -> Self {
        Self {
            scenario,
            ..Self::default()
        }
    }

    /// Active scenario, if any.
    pub const fn scenario(&self) -> Option<&ScenarioId> {
        self.scenario.as_ref()
    }

    /// Steps in ascending timestep order.
    pub fn steps(&self) -> &[Arc<Step>] {
        &self.steps
    }

    /// Index of the focused step; `None` only when the timeline is empty.
    pub const fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Loading status.
    pub const fn status(&self) -> TimelineStatus {
        self.status
    }

    /// The focused step.
    pub fn focused(&self) -> Option<&Arc<Step>> {
        self.cursor.and_then(|index| self.steps.get(index))
    }

    /// Timestep of the focused step.
    pub fn focused_timestep(&self) -> Option<u64> {
        self.focused().map(Timestepped::timestep)
    }

    /// Step with exactly this timestep.
    pub fn step_at(&self, timestep: u64) -> Option<&Arc<Step>> {
        reconcile::locate(&self.steps, timestep).and_then(|index| self.steps.get(index))
    }

    /// Newest step.
    pub fn latest(&self) -> Option<&Arc<Step>> {
        self.steps.last()
    }

    /// Largest known timestep.
    pub fn max_timestep(&self) -> Option<u64> {
        reconcile::max_timestep(&self.steps)
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the timeline has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the cursor is on the newest step.
    pub fn is_at_tip(&self) -> bool {
        self.cursor.is_some() && self.cursor == self.steps.len().checked_sub(1)
    }

    /// Index of the last step, the clamp ceiling for the cursor.
    pub(crate) fn last_index(&self) -> Option<usize> {
        self.steps.len().checked_sub(1)
    }

    pub(crate) fn with_status(&self, status: TimelineStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub(crate) fn with_cursor(&self, cursor: Option<usize>) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }

    pub(crate) fn with_steps(&self, steps: Vec<Arc<Step>>, cursor: Option<usize>) -> Self {
        Self {
            scenario: self.scenario.clone(),
            steps,
            cursor,
            status: self.status,
        }
    }
}

/// Outcome of a controller operation that completed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Applied {
    /// The result was merged into the timeline.
    Merged,
    /// The result belonged to a session that is no longer active and was
    /// dropped.
    Discarded,
}

impl Applied {
    /// Whether the timeline changed.
    pub const fn is_merged(self) -> bool {
        matches!(self, Self::Merged)
    }
}
