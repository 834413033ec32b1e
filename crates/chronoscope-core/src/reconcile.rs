//! Ordered, deduplicated merge of incoming steps.
//!
//! Every ingestion path (bootstrap history, advance responses and
//! push-triggered fetches) funnels through [`reconcile`]. The function is
//! pure: it never mutates its input and always returns the same ordering
//! for the same inputs, which is what lets callers re-derive the cursor
//! position after a merge.
//!
//! # Invariants
//!
//! - The output is sorted ascending by timestep.
//! - Timesteps are unique; a duplicate replaces the existing entry in place
//!   (last write wins), even when the content is identical.

use std::sync::Arc;

use chronoscope_types::Step;

/// Anything keyed by a simulation timestep.
pub trait Timestepped {
    /// The timestep key.
    fn timestep(&self) -> u64;
}

impl Timestepped for Step {
    fn timestep(&self) -> u64 {
        self.timestep
    }
}

impl<T: Timestepped + ?Sized> Timestepped for Arc<T> {
    fn timestep(&self) -> u64 {
        (**self).timestep()
    }
}

/// Merge one incoming step into an ordered list.
///
/// Replaces the entry with the same timestep, or inserts at the position
/// that keeps the list ascending. An empty input yields a singleton, and a
/// timestep below the current minimum is prepended.
pub fn reconcile<S>(existing: &[S], incoming: S) -> Vec<S>
where
    S: Timestepped + Clone,
{
    let mut merged = existing.to_vec();
    merge_into(&mut merged, incoming);
    merged
}

/// Merge a batch of steps, in order, into an ordered list.
///
/// Later entries win over earlier ones with the same timestep, so an
/// unsorted history containing duplicates folds into a clean timeline.
pub fn reconcile_all<S, I>(existing: &[S], incoming: I) -> Vec<S>
where
    S: Timestepped + Clone,
    I: IntoIterator<Item = S>,
{
    let mut merged = existing.to_vec();
    for step in incoming {
        merge_into(&mut merged, step);
    }
    merged
}

/// Replace or insert `incoming` in an ordered list the caller owns.
fn merge_into<S: Timestepped>(merged: &mut Vec<S>, incoming: S) {
    match merged.binary_search_by_key(&incoming.timestep(), Timestepped::timestep) {
        Ok(index) => {
            if let Some(slot) = merged.get_mut(index) {
                *slot = incoming;
            }
        }
        Err(index) => merged.insert(index, incoming),
    }
}

/// Index of the step with exactly this timestep.
pub fn locate<S: Timestepped>(steps: &[S], timestep: u64) -> Option<usize> {
    steps
        .binary_search_by_key(&timestep, Timestepped::timestep)
        .ok()
}

/// Index of the latest step whose timestep is at or before `timestep`.
///
/// Returns `None` when every step is later than `timestep` or the list is
/// empty.
pub fn nearest_at_or_before<S: Timestepped>(steps: &[S], timestep: u64) -> Option<usize> {
    match steps.binary_search_by_key(&timestep, Timestepped::timestep) {
        Ok(index) => Some(index),
        Err(insert_at) => insert_at.checked_sub(1),
    }
}

/// Whether `steps` is strictly ascending by timestep (sorted and unique).
pub fn is_ordered<S: Timestepped>(steps: &[S]) -> bool {
    steps
        .windows(2)
        .all(|pair| match pair {
            [a, b] => a.timestep() < b.timestep(),
            _ => true,
        })
}

/// Largest timestep in an ordered list.
pub fn max_timestep<S: Timestepped>(steps: &[S]) -> Option<u64> {
    steps.last().map(Timestepped::timestep)
}
