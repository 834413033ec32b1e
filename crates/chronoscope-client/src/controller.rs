//! The timeline controller: sole owner and writer of the active timeline.
//!
//! Three asynchronous paths feed steps in (bootstrap, advance and push)
//! and all of them funnel through the pure reconciler under a short write
//! lock. The lock is never held across an `await`; collaborator calls run
//! unlocked and their results are applied only if the session that issued
//! them is still active.
//!
//! # Sessions
//!
//! A session is the active scenario plus an activation epoch. Every
//! scenario switch, re-activation or deactivation starts a new session, and
//! a response carrying an older session token is dropped silently
//! ([`Applied::Discarded`]).
//!
//! # Focus
//!
//! Bootstrap focuses the newest step and advance always focuses the step it
//! created. A pushed step moves the cursor according to the configured
//! [`FocusPolicy`]; when it does not, the cursor stays on the same
//! timestep.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use chronoscope_core::{ingest, reconcile};
use chronoscope_types::{
    PushEvent, ScenarioDetail, ScenarioId, ScenarioSummary, Step, TimelineStatus,
};
use futures::Stream;
use tracing::{debug, info, warn};

use crate::api::SimulationApi;
use crate::config::{FocusPolicy, TimelineConfig};
use crate::connection::PushConnection;
use crate::error::{TimelineError, TransportError};
use crate::observer::{ListenerRegistry, Subscription};
use crate::snapshot::{Applied, TimelineSnapshot};

/// Identifies the activation a request was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    scenario: Option<ScenarioId>,
    epoch: u64,
}

struct Inner {
    session: Session,
    snapshot: Arc<TimelineSnapshot>,
}

/// Owns the timeline for the active scenario.
///
/// Shared as `Arc<TimelineController<A>>`. Readers call [`current`] for an
/// immutable snapshot or [`subscribe`] to be told about every change.
///
/// [`current`]: TimelineController::current
/// [`subscribe`]: TimelineController::subscribe
pub struct TimelineController<A> {
    api: Arc<A>,
    config: TimelineConfig,
    inner: RwLock<Inner>,
    listeners: Arc<ListenerRegistry>,
    connection: Mutex<Option<PushConnection>>,
}

impl<A: SimulationApi> TimelineController<A> {
    /// Create a controller with no active scenario.
    pub fn new(api: Arc<A>, config: TimelineConfig) -> Arc<Self> {
        Arc::new(Self {
            api,
            config,
            inner: RwLock::new(Inner {
                session: Session {
                    scenario: None,
                    epoch: 0,
                },
                snapshot: Arc::new(TimelineSnapshot::default()),
            }),
            listeners: Arc::new(ListenerRegistry::default()),
            connection: Mutex::new(None),
        })
    }

    /// The backend this controller talks to.
    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Configuration in effect.
    pub const fn config(&self) -> &TimelineConfig {
        &self.config
    }

    /// The current immutable snapshot.
    pub fn current(&self) -> Arc<TimelineSnapshot> {
        Arc::clone(&self.read().snapshot)
    }

    /// Register a listener called with every new snapshot.
    ///
    /// Calls arrive one at a time in publication order. A snapshot
    /// published while another thread is delivering is handed to the
    /// listener by that thread.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<TimelineSnapshot>) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    /// Whether a push connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection_slot()
            .as_ref()
            .is_some_and(PushConnection::is_open)
    }

    // ------------------------------------------------------------------
    // Scenario lifecycle
    // ------------------------------------------------------------------

    /// Switch to `scenario`, open its push connection and bootstrap it.
    ///
    /// Always starts a new session, so re-activating the current scenario
    /// also invalidates responses still in flight from the previous
    /// activation.
    ///
    /// # Errors
    ///
    /// See [`TimelineController::bootstrap`]. The connection stays open
    /// when bootstrap fails.
    pub async fn activate<S>(
        self: &Arc<Self>,
        scenario: ScenarioId,
        events: S,
    ) -> Result<Applied, TimelineError>
    where
        S: Stream<Item = PushEvent> + Send + 'static,
    {
        self.switch_to(Some(scenario.clone()));
        let connection = PushConnection::open(Arc::downgrade(self), scenario.clone(), events);
        *self.connection_slot() = Some(connection);
        info!(scenario = %scenario, "Scenario activated");
        self.bootstrap(&scenario).await
    }

    /// Close the push connection and reset to an empty timeline with no
    /// active scenario.
    pub fn deactivate(&self) {
        let previous = self.read().session.scenario.clone();
        self.switch_to(None);
        if let Some(scenario) = previous {
            info!(scenario = %scenario, "Scenario deactivated");
        }
    }

    /// Load a scenario's history into the timeline and focus its newest
    /// step.
    ///
    /// Bootstrapping a scenario other than the active one is a scenario
    /// switch: the previous timeline is discarded first. When the backend
    /// has a current state but no history, a single step without an audit
    /// trail is synthesized. History entries without a usable timestep are
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`TimelineError::Transport`] when the fetch fails or times out and
    /// [`TimelineError::Validation`] when the synthesized step would have a
    /// negative timestep. The timeline is left untouched and the status
    /// returns to idle either way.
    pub async fn bootstrap(&self, scenario: &ScenarioId) -> Result<Applied, TimelineError> {
        if self.read().session.scenario.as_ref() != Some(scenario) {
            self.switch_to(Some(scenario.clone()));
        }
        let token = self.begin_loading("bootstrap");

        let detail = self
            .bounded("fetch_scenario_detail", self.api.fetch_scenario_detail(scenario))
            .await;

        let steps = match detail.map_err(TimelineError::from).and_then(bootstrap_steps) {
            Ok(steps) => steps,
            Err(e) => return self.fail(&token, "bootstrap", e),
        };

        let count = steps.len();
        let applied = self.apply(&token, |snapshot| {
            let merged = reconcile::reconcile_all(snapshot.steps(), steps);
            let cursor = merged.len().checked_sub(1);
            Some(
                snapshot
                    .with_steps(merged, cursor)
                    .with_status(TimelineStatus::Idle),
            )
        });
        if applied.is_merged() {
            info!(scenario = %scenario, steps = count, "Timeline bootstrapped");
        }
        Ok(applied)
    }

    // ------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------

    /// Ask the backend for the next step, merge it and focus it.
    ///
    /// An advance for a scenario that is not active is dropped without
    /// contacting the backend.
    ///
    /// # Errors
    ///
    /// [`TimelineError::Transport`] on fetch failure and
    /// [`TimelineError::Validation`] when the returned step has no usable
    /// timestep. The timeline is left untouched and the status returns to
    /// idle.
    pub async fn advance(&self, scenario: &ScenarioId) -> Result<Applied, TimelineError> {
        if self.read().session.scenario.as_ref() != Some(scenario) {
            debug!(scenario = %scenario, "Advance for inactive scenario dropped");
            return Ok(Applied::Discarded);
        }
        let token = self.begin_loading("advance");

        let payload = self
            .bounded("post_step", self.api.post_step(scenario))
            .await;
        let step = match payload
            .map_err(TimelineError::from)
            .and_then(|p| ingest::validate_step(p, Utc::now()).map_err(TimelineError::from))
        {
            Ok(step) => Arc::new(step),
            Err(e) => return self.fail(&token, "advance", e),
        };

        let timestep = step.timestep;
        let applied = self.apply(&token, |snapshot| {
            let merged = reconcile::reconcile(snapshot.steps(), step);
            let cursor = reconcile::locate(&merged, timestep);
            Some(
                snapshot
                    .with_steps(merged, cursor)
                    .with_status(TimelineStatus::Idle),
            )
        });
        if applied.is_merged() {
            debug!(scenario = %scenario, timestep, "Advanced");
        }
        Ok(applied)
    }

    /// React to a push notification: fetch the announced step and merge it.
    ///
    /// Events for other scenarios are ignored. The status never changes.
    ///
    /// # Errors
    ///
    /// [`TimelineError::Transport`] on fetch failure and
    /// [`TimelineError::Validation`] for a malformed step. The timeline is
    /// left untouched.
    pub async fn on_push(&self, event: PushEvent) -> Result<Applied, TimelineError> {
        let token = self.read().session.clone();
        if token.scenario.as_ref() != Some(&event.scenario_id) {
            debug!(
                scenario = %event.scenario_id,
                timestep = event.timestep,
                "Push for inactive scenario ignored"
            );
            return Ok(Applied::Discarded);
        }

        let payload = self
            .bounded(
                "fetch_step_at",
                self.api.fetch_step_at(&event.scenario_id, event.timestep),
            )
            .await;
        let step = match payload
            .map_err(TimelineError::from)
            .and_then(|p| ingest::validate_step(p, Utc::now()).map_err(TimelineError::from))
        {
            Ok(step) => Arc::new(step),
            Err(e) => {
                warn!(
                    scenario = %event.scenario_id,
                    timestep = event.timestep,
                    error = %e,
                    "Push fetch failed"
                );
                return Err(e);
            }
        };

        let policy = self.config.focus_policy;
        Ok(self.apply(&token, |snapshot| {
            let timestep = step.timestep;
            let merged = reconcile::reconcile(snapshot.steps(), step);
            let cursor = push_cursor(policy, snapshot, &merged, timestep);
            debug!(timestep, cursor = ?cursor, "Merged pushed step");
            Some(snapshot.with_steps(merged, cursor))
        }))
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Focus the step at `index`, clamped into range.
    pub fn set_cursor(&self, index: usize) {
        self.navigate(|snapshot| snapshot.last_index().map(|last| index.min(last)));
    }

    /// Focus the next newer step, if any.
    pub fn next(&self) {
        self.navigate(|snapshot| {
            let last = snapshot.last_index()?;
            Some(snapshot.cursor().map_or(last, |c| c.saturating_add(1).min(last)))
        });
    }

    /// Focus the next older step, if any.
    pub fn previous(&self) {
        self.navigate(|snapshot| {
            let last = snapshot.last_index()?;
            Some(snapshot.cursor().map_or(last, |c| c.saturating_sub(1)))
        });
    }

    /// Focus the newest step.
    pub fn focus_latest(&self) {
        self.navigate(TimelineSnapshot::last_index);
    }

    /// Focus the newest step at or before `timestep`, or the first step if
    /// every step is later.
    pub fn seek(&self, timestep: u64) {
        self.navigate(|snapshot| {
            snapshot.last_index()?;
            Some(reconcile::nearest_at_or_before(snapshot.steps(), timestep).unwrap_or(0))
        });
    }

    /// List the backend's scenarios.
    ///
    /// # Errors
    ///
    /// [`TimelineError::Transport`] when the fetch fails or times out.
    pub async fn scenarios(&self) -> Result<Vec<ScenarioSummary>, TimelineError> {
        Ok(self
            .bounded("fetch_scenario_summaries", self.api.fetch_scenario_summaries())
            .await?)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn connection_slot(&self) -> std::sync::MutexGuard<'_, Option<PushConnection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` under the write lock and publish its snapshot, if any.
    /// The snapshot is queued for listeners under the lock, so delivery
    /// follows publication order; listeners run after the lock is released.
    fn publish<F>(&self, f: F) -> Option<Arc<TimelineSnapshot>>
    where
        F: FnOnce(&mut Session, &TimelineSnapshot) -> Option<TimelineSnapshot>,
    {
        let published = {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let Inner { session, snapshot } = &mut *inner;
            let next = Arc::new(f(session, snapshot)?);
            *snapshot = Arc::clone(&next);
            self.listeners.enqueue(Arc::clone(&next));
            next
        };
        self.listeners.deliver();
        Some(published)
    }

    /// Apply `f` only if `token` is still the active session.
    fn apply<F>(&self, token: &Session, f: F) -> Applied
    where
        F: FnOnce(&TimelineSnapshot) -> Option<TimelineSnapshot>,
    {
        let mut stale = false;
        self.publish(|session, snapshot| {
            if session != token {
                stale = true;
                return None;
            }
            f(snapshot)
        });
        if stale {
            debug!(scenario = ?token.scenario, epoch = token.epoch, "Stale response discarded");
            Applied::Discarded
        } else {
            Applied::Merged
        }
    }

    fn navigate<F>(&self, target: F)
    where
        F: FnOnce(&TimelineSnapshot) -> Option<usize>,
    {
        self.publish(|_, snapshot| {
            let cursor = target(snapshot);
            if cursor == snapshot.cursor() {
                return None;
            }
            debug!(from = ?snapshot.cursor(), to = ?cursor, "Cursor moved");
            Some(snapshot.with_cursor(cursor))
        });
    }

    /// Start a new session for `scenario` with an empty timeline.
    fn switch_to(&self, scenario: Option<ScenarioId>) {
        let replaced = self.connection_slot().take();
        if let Some(connection) = replaced {
            connection.close();
        }
        self.publish(|session, _| {
            session.scenario.clone_from(&scenario);
            session.epoch = session.epoch.saturating_add(1);
            debug!(scenario = ?session.scenario, epoch = session.epoch, "Session started");
            Some(TimelineSnapshot::empty(scenario))
        });
    }

    /// Mark a foreground fetch as started and capture the session token.
    fn begin_loading(&self, operation: &'static str) -> Session {
        let mut token = None;
        self.publish(|session, snapshot| {
            token = Some(session.clone());
            if snapshot.status() == TimelineStatus::Loading {
                warn!(operation, "Foreground call issued while another is loading");
            }
            Some(snapshot.with_status(TimelineStatus::Loading))
        });
        token.unwrap_or_else(|| self.read().session.clone())
    }

    /// Settle a failed foreground fetch: status back to idle for the
    /// issuing session, timeline untouched.
    fn fail(
        &self,
        token: &Session,
        operation: &'static str,
        error: TimelineError,
    ) -> Result<Applied, TimelineError> {
        warn!(scenario = ?token.scenario, operation, error = %error, "Operation failed");
        let _ = self.apply(token, |snapshot| Some(snapshot.with_status(TimelineStatus::Idle)));
        Err(error)
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        tokio::time::timeout(self.config.fetch_timeout(), call)
            .await
            .map_err(|_elapsed| TransportError::Timeout {
                operation,
                timeout_ms: self.config.fetch_timeout_ms,
            })?
    }
}

/// Validated steps for a bootstrap, synthesizing one when only the current
/// state is known.
fn bootstrap_steps(detail: ScenarioDetail) -> Result<Vec<Arc<Step>>, TimelineError> {
    let received_at = Utc::now();
    let mut steps = Vec::with_capacity(detail.history.len());
    for payload in detail.history {
        match ingest::validate_step(payload, received_at) {
            Ok(step) => steps.push(Arc::new(step)),
            Err(e) => warn!(error = %e, "Skipping malformed history entry"),
        }
    }

    if steps.is_empty() {
        if let Some(state) = detail.current_state {
            let timestep = detail
                .current_timestep
                .map_or(Ok(0), |t| ingest::timestep_of(Some(t)))?;
            steps.push(Arc::new(ingest::synthesize_bootstrap(timestep, state, received_at)));
        }
    }
    Ok(steps)
}

/// Cursor after merging a pushed step at `timestep` into `before`.
fn push_cursor(
    policy: FocusPolicy,
    before: &TimelineSnapshot,
    merged: &[Arc<Step>],
    timestep: u64,
) -> Option<usize> {
    let newest = before.max_timestep().is_none_or(|max| timestep >= max);
    let follow = match policy {
        FocusPolicy::NonStealing => newest && (before.is_empty() || before.is_at_tip()),
        FocusPolicy::FollowNewest => newest,
    };
    if follow {
        return reconcile::locate(merged, timestep);
    }
    before
        .focused_timestep()
        .and_then(|focused| reconcile::locate(merged, focused))
        .or_else(|| merged.len().checked_sub(1))
}
