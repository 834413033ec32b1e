//! Integration tests for the timeline controller.
//!
//! The controller runs against a scripted backend wrapping the in-memory
//! fixture API. Individual calls can be held open on a `Notify` gate to
//! reproduce interleavings between bootstrap, advance and push, or made
//! to fail outright.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chronoscope_client::{
    Applied, Fixture, FocusPolicy, InMemorySimulationApi, ScenarioFixture, SimulationApi,
    TimelineConfig, TimelineController, TimelineError, TimelineSnapshot, TransportError,
};
use chronoscope_core::reconcile::is_ordered;
use chronoscope_types::{
    EntityId, PushEvent, ScenarioDetail, ScenarioId, ScenarioSummary, StateSnapshot, StepPayload,
    TimelineStatus,
};
use futures::channel::mpsc;
use serde_json::json;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedApi {
    inner: InMemorySimulationApi,
    gates: Mutex<BTreeMap<String, Arc<Notify>>>,
    fail_requests: AtomicBool,
}

impl ScriptedApi {
    fn new(scenarios: Vec<ScenarioFixture>) -> Self {
        Self {
            inner: InMemorySimulationApi::new(Fixture {
                scenarios,
                triggers: Vec::new(),
            }),
            ..Self::default()
        }
    }

    /// Hold calls matching `key` until the returned gate is notified.
    fn gate(&self, key: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(key.to_owned(), Arc::clone(&gate));
        gate
    }

    fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    async fn pass(&self, key: String) -> Result<(), TransportError> {
        let gate = self.gates.lock().unwrap().get(&key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(TransportError::Request {
                message: format!("{key}: connection refused"),
            });
        }
        Ok(())
    }
}

impl SimulationApi for ScriptedApi {
    async fn fetch_scenario_summaries(&self) -> Result<Vec<ScenarioSummary>, TransportError> {
        self.pass("summaries".to_owned()).await?;
        self.inner.fetch_scenario_summaries().await
    }

    async fn fetch_scenario_detail(
        &self,
        scenario: &ScenarioId,
    ) -> Result<ScenarioDetail, TransportError> {
        self.pass(format!("detail:{scenario}")).await?;
        self.inner.fetch_scenario_detail(scenario).await
    }

    async fn post_step(&self, scenario: &ScenarioId) -> Result<StepPayload, TransportError> {
        self.pass(format!("post:{scenario}")).await?;
        self.inner.post_step(scenario).await
    }

    async fn fetch_step_at(
        &self,
        scenario: &ScenarioId,
        timestep: u64,
    ) -> Result<StepPayload, TransportError> {
        self.pass(format!("step:{scenario}:{timestep}")).await?;
        self.inner.fetch_step_at(scenario, timestep).await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn payload(timestep: i64, gdp: f64) -> StepPayload {
    let mut state = StateSnapshot::default();
    state
        .entities
        .insert(EntityId::new("FR"), json!({"macro": {"gdp": gdp}}));
    StepPayload {
        timestep: Some(timestep),
        state: Some(state),
        audit: Some(json!({"reducerSequence": ["growth"]})),
        created_at: None,
    }
}

fn scenario(id: &str, history: &[i64], pending: &[i64]) -> ScenarioFixture {
    ScenarioFixture {
        id: ScenarioId::new(id),
        name: id.to_uppercase(),
        description: None,
        detail: ScenarioDetail {
            current_timestep: history.iter().max().copied(),
            current_state: None,
            history: history.iter().map(|t| payload(*t, 1.0)).collect(),
        },
        pending: pending.iter().map(|t| payload(*t, 1.0)).collect(),
    }
}

fn controller(
    api: ScriptedApi,
    policy: FocusPolicy,
) -> (Arc<TimelineController<ScriptedApi>>, Arc<ScriptedApi>) {
    let api = Arc::new(api);
    let config = TimelineConfig {
        focus_policy: policy,
        ..TimelineConfig::default()
    };
    (TimelineController::new(Arc::clone(&api), config), api)
}

fn timesteps(snapshot: &TimelineSnapshot) -> Vec<u64> {
    snapshot.steps().iter().map(|s| s.timestep).collect()
}

fn push(id: &str, timestep: u64) -> PushEvent {
    PushEvent {
        scenario_id: ScenarioId::new(id),
        timestep,
    }
}

/// Yield until `pred` holds for the current snapshot.
async fn wait_until<F>(controller: &TimelineController<ScriptedApi>, pred: F)
where
    F: Fn(&TimelineSnapshot) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !pred(&controller.current()) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_orders_history_and_focuses_newest() {
    let (ctl, _) = controller(
        ScriptedApi::new(vec![scenario("eu", &[3, 1, 2, 2], &[])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");

    assert_eq!(ctl.bootstrap(&id).await.unwrap(), Applied::Merged);

    let snap = ctl.current();
    assert_eq!(timesteps(&snap), vec![1, 2, 3]);
    assert_eq!(snap.cursor(), Some(2));
    assert_eq!(snap.status(), TimelineStatus::Idle);
    assert_eq!(snap.scenario(), Some(&id));
}

#[tokio::test]
async fn bootstrap_without_history_synthesizes_one_step() {
    let mut fixture = scenario("eu", &[], &[]);
    fixture.detail.current_timestep = Some(7);
    fixture.detail.current_state = Some(StateSnapshot::default());
    let (ctl, _) = controller(ScriptedApi::new(vec![fixture]), FocusPolicy::NonStealing);

    ctl.bootstrap(&ScenarioId::new("eu")).await.unwrap();

    let snap = ctl.current();
    assert_eq!(timesteps(&snap), vec![7]);
    assert!(snap.focused().unwrap().audit.is_none());
}

#[tokio::test]
async fn stale_bootstrap_is_discarded_after_scenario_switch() {
    let api = ScriptedApi::new(vec![scenario("a", &[1, 2, 3], &[]), scenario("b", &[10, 11], &[])]);
    let gate_a = api.gate("detail:a");
    let (ctl, _) = controller(api, FocusPolicy::NonStealing);

    let slow = {
        let ctl = Arc::clone(&ctl);
        tokio::spawn(async move { ctl.bootstrap(&ScenarioId::new("a")).await })
    };
    wait_until(&ctl, |s| {
        s.scenario() == Some(&ScenarioId::new("a")) && s.status() == TimelineStatus::Loading
    })
    .await;

    assert_eq!(
        ctl.bootstrap(&ScenarioId::new("b")).await.unwrap(),
        Applied::Merged
    );
    gate_a.notify_one();

    assert_eq!(slow.await.unwrap().unwrap(), Applied::Discarded);
    let snap = ctl.current();
    assert_eq!(snap.scenario(), Some(&ScenarioId::new("b")));
    assert_eq!(timesteps(&snap), vec![10, 11]);
    assert_eq!(snap.status(), TimelineStatus::Idle);
}

#[tokio::test]
async fn reactivating_same_scenario_discards_earlier_response() {
    let api = ScriptedApi::new(vec![scenario("a", &[1, 2], &[])]);
    let gate = api.gate("detail:a");
    let (ctl, _) = controller(api, FocusPolicy::NonStealing);
    let (_tx, rx) = mpsc::unbounded::<PushEvent>();

    let first = {
        let ctl = Arc::clone(&ctl);
        tokio::spawn(async move { ctl.bootstrap(&ScenarioId::new("a")).await })
    };
    wait_until(&ctl, |s| s.status() == TimelineStatus::Loading).await;

    let second = {
        let ctl = Arc::clone(&ctl);
        tokio::spawn(async move { ctl.activate(ScenarioId::new("a"), rx).await })
    };
    // Both calls wait on the same gate; release them one at a time.
    gate.notify_one();
    gate.notify_one();

    let mut outcomes = vec![first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
    outcomes.sort_by_key(|a| a.is_merged());
    assert_eq!(outcomes, vec![Applied::Discarded, Applied::Merged]);
    assert_eq!(timesteps(&ctl.current()), vec![1, 2]);
}

#[tokio::test]
async fn transport_failure_leaves_timeline_untouched() {
    let (ctl, api) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1, 2], &[3])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();
    ctl.set_cursor(0);
    let before = ctl.current();

    api.fail_requests(true);
    let err = ctl.advance(&id).await.unwrap_err();
    assert!(matches!(err, TimelineError::Transport(TransportError::Request { .. })));
    let err = ctl.bootstrap(&id).await.unwrap_err();
    assert!(matches!(err, TimelineError::Transport(_)));

    let after = ctl.current();
    assert_eq!(timesteps(&after), timesteps(&before));
    assert_eq!(after.cursor(), Some(0));
    assert_eq!(after.status(), TimelineStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn hung_backend_times_out() {
    let api = ScriptedApi::new(vec![scenario("eu", &[1], &[])]);
    let _never = api.gate("detail:eu");
    let api = Arc::new(api);
    let config = TimelineConfig {
        fetch_timeout_ms: 50,
        ..TimelineConfig::default()
    };
    let ctl = TimelineController::new(api, config);

    let err = ctl.bootstrap(&ScenarioId::new("eu")).await.unwrap_err();
    assert_eq!(
        err,
        TimelineError::Transport(TransportError::Timeout {
            operation: "fetch_scenario_detail",
            timeout_ms: 50,
        })
    );
    assert_eq!(ctl.current().status(), TimelineStatus::Idle);
    assert!(ctl.current().is_empty());
}

// ---------------------------------------------------------------------------
// Advance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn advance_always_focuses_new_step() {
    let (ctl, _) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1, 2, 3], &[4])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();
    ctl.set_cursor(0);

    assert_eq!(ctl.advance(&id).await.unwrap(), Applied::Merged);

    let snap = ctl.current();
    assert_eq!(timesteps(&snap), vec![1, 2, 3, 4]);
    assert_eq!(snap.focused_timestep(), Some(4));
}

#[tokio::test]
async fn advance_rejects_step_without_timestep() {
    let mut fixture = scenario("eu", &[1], &[]);
    fixture.pending.push_back(StepPayload::default());
    let (ctl, _) = controller(ScriptedApi::new(vec![fixture]), FocusPolicy::NonStealing);
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();

    let err = ctl.advance(&id).await.unwrap_err();
    assert!(matches!(err, TimelineError::Validation(_)));
    assert_eq!(timesteps(&ctl.current()), vec![1]);
    assert_eq!(ctl.current().status(), TimelineStatus::Idle);
}

#[tokio::test]
async fn advance_for_inactive_scenario_is_dropped() {
    let (ctl, api) = controller(
        ScriptedApi::new(vec![scenario("a", &[1], &[]), scenario("b", &[1], &[2])]),
        FocusPolicy::NonStealing,
    );
    ctl.bootstrap(&ScenarioId::new("a")).await.unwrap();

    let applied = ctl.advance(&ScenarioId::new("b")).await.unwrap();
    assert_eq!(applied, Applied::Discarded);
    assert_eq!(api.inner.pending_len(&ScenarioId::new("b")), 1);
}

#[tokio::test]
async fn listeners_see_loading_then_idle() {
    let (ctl, _) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1], &[2])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = ctl.subscribe(move |snap| {
        sink.lock().unwrap().push((snap.status(), snap.len()));
    });
    ctl.advance(&id).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![(TimelineStatus::Loading, 1), (TimelineStatus::Idle, 2)]
    );
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

#[tokio::test]
async fn push_does_not_steal_focus_from_older_step() {
    let (ctl, api) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1, 2, 3, 4], &[])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();
    ctl.seek(2);
    api.inner.record_step(&id, payload(5, 9.0)).unwrap();

    assert_eq!(ctl.on_push(push("eu", 5)).await.unwrap(), Applied::Merged);

    let snap = ctl.current();
    assert_eq!(timesteps(&snap), vec![1, 2, 3, 4, 5]);
    assert_eq!(snap.focused_timestep(), Some(2));
    assert_eq!(snap.status(), TimelineStatus::Idle);
}

#[tokio::test]
async fn push_follows_tip_when_already_there() {
    let (ctl, api) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1, 2], &[])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();
    api.inner.record_step(&id, payload(3, 1.0)).unwrap();

    ctl.on_push(push("eu", 3)).await.unwrap();
    assert_eq!(ctl.current().focused_timestep(), Some(3));
}

#[tokio::test]
async fn push_during_advance_merges_without_touching_status() {
    let api = ScriptedApi::new(vec![scenario("eu", &[1, 2], &[4])]);
    let gate = api.gate("post:eu");
    let (ctl, api) = controller(api, FocusPolicy::NonStealing);
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();
    api.inner.record_step(&id, payload(3, 1.0)).unwrap();

    let advance = {
        let ctl = Arc::clone(&ctl);
        let id = id.clone();
        tokio::spawn(async move { ctl.advance(&id).await })
    };
    wait_until(&ctl, |s| s.status() == TimelineStatus::Loading).await;

    assert_eq!(ctl.on_push(push("eu", 3)).await.unwrap(), Applied::Merged);
    let during = ctl.current();
    assert_eq!(during.status(), TimelineStatus::Loading);
    assert!(during.step_at(3).is_some());

    gate.notify_one();
    assert_eq!(advance.await.unwrap().unwrap(), Applied::Merged);

    let snap = ctl.current();
    assert_eq!(timesteps(&snap), vec![1, 2, 3, 4]);
    assert_eq!(snap.focused_timestep(), Some(4));
    assert_eq!(snap.status(), TimelineStatus::Idle);
}

#[tokio::test]
async fn follow_newest_policy_moves_scrubbing_cursor() {
    let (ctl, api) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1, 2, 3], &[])]),
        FocusPolicy::FollowNewest,
    );
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();
    ctl.set_cursor(0);
    api.inner.record_step(&id, payload(4, 1.0)).unwrap();

    ctl.on_push(push("eu", 4)).await.unwrap();
    assert_eq!(ctl.current().focused_timestep(), Some(4));
}

#[tokio::test]
async fn out_of_order_pushes_stay_sorted_and_unique() {
    let (ctl, api) = controller(
        ScriptedApi::new(vec![scenario("eu", &[5], &[])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();
    for t in [2, 9, 1, 7] {
        api.inner.record_step(&id, payload(t, 1.0)).unwrap();
    }

    for t in [9_u64, 2, 7, 2, 1, 9, 5] {
        ctl.on_push(push("eu", t)).await.unwrap();
        assert!(is_ordered(ctl.current().steps()));
    }
    assert_eq!(timesteps(&ctl.current()), vec![1, 2, 5, 7, 9]);
}

#[tokio::test]
async fn duplicate_push_is_idempotent() {
    let (ctl, api) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1], &[])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");
    ctl.bootstrap(&id).await.unwrap();
    api.inner.record_step(&id, payload(2, 4.2)).unwrap();

    ctl.on_push(push("eu", 2)).await.unwrap();
    let once = ctl.current();
    ctl.on_push(push("eu", 2)).await.unwrap();
    let twice = ctl.current();

    assert_eq!(timesteps(&once), timesteps(&twice));
    assert_eq!(
        once.step_at(2).unwrap().state,
        twice.step_at(2).unwrap().state
    );
    assert_eq!(once.cursor(), twice.cursor());
}

#[tokio::test]
async fn push_for_other_scenario_is_ignored() {
    let (ctl, _) = controller(
        ScriptedApi::new(vec![scenario("a", &[1], &[]), scenario("b", &[1, 2], &[])]),
        FocusPolicy::NonStealing,
    );
    ctl.bootstrap(&ScenarioId::new("a")).await.unwrap();
    let before = ctl.current();

    assert_eq!(ctl.on_push(push("b", 2)).await.unwrap(), Applied::Discarded);
    assert!(Arc::ptr_eq(&before, &ctl.current()));
}

#[tokio::test]
async fn push_resolving_after_deactivation_is_discarded() {
    let api = ScriptedApi::new(vec![scenario("eu", &[1], &[])]);
    api.inner
        .record_step(&ScenarioId::new("eu"), payload(2, 1.0))
        .unwrap();
    let gate = api.gate("step:eu:2");
    let (ctl, _) = controller(api, FocusPolicy::NonStealing);
    ctl.bootstrap(&ScenarioId::new("eu")).await.unwrap();

    let pending = {
        let ctl = Arc::clone(&ctl);
        tokio::spawn(async move { ctl.on_push(push("eu", 2)).await })
    };
    tokio::task::yield_now().await;
    ctl.deactivate();
    gate.notify_one();

    assert_eq!(pending.await.unwrap().unwrap(), Applied::Discarded);
    assert!(ctl.current().is_empty());
    assert_eq!(ctl.current().scenario(), None);
}

#[tokio::test]
async fn push_stream_feeds_active_scenario() {
    let (ctl, api) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1, 2], &[])]),
        FocusPolicy::NonStealing,
    );
    let id = ScenarioId::new("eu");
    let (tx, rx) = mpsc::unbounded();

    ctl.activate(id.clone(), rx).await.unwrap();
    assert!(ctl.is_connected());

    api.inner.record_step(&id, payload(3, 1.0)).unwrap();
    tx.unbounded_send(push("other", 3)).unwrap();
    tx.unbounded_send(push("eu", 3)).unwrap();
    wait_until(&ctl, |s| s.len() == 3).await;
    assert_eq!(ctl.current().focused_timestep(), Some(3));

    ctl.deactivate();
    assert!(!ctl.is_connected());
    assert!(ctl.current().is_empty());
}

// ---------------------------------------------------------------------------
// Navigation and observers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cursor_moves_clamp_into_range() {
    let (ctl, _) = controller(
        ScriptedApi::new(vec![scenario("eu", &[10, 20, 30], &[])]),
        FocusPolicy::NonStealing,
    );
    ctl.set_cursor(5);
    assert_eq!(ctl.current().cursor(), None);

    ctl.bootstrap(&ScenarioId::new("eu")).await.unwrap();
    ctl.set_cursor(100);
    assert_eq!(ctl.current().cursor(), Some(2));
    ctl.next();
    assert_eq!(ctl.current().cursor(), Some(2));
    ctl.previous();
    ctl.previous();
    ctl.previous();
    assert_eq!(ctl.current().cursor(), Some(0));

    ctl.seek(25);
    assert_eq!(ctl.current().focused_timestep(), Some(20));
    ctl.seek(3);
    assert_eq!(ctl.current().focused_timestep(), Some(10));
    ctl.focus_latest();
    assert_eq!(ctl.current().focused_timestep(), Some(30));
}

#[tokio::test]
async fn unsubscribe_stops_notifications() {
    let (ctl, _) = controller(
        ScriptedApi::new(vec![scenario("eu", &[1, 2, 3], &[])]),
        FocusPolicy::NonStealing,
    );
    ctl.bootstrap(&ScenarioId::new("eu")).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let subscription = ctl.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    ctl.set_cursor(0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // No change, no notification.
    ctl.set_cursor(0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    subscription.unsubscribe();
    ctl.set_cursor(2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenarios_lists_backend_summaries() {
    let (ctl, _) = controller(
        ScriptedApi::new(vec![scenario("a", &[1, 4], &[]), scenario("b", &[], &[])]),
        FocusPolicy::NonStealing,
    );
    let summaries = ctl.scenarios().await.unwrap();
    let latest: Vec<Option<u64>> = summaries.iter().map(|s| s.current_timestep).collect();
    assert_eq!(latest, vec![Some(4), None]);
}
