//! Simulation backend contract and an in-memory implementation.
//!
//! The controller only ever talks to the backend through
//! [`SimulationApi`]. Step bodies arrive as raw [`StepPayload`]s and are
//! validated by the controller, so an implementation never has to
//! guarantee well-formed timesteps.
//!
//! [`InMemorySimulationApi`] serves a [`Fixture`]: recorded history plus a
//! queue of pending steps that `post_step` releases one at a time.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chronoscope_core::ingest::timestep_of;
use chronoscope_types::{ScenarioDetail, ScenarioId, ScenarioSummary, StepPayload, TriggerDraft};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TransportError;

/// Operations the timeline consumes from the simulation backend.
pub trait SimulationApi: Send + Sync + 'static {
    /// List every scenario the backend knows.
    fn fetch_scenario_summaries(
        &self,
    ) -> impl Future<Output = Result<Vec<ScenarioSummary>, TransportError>> + Send;

    /// Current state and recorded history for one scenario.
    fn fetch_scenario_detail(
        &self,
        scenario: &ScenarioId,
    ) -> impl Future<Output = Result<ScenarioDetail, TransportError>> + Send;

    /// Ask the backend to compute the next step and return it.
    fn post_step(
        &self,
        scenario: &ScenarioId,
    ) -> impl Future<Output = Result<StepPayload, TransportError>> + Send;

    /// Fetch the authoritative body of a step.
    fn fetch_step_at(
        &self,
        scenario: &ScenarioId,
        timestep: u64,
    ) -> impl Future<Output = Result<StepPayload, TransportError>> + Send;
}

/// One scenario as served by [`InMemorySimulationApi`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioFixture {
    /// Scenario identifier.
    pub id: ScenarioId,
    /// Display name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Detail returned by `fetch_scenario_detail`.
    #[serde(default)]
    pub detail: ScenarioDetail,
    /// Steps released one per `post_step` call, in order.
    #[serde(default)]
    pub pending: VecDeque<StepPayload>,
}

/// A set of scenarios plus optional trigger drafts, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Scenarios to serve.
    #[serde(default)]
    pub scenarios: Vec<ScenarioFixture>,
    /// Trigger drafts to replay against the scenarios.
    #[serde(default)]
    pub triggers: Vec<TriggerDraft>,
}

impl Fixture {
    /// Load a fixture from a JSON file.
    ///
    /// # Errors
    ///
    /// [`TransportError::Request`] when the file cannot be read and
    /// [`TransportError::Decode`] when it is not a valid fixture.
    pub fn from_file(path: &Path) -> Result<Self, TransportError> {
        let contents = std::fs::read_to_string(path).map_err(|e| TransportError::Request {
            message: format!("cannot read fixture {}: {e}", path.display()),
        })?;
        Self::parse(&contents)
    }

    /// Parse a fixture from JSON text.
    ///
    /// # Errors
    ///
    /// [`TransportError::Decode`] when the text is not a valid fixture.
    pub fn parse(json: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Fixture-backed [`SimulationApi`].
#[derive(Debug, Default)]
pub struct InMemorySimulationApi {
    scenarios: Mutex<BTreeMap<ScenarioId, ScenarioFixture>>,
}

impl InMemorySimulationApi {
    /// Serve the scenarios of a fixture.
    pub fn new(fixture: Fixture) -> Self {
        Self {
            scenarios: Mutex::new(
                fixture
                    .scenarios
                    .into_iter()
                    .map(|scenario| (scenario.id.clone(), scenario))
                    .collect(),
            ),
        }
    }

    /// Add or replace one scenario.
    pub fn insert(&self, scenario: ScenarioFixture) {
        self.with_scenarios(|scenarios| {
            scenarios.insert(scenario.id.clone(), scenario);
        });
    }

    /// Queue a step to be released by the next `post_step`.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotFound`] for an unknown scenario.
    pub fn queue_step(
        &self,
        scenario: &ScenarioId,
        payload: StepPayload,
    ) -> Result<(), TransportError> {
        self.with_scenario(scenario, |fixture| {
            fixture.pending.push_back(payload);
            Ok(())
        })
    }

    /// Record a step directly into history, as a backend would before
    /// sending a push notification.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotFound`] for an unknown scenario.
    pub fn record_step(
        &self,
        scenario: &ScenarioId,
        payload: StepPayload,
    ) -> Result<(), TransportError> {
        self.with_scenario(scenario, |fixture| {
            record(fixture, payload);
            Ok(())
        })
    }

    /// Number of steps still waiting to be released.
    pub fn pending_len(&self, scenario: &ScenarioId) -> usize {
        self.with_scenarios(|scenarios| scenarios.get(scenario).map_or(0, |s| s.pending.len()))
    }

    fn with_scenarios<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<ScenarioId, ScenarioFixture>) -> R,
    ) -> R {
        let mut guard = self.scenarios.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn with_scenario<R>(
        &self,
        scenario: &ScenarioId,
        f: impl FnOnce(&mut ScenarioFixture) -> Result<R, TransportError>,
    ) -> Result<R, TransportError> {
        self.with_scenarios(|scenarios| match scenarios.get_mut(scenario) {
            Some(fixture) => f(fixture),
            None => Err(not_found(scenario, "scenario record")),
        })
    }
}

impl From<Fixture> for InMemorySimulationApi {
    fn from(fixture: Fixture) -> Self {
        Self::new(fixture)
    }
}

impl SimulationApi for InMemorySimulationApi {
    async fn fetch_scenario_summaries(&self) -> Result<Vec<ScenarioSummary>, TransportError> {
        Ok(self.with_scenarios(|scenarios| {
            scenarios
                .values()
                .map(|fixture| ScenarioSummary {
                    id: fixture.id.clone(),
                    name: fixture.name.clone(),
                    current_timestep: latest_timestep(&fixture.detail),
                    description: fixture.description.clone(),
                })
                .collect()
        }))
    }

    async fn fetch_scenario_detail(
        &self,
        scenario: &ScenarioId,
    ) -> Result<ScenarioDetail, TransportError> {
        self.with_scenario(scenario, |fixture| Ok(fixture.detail.clone()))
    }

    async fn post_step(&self, scenario: &ScenarioId) -> Result<StepPayload, TransportError> {
        self.with_scenario(scenario, |fixture| {
            let payload = fixture
                .pending
                .pop_front()
                .ok_or_else(|| not_found(scenario, "pending step"))?;
            record(fixture, payload.clone());
            debug!(scenario = %scenario, timestep = ?payload.timestep, "Released pending step");
            Ok(payload)
        })
    }

    async fn fetch_step_at(
        &self,
        scenario: &ScenarioId,
        timestep: u64,
    ) -> Result<StepPayload, TransportError> {
        self.with_scenario(scenario, |fixture| {
            fixture
                .detail
                .history
                .iter()
                .rev()
                .find(|payload| timestep_of(payload.timestep).ok() == Some(timestep))
                .cloned()
                .ok_or_else(|| not_found(scenario, &format!("step {timestep}")))
        })
    }
}

fn record(fixture: &mut ScenarioFixture, payload: StepPayload) {
    if payload.timestep >= fixture.detail.current_timestep {
        fixture.detail.current_timestep = payload.timestep;
        if payload.state.is_some() {
            fixture.detail.current_state.clone_from(&payload.state);
        }
    }
    fixture.detail.history.push(payload);
}

fn latest_timestep(detail: &ScenarioDetail) -> Option<u64> {
    detail
        .history
        .iter()
        .filter_map(|payload| timestep_of(payload.timestep).ok())
        .max()
        .or_else(|| detail.current_timestep.and_then(|t| u64::try_from(t).ok()))
}

fn not_found(scenario: &ScenarioId, what: &str) -> TransportError {
    TransportError::NotFound {
        scenario: scenario.clone(),
        what: what.to_owned(),
    }
}
