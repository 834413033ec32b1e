//! Push-notification connection scoped to one active scenario.
//!
//! A [`PushConnection`] is opened when a scenario is activated and closed
//! when it is deactivated or replaced. It owns a task that drains the
//! event stream into [`TimelineController::on_push`] and holds only a weak
//! reference to the controller, so the controller's lifetime is never
//! extended by its own connection.

use std::pin::pin;
use std::sync::Weak;

use chronoscope_types::{PushEvent, ScenarioId};
use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::SimulationApi;
use crate::controller::TimelineController;

/// Background task feeding push events to a controller.
///
/// Dropping the connection aborts the task.
#[derive(Debug)]
pub struct PushConnection {
    scenario: ScenarioId,
    task: JoinHandle<()>,
}

impl PushConnection {
    /// Spawn the forwarding task. Must be called inside a tokio runtime.
    pub fn open<A, S>(
        controller: Weak<TimelineController<A>>,
        scenario: ScenarioId,
        events: S,
    ) -> Self
    where
        A: SimulationApi,
        S: Stream<Item = PushEvent> + Send + 'static,
    {
        let task_scenario = scenario.clone();
        let task = tokio::spawn(async move {
            let mut events = pin!(events);
            while let Some(event) = events.next().await {
                let Some(controller) = controller.upgrade() else {
                    debug!(scenario = %task_scenario, "Controller dropped, closing push stream");
                    return;
                };
                if let Err(e) = controller.on_push(event).await {
                    warn!(scenario = %task_scenario, error = %e, "Push-triggered fetch failed");
                }
            }
            debug!(scenario = %task_scenario, "Push stream ended");
        });
        debug!(scenario = %scenario, "Push connection opened");
        Self { scenario, task }
    }

    /// Scenario this connection listens for.
    pub const fn scenario(&self) -> &ScenarioId {
        &self.scenario
    }

    /// Whether the forwarding task is still running.
    pub fn is_open(&self) -> bool {
        !self.task.is_finished()
    }

    /// Abort the forwarding task.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for PushConnection {
    fn drop(&mut self) {
        self.task.abort();
        debug!(scenario = %self.scenario, "Push connection closed");
    }
}
