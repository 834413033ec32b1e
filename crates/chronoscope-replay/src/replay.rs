//! Driving the controller over a fixture and rendering what it built.

use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use chronoscope_client::{
    InMemorySimulationApi, SimulationApi, TimelineController, TimelineSnapshot,
};
use chronoscope_core::{Condition, TriggerReport, aggregate, audit, ingest, trigger};
use chronoscope_types::{PushEvent, ScenarioId, ScenarioSummary, TriggerCondition, TriggerDraft};
use futures::channel::mpsc;
use tracing::{debug, info, warn};

type Controller = Arc<TimelineController<InMemorySimulationApi>>;

/// How pending fixture steps reach the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// One `advance` per pending step.
    Advance,
    /// The backend computes each pending step and announces it over the
    /// push connection.
    Push,
    /// Pending steps are left alone.
    HistoryOnly,
}

/// Activate `scenario`, feed its pending steps and return the final
/// snapshot.
pub async fn load(
    controller: &Controller,
    scenario: &ScenarioId,
    feed: Feed,
) -> anyhow::Result<Arc<TimelineSnapshot>> {
    let (events, stream) = mpsc::unbounded::<PushEvent>();
    controller
        .activate(scenario.clone(), stream)
        .await
        .with_context(|| format!("bootstrapping scenario {scenario}"))?;

    match feed {
        Feed::Advance => {
            while controller.api().pending_len(scenario) > 0 {
                controller
                    .advance(scenario)
                    .await
                    .with_context(|| format!("advancing scenario {scenario}"))?;
            }
        }
        Feed::Push => push_pending(controller, scenario, &events).await?,
        Feed::HistoryOnly => {}
    }

    let snapshot = controller.current();
    info!(
        scenario = %scenario,
        steps = snapshot.len(),
        latest = ?snapshot.max_timestep(),
        "Replay loaded"
    );
    Ok(snapshot)
}

/// Release each pending step on the backend, announce it and wait until
/// the controller has merged it.
async fn push_pending(
    controller: &Controller,
    scenario: &ScenarioId,
    events: &mpsc::UnboundedSender<PushEvent>,
) -> anyhow::Result<()> {
    let (merged_tx, mut merged_rx) = tokio::sync::mpsc::unbounded_channel();
    let _subscription = controller.subscribe(move |snapshot| {
        // Fails only after the replay loop has returned.
        let _ = merged_tx.send(Arc::clone(snapshot));
    });
    let wait = controller.config().fetch_timeout();

    while controller.api().pending_len(scenario) > 0 {
        let payload = controller.api().post_step(scenario).await?;
        let timestep = ingest::timestep_of(payload.timestep)?;
        events
            .unbounded_send(PushEvent {
                scenario_id: scenario.clone(),
                timestep,
            })
            .map_err(|e| anyhow!("push connection closed: {e}"))?;

        let merged = tokio::time::timeout(wait, async {
            while let Some(snapshot) = merged_rx.recv().await {
                if snapshot.step_at(timestep).is_some() {
                    return true;
                }
            }
            false
        })
        .await;
        match merged {
            Ok(true) => debug!(scenario = %scenario, timestep, "Pushed step merged"),
            Ok(false) => bail!("controller stopped publishing before timestep {timestep}"),
            Err(_elapsed) => bail!("timestep {timestep} was not merged within {wait:?}"),
        }
    }
    Ok(())
}

/// One line per scenario.
pub fn render_summary(summary: &ScenarioSummary) -> String {
    let latest = summary
        .current_timestep
        .map_or_else(|| "-".to_owned(), |t| t.to_string());
    match &summary.description {
        Some(description) => {
            format!("{}\t{}\tt={latest}\t{description}", summary.id, summary.name)
        }
        None => format!("{}\t{}\tt={latest}", summary.id, summary.name),
    }
}

/// One line per step; the focused step is marked with `>`.
pub fn render_timeline(snapshot: &TimelineSnapshot) -> Vec<String> {
    let focused = snapshot.focused_timestep();
    snapshot
        .steps()
        .iter()
        .map(|step| {
            let marker = if Some(step.timestep) == focused { '>' } else { ' ' };
            let counts = step.audit.as_ref().map_or_else(
                || "no audit".to_owned(),
                |record| {
                    let summary = audit::summarize(record);
                    format!(
                        "reducers={} changes={} triggers={} errors={}",
                        summary.reducer_count,
                        summary.change_count,
                        summary.trigger_count,
                        summary.error_count
                    )
                },
            );
            format!(
                "{marker} t={:<4} entities={:<3} {counts}",
                step.timestep,
                step.state.entities.len()
            )
        })
        .collect()
}

/// Evaluate `expression` at every step. Runtime faults are reported per
/// step; a rejected or unparsable expression fails the whole command.
pub fn evaluate_each(
    expression: &str,
    snapshot: &TimelineSnapshot,
) -> anyhow::Result<Vec<String>> {
    let condition = Condition::compile(expression)
        .with_context(|| format!("compiling condition `{expression}`"))?;
    Ok(snapshot
        .steps()
        .iter()
        .map(|step| match condition.evaluate(step) {
            Ok(value) => format!("t={} {value}", step.timestep),
            Err(e) => format!("t={} fault: {e}", step.timestep),
        })
        .collect())
}

/// Drafts for expressions given on the command line.
pub fn ad_hoc_drafts(expressions: &[String]) -> impl Iterator<Item = TriggerDraft> + '_ {
    expressions
        .iter()
        .enumerate()
        .map(|(index, when)| TriggerDraft {
            name: format!("when-{}", index.saturating_add(1)),
            description: String::new(),
            condition: TriggerCondition {
                when: when.clone(),
                once: false,
            },
            action: serde_json::Value::Null,
            expires_after_turns: None,
        })
}

/// Scan every draft over the timeline. Drafts that fail validation are
/// logged and left out.
pub fn scan_all<I>(drafts: I, snapshot: &TimelineSnapshot) -> Vec<TriggerReport>
where
    I: IntoIterator<Item = TriggerDraft>,
{
    drafts
        .into_iter()
        .filter_map(|draft| match trigger::scan(&draft, snapshot.steps()) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(trigger = %draft.name, error = %e, "Trigger draft rejected");
                None
            }
        })
        .collect()
}

/// Statistics for `path` at every step.
pub fn render_stats(snapshot: &TimelineSnapshot, path: &str) -> Vec<String> {
    snapshot
        .steps()
        .iter()
        .map(|step| {
            let stats = aggregate::stats(&step.state.entities, path);
            let bound =
                |value: Option<f64>| value.map_or_else(|| "-".to_owned(), |v| v.to_string());
            format!(
                "t={} count={} sum={} mean={} min={} max={}",
                step.timestep,
                stats.count,
                stats.sum,
                stats.mean,
                bound(stats.min),
                bound(stats.max)
            )
        })
        .collect()
}
