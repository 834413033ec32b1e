//! Offline replay binary for Chronoscope.
//!
//! Loads a scenario fixture into the in-memory simulation backend and
//! drives the real [`TimelineController`] over it: bootstrap, then every
//! pending step either through `advance` or announced over the push
//! connection. The resulting timeline is then inspected.
//!
//! # Commands
//!
//! - `scenarios` lists the fixture's scenarios.
//! - `run` prints the timeline with per-step audit counts.
//! - `eval` evaluates one condition expression at every step.
//! - `triggers` replays the fixture's trigger drafts (plus any `--when`
//!   expressions) and prints their reports as JSON.
//! - `stats` prints cross-entity statistics for a field path.
//!
//! [`TimelineController`]: chronoscope_client::TimelineController

mod replay;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chronoscope_client::{Fixture, InMemorySimulationApi, TimelineConfig, TimelineController};
use chronoscope_types::ScenarioId;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::replay::Feed;

/// Replay a scenario fixture through the Chronoscope timeline.
#[derive(Debug, Parser)]
#[command(name = "chronoscope-replay", version)]
struct Cli {
    /// Scenario fixture (JSON).
    #[arg(long, short)]
    fixture: PathBuf,

    /// Controller configuration (YAML). Defaults and environment
    /// overrides apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the scenarios in the fixture.
    Scenarios,

    /// Print the replayed timeline with per-step audit counts.
    Run {
        /// Scenario to replay.
        scenario: String,
        #[command(flatten)]
        feed: FeedArgs,
    },

    /// Evaluate a condition expression at every step.
    Eval {
        /// Scenario to replay.
        scenario: String,
        /// Condition, e.g. `t > 2 && avg('macro.inflation') < 0.05`.
        expression: String,
        #[command(flatten)]
        feed: FeedArgs,
    },

    /// Replay trigger drafts over the timeline.
    Triggers {
        /// Scenario to replay.
        scenario: String,
        /// Extra ad-hoc conditions, scanned alongside the fixture's drafts.
        #[arg(long = "when")]
        when: Vec<String>,
        #[command(flatten)]
        feed: FeedArgs,
    },

    /// Cross-entity statistics for a field path at every step.
    Stats {
        /// Scenario to replay.
        scenario: String,
        /// Dot-delimited field path, e.g. `macro.gdp`.
        path: String,
        #[command(flatten)]
        feed: FeedArgs,
    },
}

#[derive(Debug, clap::Args)]
struct FeedArgs {
    /// Deliver pending steps as push notifications instead of advancing.
    #[arg(long, conflicts_with = "history_only")]
    push: bool,

    /// Only bootstrap recorded history; leave pending steps unreleased.
    #[arg(long)]
    history_only: bool,
}

impl FeedArgs {
    const fn feed(&self) -> Feed {
        if self.history_only {
            Feed::HistoryOnly
        } else if self.push {
            Feed::Push
        } else {
            Feed::Advance
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(
        fixture = %cli.fixture.display(),
        fetch_timeout_ms = config.fetch_timeout_ms,
        focus_policy = %config.focus_policy,
        "chronoscope-replay starting"
    );

    let fixture = Fixture::from_file(&cli.fixture)
        .with_context(|| format!("loading fixture {}", cli.fixture.display()))?;
    let drafts = fixture.triggers.clone();
    info!(
        scenarios = fixture.scenarios.len(),
        triggers = drafts.len(),
        "Fixture loaded"
    );

    let api = Arc::new(InMemorySimulationApi::new(fixture));
    let controller = TimelineController::new(api, config);

    match cli.command {
        Command::Scenarios => {
            for summary in controller.scenarios().await? {
                println!("{}", replay::render_summary(&summary));
            }
        }
        Command::Run { scenario, feed } => {
            let snapshot =
                replay::load(&controller, &ScenarioId::new(scenario), feed.feed()).await?;
            for line in replay::render_timeline(&snapshot) {
                println!("{line}");
            }
        }
        Command::Eval {
            scenario,
            expression,
            feed,
        } => {
            let snapshot =
                replay::load(&controller, &ScenarioId::new(scenario), feed.feed()).await?;
            for line in replay::evaluate_each(&expression, &snapshot)? {
                println!("{line}");
            }
        }
        Command::Triggers {
            scenario,
            when,
            feed,
        } => {
            let snapshot =
                replay::load(&controller, &ScenarioId::new(scenario), feed.feed()).await?;
            let drafts = drafts.into_iter().chain(replay::ad_hoc_drafts(&when));
            let reports = replay::scan_all(drafts, &snapshot);
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Command::Stats {
            scenario,
            path,
            feed,
        } => {
            let snapshot =
                replay::load(&controller, &ScenarioId::new(scenario), feed.feed()).await?;
            for line in replay::render_stats(&snapshot, &path) {
                println!("{line}");
            }
        }
    }

    controller.deactivate();
    info!("chronoscope-replay finished");
    Ok(())
}

/// Load controller settings from `path`, or defaults plus environment
/// overrides when no path is given.
fn load_config(path: Option<&Path>) -> anyhow::Result<TimelineConfig> {
    let config = match path {
        Some(path) => TimelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TimelineConfig::parse("")?,
    };
    Ok(config)
}
