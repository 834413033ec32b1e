//! Async timeline controller for Chronoscope.
//!
//! This crate owns the mutable side of the engine: one
//! [`TimelineController`] per active scenario, fed by bootstrap, advance
//! and push paths that all reconcile through `chronoscope-core`.
//!
//! # Modules
//!
//! - [`api`] -- [`SimulationApi`] contract and the fixture-backed
//!   [`InMemorySimulationApi`].
//! - [`config`] -- [`TimelineConfig`] loading from YAML and environment.
//! - [`connection`] -- [`PushConnection`], the per-scenario push task.
//! - [`controller`] -- [`TimelineController`].
//! - [`observer`] -- [`Subscription`] handles for change listeners.
//! - [`snapshot`] -- Immutable [`TimelineSnapshot`] reads.
//! - [`error`] -- [`TransportError`], [`TimelineError`], [`ConfigError`].

pub mod api;
pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod observer;
pub mod snapshot;

pub use api::{Fixture, InMemorySimulationApi, ScenarioFixture, SimulationApi};
pub use config::{FocusPolicy, TimelineConfig};
pub use connection::PushConnection;
pub use controller::TimelineController;
pub use error::{ConfigError, TimelineError, TransportError};
pub use observer::Subscription;
pub use snapshot::{Applied, TimelineSnapshot};
