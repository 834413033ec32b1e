//! Controller configuration.
//!
//! Loaded from YAML (every field optional) and then overridden from the
//! environment:
//!
//! - `CHRONOSCOPE_FETCH_TIMEOUT_MS` overrides `fetch_timeout_ms`
//! - `CHRONOSCOPE_FOCUS_POLICY` overrides `focus_policy`
//! - `CHRONOSCOPE_LOG_LEVEL` overrides `log_level`

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How a pushed step interacts with the cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusPolicy {
    /// Follow a newer pushed step only while the cursor sits on the newest
    /// step. Someone scrubbing older history is never moved.
    #[default]
    NonStealing,
    /// Follow any pushed step at or beyond the previous maximum.
    FollowNewest,
}

impl FocusPolicy {
    /// Config spelling of the policy.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NonStealing => "non_stealing",
            Self::FollowNewest => "follow_newest",
        }
    }
}

impl fmt::Display for FocusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FocusPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "non_stealing" => Ok(Self::NonStealing),
            "follow_newest" => Ok(Self::FollowNewest),
            other => Err(ConfigError::Invalid {
                field: "focus_policy",
                reason: format!(
                    "unknown policy `{other}` (expected non_stealing or follow_newest)"
                ),
            }),
        }
    }
}

/// Settings for a [`TimelineController`](crate::TimelineController).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Upper bound on each collaborator call, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Cursor behaviour for pushed steps.
    #[serde(default)]
    pub focus_policy: FocusPolicy,

    /// Log level (trace, debug, info, warn, error) used when `RUST_LOG` is
    /// unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: default_fetch_timeout_ms(),
            focus_policy: FocusPolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl TimelineConfig {
    /// Load configuration from a YAML file and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// See [`TimelineConfig::from_file`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config = Self::parse_without_env(yaml)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse YAML only, ignoring the environment.
    ///
    /// # Errors
    ///
    /// See [`TimelineConfig::from_file`].
    pub fn parse_without_env(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `CHRONOSCOPE_*` environment variables when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CHRONOSCOPE_FETCH_TIMEOUT_MS") {
            self.fetch_timeout_ms = val.trim().parse().map_err(|e| ConfigError::Invalid {
                field: "CHRONOSCOPE_FETCH_TIMEOUT_MS",
                reason: format!("{e}"),
            })?;
        }
        if let Some(val) = lookup("CHRONOSCOPE_FOCUS_POLICY") {
            self.focus_policy = val.parse()?;
        }
        if let Some(val) = lookup("CHRONOSCOPE_LOG_LEVEL") {
            self.log_level = val;
        }
        self.validate()
    }

    /// The fetch timeout as a [`Duration`].
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "fetch_timeout_ms",
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

const fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_owned()
}
