//! Error types for the async client.

use chronoscope_core::ValidationError;
use chronoscope_types::ScenarioId;

/// Failure talking to the simulation backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be completed.
    #[error("request failed: {message}")]
    Request {
        /// Description of the failure.
        message: String,
    },

    /// The backend has no such scenario or step.
    #[error("scenario {scenario} has no {what}")]
    NotFound {
        /// Scenario the request was for.
        scenario: ScenarioId,
        /// What was missing, e.g. `step 7`.
        what: String,
    },

    /// The request did not settle within the configured timeout.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Collaborator operation that timed out.
        operation: &'static str,
        /// The timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The backend answered with something that could not be decoded.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Decoder message.
        message: String,
    },
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

/// Failure of a controller operation. The timeline is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimelineError {
    /// A payload from the backend was malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend could not be reached or answered badly.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Offending field or environment variable.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}
