//! Result and error types for Loadscope.
//!
//! Call-level failures are never represented here: they are captured into
//! [`RequestOutcome::Failure`](crate::RequestOutcome) at the executor boundary.

use thiserror::Error;

/// Result type for Loadscope operations
pub type LoadscopeResult<T> = Result<T, LoadscopeError>;

/// Errors that can occur while preparing or driving a run
#[derive(Debug, Error)]
pub enum LoadscopeError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Scenario cannot be executed as declared
    #[error("Invalid scenario: {message}")]
    InvalidScenario {
        /// Error message
        message: String,
    },

    /// HTTP client could not be constructed
    #[error("HTTP client setup failed: {message}")]
    HttpClient {
        /// Error message
        message: String,
    },

    /// Run was cancelled before it completed
    #[error("Run cancelled: {scenario}")]
    Cancelled {
        /// Scenario that was running
        scenario: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoadscopeError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid scenario error
    #[must_use]
    pub fn invalid_scenario(message: impl Into<String>) -> Self {
        Self::InvalidScenario {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    #[must_use]
    pub fn cancelled(scenario: impl Into<String>) -> Self {
        Self::Cancelled {
            scenario: scenario.into(),
        }
    }

    /// Whether this error came from a cancellation request
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
