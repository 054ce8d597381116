//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the filter falls back to the level
//! implied by [`Verbosity`]. Installing twice is a no-op.

use crate::config::HarnessConfig;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Logging verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    /// Scenario and stage boundaries
    #[default]
    Normal,
    /// Iterations and pages
    Verbose,
    /// Everything, including dependencies
    Debug,
}

impl Verbosity {
    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Filter directive used when `RUST_LOG` is unset
    #[must_use]
    pub const fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "warn",
            Self::Normal => "loadscope=info,warn",
            Self::Verbose => "loadscope=debug,info",
            Self::Debug => "debug",
        }
    }
}

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

fn filter_for(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.directive()))
}

/// Install a text subscriber. Returns `false` if one was already installed.
pub fn init(verbosity: Verbosity) -> bool {
    init_with_format(verbosity, LogFormat::Text)
}

/// Install a text subscriber at the verbosity a harness config asks for
pub fn init_from_config(config: &HarnessConfig) -> bool {
    init_with_format(config.verbosity, LogFormat::Text)
}

/// Install a subscriber with the given format. Targets are shown from
/// [`Verbosity::Verbose`] up.
pub fn init_with_format(verbosity: Verbosity, format: LogFormat) -> bool {
    let registry = tracing_subscriber::registry().with(filter_for(verbosity));
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(verbosity.is_verbose()))
            .try_init()
            .is_ok(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(verbosity.is_verbose()),
            )
            .try_init()
            .is_ok(),
    }
}
