//! Harness configuration

use crate::catalog::RequestSpec;
use crate::logging::Verbosity;
use crate::result::{LoadscopeError, LoadscopeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding [`HarnessConfig::base_url`]
pub const ENV_BASE_URL: &str = "LOADSCOPE_BASE_URL";
/// Environment variable overriding [`HarnessConfig::status_policy`]
pub const ENV_STATUS_POLICY: &str = "LOADSCOPE_STATUS_POLICY";

/// How HTTP status codes affect call outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Any status with a JSON body counts as success
    #[default]
    Ignore,
    /// Non-2xx responses are recorded as status failures
    RequireSuccess,
}

impl StatusPolicy {
    /// Parse the environment spelling (`ignore`, `require_success`, `require-success`)
    pub fn parse(value: &str) -> LoadscopeResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "require_success" | "require-success" | "strict" => Ok(Self::RequireSuccess),
            other => Err(LoadscopeError::config(format!(
                "unknown status policy '{other}'"
            ))),
        }
    }
}

/// One wave of a burst run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BurstPhase {
    /// Phase name shown in reports
    pub name: String,
    /// Share of the target user count, rounded up
    pub fraction: f64,
}

impl BurstPhase {
    /// Create a phase
    pub fn new(name: &str, fraction: f64) -> Self {
        Self {
            name: name.to_string(),
            fraction,
        }
    }
}

fn default_burst_phases() -> Vec<BurstPhase> {
    vec![
        BurstPhase::new("initial load", 0.25),
        BurstPhase::new("peak load", 1.0),
        BurstPhase::new("cool down", 0.5),
    ]
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Scheme, host and port of the service under test
    pub base_url: String,
    /// Path prefix in front of every endpoint
    pub api_prefix: String,
    /// Status handling
    pub status_policy: StatusPolicy,
    /// Added to a request's advisory delay to form its client timeout
    pub timeout_margin_secs: f64,
    /// Client timeout for requests without an advisory delay
    pub default_timeout_secs: f64,
    /// Stages used by gradual runs
    pub ramp_stages: usize,
    /// Waves used by burst runs
    pub burst_phases: Vec<BurstPhase>,
    /// Idle connections kept per host by the HTTP client
    pub max_idle_per_host: usize,
    /// Logging verbosity
    pub verbosity: Verbosity,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:7777".to_string(),
            api_prefix: "/api/v1/standard".to_string(),
            status_policy: StatusPolicy::Ignore,
            timeout_margin_secs: 10.0,
            default_timeout_secs: 30.0,
            ramp_stages: 4,
            burst_phases: default_burst_phases(),
            max_idle_per_host: 256,
            verbosity: Verbosity::Normal,
        }
    }
}

impl HarnessConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set API prefix
    #[must_use]
    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    /// Set status policy
    #[must_use]
    pub const fn with_status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// Set timeout margin
    #[must_use]
    pub const fn with_timeout_margin(mut self, secs: f64) -> Self {
        self.timeout_margin_secs = secs;
        self
    }

    /// Set default timeout
    #[must_use]
    pub const fn with_default_timeout(mut self, secs: f64) -> Self {
        self.default_timeout_secs = secs;
        self
    }

    /// Set gradual stage count
    #[must_use]
    pub const fn with_ramp_stages(mut self, stages: usize) -> Self {
        self.ramp_stages = stages;
        self
    }

    /// Replace burst phases
    #[must_use]
    pub fn with_burst_phases(mut self, phases: Vec<BurstPhase>) -> Self {
        self.burst_phases = phases;
        self
    }

    /// Set idle pool size
    #[must_use]
    pub const fn with_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.max_idle_per_host = max_idle;
        self
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Apply `LOADSCOPE_*` environment overrides
    pub fn with_env_overrides(self) -> LoadscopeResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> LoadscopeResult<Self> {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(policy) = lookup(ENV_STATUS_POLICY) {
            self.status_policy = StatusPolicy::parse(&policy)?;
        }
        Ok(self)
    }

    /// Check the configuration before a run
    pub fn validate(&self) -> LoadscopeResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(LoadscopeError::config("base_url must not be empty"));
        }
        if self.ramp_stages == 0 {
            return Err(LoadscopeError::config("ramp_stages must be at least 1"));
        }
        if self.burst_phases.is_empty() {
            return Err(LoadscopeError::config(
                "at least one burst phase is required",
            ));
        }
        if let Some(phase) = self
            .burst_phases
            .iter()
            .find(|p| !p.fraction.is_finite() || p.fraction <= 0.0)
        {
            return Err(LoadscopeError::config(format!(
                "burst phase '{}' must have a positive fraction",
                phase.name
            )));
        }
        if !(self.default_timeout_secs.is_finite() && self.default_timeout_secs > 0.0) {
            return Err(LoadscopeError::config(
                "default_timeout_secs must be positive",
            ));
        }
        if !(self.timeout_margin_secs.is_finite() && self.timeout_margin_secs >= 0.0) {
            return Err(LoadscopeError::config(
                "timeout_margin_secs must not be negative",
            ));
        }
        Ok(())
    }

    /// Full URL for an endpoint path
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Client timeout for one call
    pub fn request_timeout(&self, spec: &RequestSpec) -> Duration {
        let secs = spec.timeout_secs.map_or(self.default_timeout_secs, |t| {
            t + self.timeout_margin_secs
        });
        Duration::try_from_secs_f64(secs)
            .or_else(|_| Duration::try_from_secs_f64(self.default_timeout_secs))
            .unwrap_or(Duration::from_secs(30))
    }

    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> LoadscopeResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load from file
    pub fn load(path: &Path) -> LoadscopeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> LoadscopeResult<()> {
        let content = serde_yaml_ng::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
