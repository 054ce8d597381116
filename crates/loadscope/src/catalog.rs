//! Declarative catalog types: endpoints, request specs, scenarios and the
//! simulated-user hierarchy (request type → page → user action → production
//! scenario).
//!
//! Everything in here is authored by the caller before a run and is read-only
//! to the engine. Catalogs can be written in Rust (see [`crate::presets`]) or
//! loaded from YAML.

use crate::result::{LoadscopeError, LoadscopeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Baseline multiplier for page-level request weights
pub const PAGE_REPEAT_BASELINE: f64 = 10.0;

/// Number of times a weighted request appears in one page batch.
///
/// `max(1, round(weight × baseline))`. A request type listed on a page is
/// always issued at least once.
pub fn repeat_count(weight: f64, baseline: f64) -> usize {
    let scaled = (weight * baseline).round();
    if scaled.is_finite() && scaled >= 1.0 {
        scaled as usize
    } else {
        1
    }
}

/// Number of simulated users assigned to a weighted action.
///
/// `round(weight × users)` with no floor: an action whose share rounds to zero
/// gets no users, so the realized total can drift from the nominal target.
pub fn assignment_count(weight: f64, users: usize) -> usize {
    let scaled = (weight * users as f64).round();
    if scaled.is_finite() && scaled > 0.0 {
        scaled as usize
    } else {
        0
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_iterations() -> usize {
    1
}

// =============================================================================
// Endpoints and request specs
// =============================================================================

/// A remote operation under test
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EndpointDescriptor {
    /// Path below the API prefix, e.g. `async-test-with-await-with-async`
    pub path: String,
    /// Human-readable label used in reports
    pub label: String,
    /// Extra query parameter names the endpoint understands
    #[serde(default)]
    pub params: Vec<String>,
}

impl EndpointDescriptor {
    /// Create a descriptor with no extra parameters
    pub fn new(path: &str, label: &str) -> Self {
        Self {
            path: path.to_string(),
            label: label.to_string(),
            params: Vec::new(),
        }
    }

    /// Declare an extra parameter
    pub fn with_param(mut self, name: &str) -> Self {
        self.params.push(name.to_string());
        self
    }

    /// Whether the endpoint declares the given parameter
    pub fn accepts(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }
}

/// Declared complexity of a request type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Light reads
    Low,
    /// Joins, writes
    Medium,
    /// Analytics
    High,
}

impl Complexity {
    /// All tags in ascending order
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One planned call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestSpec {
    /// Target endpoint
    pub endpoint: EndpointDescriptor,
    /// Advisory server-side delay in seconds, sent as `timeout`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    /// Number of queries the server should run, sent as `query_count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_count: Option<u32>,
    /// Free-form operation tag (`read`, `write`, `complex_join`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Declared complexity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
}

impl RequestSpec {
    /// Plain call with no parameters
    pub fn new(endpoint: EndpointDescriptor) -> Self {
        Self {
            endpoint,
            timeout_secs: None,
            query_count: None,
            operation: None,
            complexity: None,
        }
    }

    /// Set the advisory delay
    pub fn with_timeout(mut self, secs: f64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the query count
    pub fn with_query_count(mut self, count: u32) -> Self {
        self.query_count = Some(count);
        self
    }

    /// Set the operation tag
    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    /// Set the complexity tag
    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    /// Advisory delay in milliseconds, 0 when none is declared
    pub fn advisory_delay_ms(&self) -> f64 {
        self.timeout_secs.unwrap_or(0.0) * 1000.0
    }
}

// =============================================================================
// Scenarios
// =============================================================================

/// A named, repeatable batch of requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioSpec {
    /// Scenario name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Requests issued concurrently in every iteration
    pub requests: Vec<RequestSpec>,
    /// Number of sequential iterations
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Ask the notification side to push an event when the run completes
    #[serde(default)]
    pub triggers_stream: bool,
}

impl ScenarioSpec {
    /// Create an empty single-iteration scenario
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            requests: Vec::new(),
            iterations: 1,
            triggers_stream: false,
        }
    }

    /// Add a request
    pub fn add_request(&mut self, request: RequestSpec) {
        self.requests.push(request);
    }

    /// Add `count` copies of a request
    pub fn add_repeated(&mut self, request: &RequestSpec, count: usize) {
        self.requests
            .extend(std::iter::repeat(request).take(count).cloned());
    }

    /// Builder form of [`Self::add_repeated`]
    pub fn with_repeated(mut self, request: &RequestSpec, count: usize) -> Self {
        self.add_repeated(request, count);
        self
    }

    /// Set iteration count
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Mark the scenario as a notification trigger
    pub fn with_stream_trigger(mut self) -> Self {
        self.triggers_stream = true;
        self
    }

    /// Requests per iteration
    pub fn batch_size(&self) -> usize {
        self.requests.len()
    }

    /// Planned requests across all iterations
    pub fn total_requests(&self) -> usize {
        self.batch_size() * self.iterations
    }

    /// Sum of declared advisory delays for one iteration, in milliseconds
    pub fn theoretical_elapsed_ms(&self) -> f64 {
        self.requests.iter().map(RequestSpec::advisory_delay_ms).sum()
    }

    /// Reject scenarios that cannot produce a meaningful run
    pub fn validate(&self) -> LoadscopeResult<()> {
        if self.iterations == 0 {
            return Err(LoadscopeError::invalid_scenario(format!(
                "'{}' declares zero iterations",
                self.name
            )));
        }
        if self.requests.is_empty() {
            return Err(LoadscopeError::invalid_scenario(format!(
                "'{}' declares no requests",
                self.name
            )));
        }
        if let Some(bad) = self
            .requests
            .iter()
            .find(|r| r.timeout_secs.is_some_and(|t| !t.is_finite() || t < 0.0))
        {
            return Err(LoadscopeError::invalid_scenario(format!(
                "'{}' has a negative or non-finite timeout for {}",
                self.name, bad.endpoint.path
            )));
        }
        Ok(())
    }

    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> LoadscopeResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a list of scenarios from a YAML string
    pub fn catalog_from_yaml(yaml: &str) -> LoadscopeResult<Vec<Self>> {
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

// =============================================================================
// Simulated users
// =============================================================================

/// A kind of call issued by simulated users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestType {
    /// Target endpoint
    pub endpoint: EndpointDescriptor,
    /// Number of queries requested from the server
    #[serde(default)]
    pub query_count: Option<u32>,
    /// Advisory server-side delay in seconds
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    /// Expected response time in milliseconds (documentation only)
    #[serde(default)]
    pub expected_ms: u64,
    /// Complexity tag used for per-complexity latency
    pub complexity: Complexity,
}

impl RequestType {
    /// Create a request type that asks for `query_count` queries
    pub fn new(
        endpoint: EndpointDescriptor,
        query_count: u32,
        expected_ms: u64,
        complexity: Complexity,
    ) -> Self {
        Self {
            endpoint,
            query_count: Some(query_count),
            timeout_secs: None,
            expected_ms,
            complexity,
        }
    }

    /// Concrete call for this type
    pub fn to_spec(&self) -> RequestSpec {
        RequestSpec {
            endpoint: self.endpoint.clone(),
            timeout_secs: self.timeout_secs,
            query_count: self.query_count,
            operation: None,
            complexity: Some(self.complexity),
        }
    }
}

/// A request type with its share of a page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedRequest {
    /// Request type
    pub request: RequestType,
    /// Weight, scaled by [`PAGE_REPEAT_BASELINE`]
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// A page: one concurrent batch of weighted requests
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageLoadPattern {
    /// Page name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Weighted request types
    pub requests: Vec<WeightedRequest>,
}

impl PageLoadPattern {
    /// Create an empty page
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            requests: Vec::new(),
        }
    }

    /// Add a weighted request type
    pub fn with_request(mut self, request: RequestType, weight: f64) -> Self {
        self.requests.push(WeightedRequest { request, weight });
        self
    }

    /// Expand into the concrete batch, grouped by request type in
    /// declaration order
    pub fn expand(&self) -> Vec<RequestSpec> {
        self.requests
            .iter()
            .flat_map(|w| {
                let count = repeat_count(w.weight, PAGE_REPEAT_BASELINE);
                std::iter::repeat(w.request.to_spec()).take(count)
            })
            .collect()
    }
}

/// A browsing flow: pages visited one after another
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAction {
    /// Action name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Pages in visiting order
    pub pages: Vec<PageLoadPattern>,
}

impl UserAction {
    /// Create an action from its pages
    pub fn new(name: &str, description: &str, pages: Vec<PageLoadPattern>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            pages,
        }
    }

    /// Requests one user issues across all pages
    pub fn request_count(&self) -> usize {
        self.pages.iter().map(|p| p.expand().len()).sum()
    }
}

/// An action with its share of the simulated users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedAction {
    /// User action
    pub action: UserAction,
    /// Share of the concurrent users
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// Simulated-user load: a target user count and a weighted action mix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductionScenario {
    /// Scenario name
    pub name: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Nominal number of concurrent users
    pub concurrent_users: usize,
    /// Weighted action mix
    pub actions: Vec<WeightedAction>,
}

impl ProductionScenario {
    /// Create a scenario with no actions
    pub fn new(name: &str, description: &str, concurrent_users: usize) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            concurrent_users,
            actions: Vec::new(),
        }
    }

    /// Add a weighted action
    pub fn with_action(mut self, action: UserAction, weight: f64) -> Self {
        self.actions.push(WeightedAction { action, weight });
        self
    }

    /// Resolve the action mix into one action per simulated user
    pub fn assign_users(&self) -> Vec<&UserAction> {
        self.actions
            .iter()
            .flat_map(|w| {
                std::iter::repeat(&w.action).take(assignment_count(w.weight, self.concurrent_users))
            })
            .collect()
    }

    /// Users actually simulated after rounding
    pub fn realized_users(&self) -> usize {
        self.actions
            .iter()
            .map(|w| assignment_count(w.weight, self.concurrent_users))
            .sum()
    }

    /// Same mix at a different user count, renamed
    pub fn scaled(&self, name: String, concurrent_users: usize) -> Self {
        Self {
            name,
            description: self.description.clone(),
            concurrent_users,
            actions: self.actions.clone(),
        }
    }

    /// Reject scenarios without actions or with negative weights
    pub fn validate(&self) -> LoadscopeResult<()> {
        if self.actions.is_empty() {
            return Err(LoadscopeError::invalid_scenario(format!(
                "'{}' declares no user actions",
                self.name
            )));
        }
        if self
            .actions
            .iter()
            .any(|w| !w.weight.is_finite() || w.weight < 0.0)
        {
            return Err(LoadscopeError::invalid_scenario(format!(
                "'{}' has a negative or non-finite action weight",
                self.name
            )));
        }
        if let Some(action) = self.actions.iter().find(|w| w.action.pages.is_empty()) {
            return Err(LoadscopeError::invalid_scenario(format!(
                "action '{}' in '{}' has no pages",
                action.action.name, self.name
            )));
        }
        Ok(())
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
}
