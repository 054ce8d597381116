//! Simulated-user load: production scenarios and staged traffic shapes.
//!
//! Users run concurrently; inside a user, pages run one after another; inside
//! a page, every expanded request runs concurrently. Staged runs (gradual
//! ramp-up, burst waves) execute their stages strictly in sequence, each one a
//! full production run at a different user count.

use crate::batch::{run_batch, BatchError};
use crate::catalog::{Complexity, ProductionScenario, UserAction};
use crate::client::{RequestExecutor, RequestResult};
use crate::config::{BurstPhase, HarnessConfig};
use crate::metrics::{
    average, guarded_ratio, max, min, success_rate, ErrorAnalysis, LatencyDistribution,
};
use crate::progress::{NoopProgress, ProgressReporter, ProgressTracker};
use crate::result::{LoadscopeError, LoadscopeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Stage sizing
// =============================================================================

/// User counts of a gradual ramp: stage `k` of `stages` runs
/// `ceil(total × k / stages)` users
pub fn gradual_stage_sizes(total: usize, stages: usize) -> Vec<usize> {
    if stages == 0 {
        return Vec::new();
    }
    (1..=stages)
        .map(|k| (total * k).div_ceil(stages))
        .collect()
}

/// User counts of burst phases: `ceil(total × fraction)`
pub fn burst_phase_sizes(total: usize, phases: &[BurstPhase]) -> Vec<usize> {
    phases
        .iter()
        .map(|phase| {
            let users = (total as f64 * phase.fraction).ceil();
            if users.is_finite() && users > 0.0 {
                users as usize
            } else {
                0
            }
        })
        .collect()
}

// =============================================================================
// Results
// =============================================================================

/// One page visit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageResult {
    /// Page name
    pub page_name: String,
    /// Wall-clock time of the page batch
    pub total_time_ms: f64,
    /// Results of the batch, empty when it failed to join
    pub requests: Vec<RequestResult>,
    /// Requests collected
    pub total_requests: usize,
    /// Successful / collected
    pub success_rate: f64,
    /// Mean call time
    pub average_response_ms: f64,
    /// The batch could not be joined
    pub failed: bool,
}

impl PageResult {
    /// Page whose batch settled
    pub fn completed(page_name: &str, total_time_ms: f64, requests: Vec<RequestResult>) -> Self {
        let times: Vec<f64> = requests.iter().map(|r| r.elapsed_ms).collect();
        Self {
            page_name: page_name.to_string(),
            total_time_ms,
            total_requests: requests.len(),
            success_rate: success_rate(&requests),
            average_response_ms: average(&times),
            requests,
            failed: false,
        }
    }

    /// Page whose batch could not be joined
    pub fn failed(page_name: &str, total_time_ms: f64) -> Self {
        Self {
            page_name: page_name.to_string(),
            total_time_ms,
            requests: Vec::new(),
            total_requests: 0,
            success_rate: 0.0,
            average_response_ms: 0.0,
            failed: true,
        }
    }
}

/// One simulated user's walk through an action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserResult {
    /// Position in the assignment order
    pub user_index: usize,
    /// Action performed
    pub action_name: String,
    /// Pages in visiting order
    pub pages: Vec<PageResult>,
    /// Sum of page times
    pub total_time_ms: f64,
    /// Requests issued across pages
    pub total_requests: usize,
    /// Successful / issued
    pub success_rate: f64,
    /// Mean call time
    pub average_response_ms: f64,
    /// The user's task could not be joined
    #[serde(default)]
    pub failed: bool,
}

impl UserResult {
    /// Summarize a user's pages
    pub fn from_pages(user_index: usize, action_name: &str, pages: Vec<PageResult>) -> Self {
        let times: Vec<f64> = pages
            .iter()
            .flat_map(|p| p.requests.iter().map(|r| r.elapsed_ms))
            .collect();
        Self {
            user_index,
            action_name: action_name.to_string(),
            total_time_ms: pages.iter().map(|p| p.total_time_ms).sum(),
            total_requests: times.len(),
            success_rate: success_rate(pages.iter().flat_map(|p| p.requests.iter())),
            average_response_ms: average(&times),
            pages,
            failed: false,
        }
    }

    /// User whose task could not be joined
    pub fn failed(user_index: usize, action_name: &str) -> Self {
        Self {
            user_index,
            action_name: action_name.to_string(),
            pages: Vec::new(),
            total_time_ms: 0.0,
            total_requests: 0,
            success_rate: 0.0,
            average_response_ms: 0.0,
            failed: true,
        }
    }

    /// Every request this user issued
    pub fn requests(&self) -> impl Iterator<Item = &RequestResult> {
        self.pages.iter().flat_map(|p| p.requests.iter())
    }
}

/// Load times of one page name across users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageTimeline {
    /// Page name
    pub name: String,
    /// Every visit time
    pub times: Vec<f64>,
    /// Mean
    pub average: f64,
    /// Fastest
    pub min: f64,
    /// Slowest
    pub max: f64,
}

/// Latency by declared complexity
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComplexityAnalysis {
    /// Mean latency per tag, only for tags that occurred
    pub average_times: BTreeMap<Complexity, f64>,
    /// Share of all requests per tag
    pub distribution: BTreeMap<Complexity, f64>,
}

impl ComplexityAnalysis {
    fn from_requests(requests: &[&RequestResult]) -> Self {
        let total = requests.len() as f64;
        let mut average_times = BTreeMap::new();
        let mut distribution = BTreeMap::new();
        for tag in Complexity::ALL {
            let times: Vec<f64> = requests
                .iter()
                .filter(|r| r.complexity == Some(tag))
                .map(|r| r.elapsed_ms)
                .collect();
            if !times.is_empty() {
                average_times.insert(tag, average(&times));
            }
            distribution.insert(tag, guarded_ratio(times.len() as f64, total));
        }
        Self {
            average_times,
            distribution,
        }
    }
}

/// Aggregate of one production run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateResult {
    /// Scenario name
    pub scenario_name: String,
    /// Scenario description
    pub description: String,
    /// User count the scenario asked for
    pub nominal_users: usize,
    /// Users actually simulated after weight rounding
    pub concurrent_users: usize,
    /// Users whose task could not be joined
    #[serde(default)]
    pub failed_users: usize,
    /// Wall-clock time of the run
    pub total_time_ms: f64,
    /// Requests issued
    pub total_requests: usize,
    /// Successful / issued
    pub success_rate: f64,
    /// Failed / issued
    pub failure_rate: f64,
    /// Mean call time
    pub average_response_ms: f64,
    /// Fastest call
    pub min_response_ms: f64,
    /// Slowest call
    pub max_response_ms: f64,
    /// Call latency distribution
    pub latency: LatencyDistribution,
    /// Mean visit time per page name
    pub average_page_load_ms: BTreeMap<String, f64>,
    /// Mean of every page visit
    pub average_page_load_time: f64,
    /// Visit times per page name, in first-seen order
    pub page_timelines: Vec<PageTimeline>,
    /// Latency by complexity
    pub complexity: ComplexityAnalysis,
    /// Requests per second over the run
    pub throughput: f64,
    /// Failure histogram, absent when nothing failed
    pub errors: Option<ErrorAnalysis>,
    /// Per-user results in assignment order
    pub users: Vec<UserResult>,
}

impl AggregateResult {
    /// Aggregate settled users. Pure.
    pub fn from_users(
        scenario: &ProductionScenario,
        mut users: Vec<UserResult>,
        total_time_ms: f64,
    ) -> Self {
        users.sort_by_key(|u| u.user_index);

        let requests: Vec<&RequestResult> = users.iter().flat_map(UserResult::requests).collect();
        let times: Vec<f64> = requests.iter().map(|r| r.elapsed_ms).collect();
        let total = requests.len() as f64;
        let successful = requests.iter().filter(|r| r.success()).count() as f64;

        let mut page_timelines: Vec<PageTimeline> = Vec::new();
        for page in users.iter().flat_map(|u| u.pages.iter()) {
            match page_timelines.iter_mut().find(|t| t.name == page.page_name) {
                Some(timeline) => timeline.times.push(page.total_time_ms),
                None => page_timelines.push(PageTimeline {
                    name: page.page_name.clone(),
                    times: vec![page.total_time_ms],
                    average: 0.0,
                    min: 0.0,
                    max: 0.0,
                }),
            }
        }
        for timeline in &mut page_timelines {
            timeline.average = average(&timeline.times);
            timeline.min = min(&timeline.times);
            timeline.max = max(&timeline.times);
        }
        let all_page_times: Vec<f64> = page_timelines
            .iter()
            .flat_map(|t| t.times.iter().copied())
            .collect();

        Self {
            scenario_name: scenario.name.clone(),
            description: scenario.description.clone(),
            nominal_users: scenario.concurrent_users,
            concurrent_users: users.len(),
            failed_users: users.iter().filter(|u| u.failed).count(),
            total_time_ms,
            total_requests: requests.len(),
            success_rate: guarded_ratio(successful, total),
            failure_rate: guarded_ratio(total - successful, total),
            average_response_ms: average(&times),
            min_response_ms: min(&times),
            max_response_ms: max(&times),
            latency: LatencyDistribution::from_samples(&times),
            average_page_load_ms: page_timelines
                .iter()
                .map(|t| (t.name.clone(), t.average))
                .collect(),
            average_page_load_time: average(&all_page_times),
            page_timelines,
            complexity: ComplexityAnalysis::from_requests(&requests),
            throughput: guarded_ratio(total, total_time_ms / 1000.0),
            errors: ErrorAnalysis::from_results(requests.iter().copied()),
            users,
        }
    }

    /// Every request of the run
    pub fn requests(&self) -> impl Iterator<Item = &RequestResult> {
        self.users.iter().flat_map(UserResult::requests)
    }
}

/// How stages were derived
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    /// Evenly growing user counts
    Gradual,
    /// Configured waves
    Burst,
}

impl fmt::Display for StagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gradual => write!(f, "gradual"),
            Self::Burst => write!(f, "burst"),
        }
    }
}

/// One row of the stage comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageComparison {
    /// Stage name
    pub name: String,
    /// Users simulated in the stage
    pub user_count: usize,
    /// Mean call time
    pub average_response_ms: f64,
    /// 95th percentile call time
    pub p95: f64,
    /// Requests per second
    pub throughput: f64,
    /// Successful / issued
    pub success_rate: f64,
}

impl StageComparison {
    fn from_stage(stage: &AggregateResult) -> Self {
        Self {
            name: stage.scenario_name.clone(),
            user_count: stage.concurrent_users,
            average_response_ms: stage.average_response_ms,
            p95: stage.latency.p95,
            throughput: stage.throughput,
            success_rate: stage.success_rate,
        }
    }
}

/// Aggregate of a staged run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagedResult {
    /// Run name
    pub scenario_name: String,
    /// Run description
    pub description: String,
    /// Staging mode
    pub mode: StagingMode,
    /// Stage aggregates in execution order
    pub stages: Vec<AggregateResult>,
    /// Target user count
    pub total_users: usize,
    /// Requests across all stages
    pub total_requests: usize,
    /// Mean call time across all stages
    pub average_response_ms: f64,
    /// Successful / issued across all stages
    pub success_rate: f64,
    /// Pooled latency distribution
    pub latency: LatencyDistribution,
    /// Per-stage comparison rows
    pub comparison: Vec<StageComparison>,
}

impl StagedResult {
    /// Combine stage aggregates. Pure.
    pub fn from_stages(
        mode: StagingMode,
        scenario: &ProductionScenario,
        stages: Vec<AggregateResult>,
    ) -> Self {
        let times: Vec<f64> = stages
            .iter()
            .flat_map(AggregateResult::requests)
            .map(|r| r.elapsed_ms)
            .collect();
        let (scenario_name, description) = match mode {
            StagingMode::Gradual => (
                format!("Gradual ramp-up: {}", scenario.name),
                format!("User count raised in {} stages", stages.len()),
            ),
            StagingMode::Burst => (
                format!("Burst traffic: {}", scenario.name),
                "Traffic arriving in bursts of varying size".to_string(),
            ),
        };
        Self {
            scenario_name,
            description,
            mode,
            total_users: scenario.concurrent_users,
            total_requests: times.len(),
            average_response_ms: average(&times),
            success_rate: success_rate(stages.iter().flat_map(AggregateResult::requests)),
            latency: LatencyDistribution::from_samples(&times),
            comparison: stages.iter().map(StageComparison::from_stage).collect(),
            stages,
        }
    }
}

// =============================================================================
// Custom runs
// =============================================================================

/// Traffic shape of a custom run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrafficPattern {
    /// All users at once
    #[default]
    Uniform,
    /// Gradual ramp-up
    Gradual,
    /// Burst waves
    Burst,
}

impl fmt::Display for TrafficPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uniform => write!(f, "uniform"),
            Self::Gradual => write!(f, "gradual"),
            Self::Burst => write!(f, "burst"),
        }
    }
}

/// Ad-hoc run over an equal-weight action mix
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomLoadTest {
    /// Target users
    pub users: usize,
    /// Actions, weighted `1 / n` each
    pub actions: Vec<UserAction>,
    /// Traffic shape
    #[serde(default)]
    pub pattern: TrafficPattern,
}

impl CustomLoadTest {
    /// Production scenario equivalent to this run
    pub fn to_scenario(&self) -> ProductionScenario {
        let weight = guarded_ratio(1.0, self.actions.len() as f64);
        self.actions.iter().cloned().fold(
            ProductionScenario::new(
                &format!("Custom test: {} users, {} traffic", self.users, self.pattern),
                "Run with a custom configuration",
                self.users,
            ),
            |scenario, action| scenario.with_action(action, weight),
        )
    }
}

/// Result of a custom run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoadOutcome {
    /// Uniform run
    Single(AggregateResult),
    /// Gradual or burst run
    Staged(StagedResult),
}

// =============================================================================
// Scheduler
// =============================================================================

/// Lifecycle of a scheduler run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Nothing running
    #[default]
    Idle,
    /// Users in flight
    Running,
    /// Building the aggregate
    Aggregating,
    /// Last run finished
    Complete,
    /// Last run was cancelled
    Cancelled,
}

/// Drives production scenarios and staged traffic
#[derive(Clone)]
pub struct LoadPatternScheduler {
    executor: Arc<dyn RequestExecutor>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    config: HarnessConfig,
    state: Arc<Mutex<RunState>>,
}

impl fmt::Debug for LoadPatternScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadPatternScheduler")
            .field("state", &self.state())
            .field("ramp_stages", &self.config.ramp_stages)
            .finish_non_exhaustive()
    }
}

impl LoadPatternScheduler {
    /// Scheduler with default configuration and no progress output
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            executor,
            reporter: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
            config: HarnessConfig::default(),
            state: Arc::new(Mutex::new(RunState::Idle)),
        }
    }

    /// Set the progress reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set stage and phase configuration
    #[must_use]
    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Token that cancels this scheduler's work
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.state.lock().map_or(RunState::Idle, |s| *s)
    }

    fn transition(&self, scenario: &str, next: RunState) {
        if let Ok(mut state) = self.state.lock() {
            tracing::debug!(scenario, from = ?*state, to = ?next, "run state");
            *state = next;
        }
    }

    /// Run every assigned user concurrently and aggregate
    pub async fn run_scenario(
        &self,
        scenario: &ProductionScenario,
    ) -> LoadscopeResult<AggregateResult> {
        scenario.validate()?;
        let assigned: Vec<UserAction> = scenario.assign_users().into_iter().cloned().collect();

        tracing::info!(
            scenario = %scenario.name,
            nominal_users = scenario.concurrent_users,
            users = assigned.len(),
            "load test started"
        );
        if assigned.len() != scenario.concurrent_users {
            tracing::debug!(
                scenario = %scenario.name,
                nominal = scenario.concurrent_users,
                realized = assigned.len(),
                "weight rounding changed the user count"
            );
        }
        self.transition(&scenario.name, RunState::Running);

        let tracker = ProgressTracker::new(assigned.len(), &scenario.name, Arc::clone(&self.reporter));
        let start = Instant::now();
        let roster: Vec<(usize, String)> = assigned
            .iter()
            .enumerate()
            .map(|(index, action)| (index, action.name.clone()))
            .collect();
        let mut set = JoinSet::new();
        for (user_index, action) in assigned.into_iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let cancel = self.cancel.clone();
            set.spawn(async move { simulate_user(executor, user_index, action, cancel).await });
        }

        let mut users = Vec::with_capacity(set.len());
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    set.abort_all();
                    while set.join_next().await.is_some() {}
                    return Err(self.cancelled(&scenario.name));
                }
                joined = set.join_next() => match joined {
                    Some(Ok(Some(user))) => {
                        users.push(user);
                        tracker.advance();
                    }
                    Some(Ok(None)) => {
                        set.abort_all();
                        while set.join_next().await.is_some() {}
                        return Err(self.cancelled(&scenario.name));
                    }
                    Some(Err(err)) => {
                        tracing::error!(scenario = %scenario.name, error = %err, "user task failed to join");
                        tracker.advance();
                    }
                    None => break,
                },
            }
        }
        fill_unjoined_users(&roster, &mut users);
        let total_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.transition(&scenario.name, RunState::Aggregating);
        let result = AggregateResult::from_users(scenario, users, total_time_ms);
        self.transition(&scenario.name, RunState::Complete);

        tracing::info!(
            scenario = %result.scenario_name,
            users = result.concurrent_users,
            total_requests = result.total_requests,
            success_rate = result.success_rate,
            throughput = result.throughput,
            "load test finished"
        );
        self.reporter.on_load_complete(&result);
        Ok(result)
    }

    fn cancelled(&self, scenario: &str) -> LoadscopeError {
        tracing::warn!(scenario, "load test cancelled");
        self.transition(scenario, RunState::Cancelled);
        LoadscopeError::cancelled(scenario)
    }

    /// Ramp users up over `stages` sequential stages
    pub async fn run_gradual(
        &self,
        scenario: &ProductionScenario,
        stages: usize,
    ) -> LoadscopeResult<StagedResult> {
        if stages == 0 {
            return Err(LoadscopeError::config("gradual runs need at least one stage"));
        }
        let sizes = gradual_stage_sizes(scenario.concurrent_users, stages);
        let mut results = Vec::with_capacity(stages);
        for (k, users) in sizes.into_iter().enumerate() {
            let name = format!("{} - stage {}/{} ({} users)", scenario.name, k + 1, stages, users);
            tracing::info!(stage = %name, users, "gradual stage");
            results.push(self.run_scenario(&scenario.scaled(name, users)).await?);
        }
        Ok(StagedResult::from_stages(StagingMode::Gradual, scenario, results))
    }

    /// Ramp over the configured stage count
    pub async fn run_gradual_default(
        &self,
        scenario: &ProductionScenario,
    ) -> LoadscopeResult<StagedResult> {
        self.run_gradual(scenario, self.config.ramp_stages).await
    }

    /// Run the configured burst phases in sequence
    pub async fn run_burst(&self, scenario: &ProductionScenario) -> LoadscopeResult<StagedResult> {
        self.config.validate()?;
        let phases = &self.config.burst_phases;
        let sizes = burst_phase_sizes(scenario.concurrent_users, phases);
        let mut results = Vec::with_capacity(phases.len());
        for (phase, users) in phases.iter().zip(sizes) {
            let name = format!("{} - {} ({} users)", scenario.name, phase.name, users);
            tracing::info!(phase = %name, users, "burst phase");
            results.push(self.run_scenario(&scenario.scaled(name, users)).await?);
        }
        Ok(StagedResult::from_stages(StagingMode::Burst, scenario, results))
    }

    /// Equal-weight run dispatched on its traffic pattern
    pub async fn run_custom(&self, test: &CustomLoadTest) -> LoadscopeResult<LoadOutcome> {
        if test.actions.is_empty() {
            return Err(LoadscopeError::invalid_scenario(
                "custom run needs at least one action",
            ));
        }
        let scenario = test.to_scenario();
        tracing::info!(
            users = test.users,
            actions = test.actions.len(),
            pattern = %test.pattern,
            "custom load test"
        );
        match test.pattern {
            TrafficPattern::Uniform => self.run_scenario(&scenario).await.map(LoadOutcome::Single),
            TrafficPattern::Gradual => self
                .run_gradual_default(&scenario)
                .await
                .map(LoadOutcome::Staged),
            TrafficPattern::Burst => self.run_burst(&scenario).await.map(LoadOutcome::Staged),
        }
    }
}

/// Record every roster entry without a result as a failed user
fn fill_unjoined_users(roster: &[(usize, String)], users: &mut Vec<UserResult>) {
    for (index, action_name) in roster {
        if !users.iter().any(|u| u.user_index == *index) {
            users.push(UserResult::failed(*index, action_name));
        }
    }
}

/// Walk one user's pages. `None` when cancelled.
async fn simulate_user(
    executor: Arc<dyn RequestExecutor>,
    user_index: usize,
    action: UserAction,
    cancel: CancellationToken,
) -> Option<UserResult> {
    let mut pages = Vec::with_capacity(action.pages.len());
    for page in &action.pages {
        let batch = page.expand();
        let start = Instant::now();
        let outcome = run_batch(&executor, &batch, None, &cancel).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(results) => {
                tracing::debug!(user = user_index, page = %page.name, elapsed_ms, "page loaded");
                pages.push(PageResult::completed(&page.name, elapsed_ms, results));
            }
            Err(BatchError::Join(err)) => {
                tracing::error!(user = user_index, page = %page.name, error = %err, "page batch failed to join");
                pages.push(PageResult::failed(&page.name, elapsed_ms));
            }
            Err(BatchError::Cancelled) => return None,
        }
    }
    Some(UserResult::from_pages(user_index, &action.name, pages))
}
