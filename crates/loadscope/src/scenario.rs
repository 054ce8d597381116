//! Scenario execution: repeated concurrent batches and their metrics.
//!
//! Each iteration spawns the whole request list, waits for every call to
//! settle, then starts the next one. Metrics are derived once, after the last
//! iteration, by [`ScenarioMetrics::compute`].

use crate::batch::{run_batch, BatchError};
use crate::catalog::ScenarioSpec;
use crate::client::{IterationTag, RequestExecutor, RequestResult};
use crate::metrics::{
    average, guarded_ratio, success_rate, Analysis, ConnectionMetrics, ErrorAnalysis,
    LatencyDistribution,
};
use crate::progress::{NoopProgress, ProgressReporter, ProgressTracker};
use crate::result::{LoadscopeError, LoadscopeResult};
use crate::telemetry::TelemetryTimeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One settled iteration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationResult {
    /// Zero-based index
    pub index: usize,
    /// Tagged results, empty when the iteration failed
    pub results: Vec<RequestResult>,
    /// Wall-clock time of the iteration
    pub elapsed_ms: f64,
    /// When the iteration settled
    pub finished_at: DateTime<Utc>,
    /// The batch could not be joined
    pub failed: bool,
}

impl IterationResult {
    /// Iteration whose batch joined; tags every result with the iteration
    pub fn completed(
        index: usize,
        results: Vec<RequestResult>,
        elapsed_ms: f64,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let tag = IterationTag { index, elapsed_ms };
        Self {
            index,
            results: results.into_iter().map(|r| r.with_iteration(tag)).collect(),
            elapsed_ms,
            finished_at,
            failed: false,
        }
    }

    /// Iteration whose batch could not be joined
    pub fn failed(index: usize, elapsed_ms: f64, finished_at: DateTime<Utc>) -> Self {
        Self {
            index,
            results: Vec::new(),
            elapsed_ms,
            finished_at,
            failed: true,
        }
    }
}

/// Everything derived from one scenario run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenarioMetrics {
    /// Run identifier
    pub run_id: Uuid,
    /// Scenario name
    pub scenario_name: String,
    /// Scenario description
    pub description: String,
    /// Whether the notification side should push an event for this run
    pub triggers_stream: bool,
    /// Iterations executed
    pub iterations: usize,
    /// Planned requests (batch size × iterations)
    pub total_requests: usize,
    /// Results actually collected
    pub completed_requests: usize,
    /// Indices of iterations whose batch failed to join
    pub failed_iterations: Vec<usize>,
    /// Wall-clock time of the whole run
    pub total_elapsed_ms: f64,
    /// Sum of advisory delays of one iteration
    pub theoretical_elapsed_ms: f64,
    /// Theoretical time × iterations
    pub total_theoretical_elapsed_ms: f64,
    /// Mean iteration time
    pub average_iteration_ms: f64,
    /// Every iteration time, in order
    pub iteration_times_ms: Vec<f64>,
    /// Mean call time
    pub average_request_ms: f64,
    /// Mean advisory delay per result
    pub average_timeout_ms: f64,
    /// Successful / collected results
    pub success_rate: f64,
    /// Theoretical / observed iteration time, as a percentage
    pub efficiency: f64,
    /// Observed iteration time minus theoretical time
    pub overhead_ms: f64,
    /// Call latency distribution
    pub latency: LatencyDistribution,
    /// Failure histogram, absent when nothing failed
    pub errors: Option<ErrorAnalysis>,
    /// Telemetry summaries
    pub connections: ConnectionMetrics,
    /// Raw telemetry
    pub telemetry: TelemetryTimeline,
    /// Derived ratios
    pub analysis: Analysis,
    /// Every collected result
    pub results: Vec<RequestResult>,
}

impl ScenarioMetrics {
    /// Derive metrics from settled iterations.
    ///
    /// Pure: the same input gives the same output. `run_id` is left nil; the
    /// runner assigns one with [`Self::with_run_id`].
    pub fn compute(
        scenario: &ScenarioSpec,
        iterations: Vec<IterationResult>,
        total_elapsed_ms: f64,
    ) -> Self {
        let iteration_count = scenario.iterations;
        let total_requests = scenario.total_requests();
        let theoretical_elapsed_ms = scenario.theoretical_elapsed_ms();
        let per_iteration_ms = guarded_ratio(total_elapsed_ms, iteration_count as f64);

        let iteration_times_ms: Vec<f64> = iterations.iter().map(|it| it.elapsed_ms).collect();
        let failed_iterations = iterations
            .iter()
            .filter(|it| it.failed)
            .map(|it| it.index)
            .collect();

        let mut telemetry = TelemetryTimeline::new();
        for iteration in &iterations {
            for result in &iteration.results {
                if let Some(payload) = result.payload() {
                    telemetry.record(iteration.index, result.completed_at, payload);
                }
            }
        }

        let results: Vec<RequestResult> = iterations.into_iter().flat_map(|it| it.results).collect();
        let latencies: Vec<f64> = results.iter().map(|r| r.elapsed_ms).collect();
        let timeouts: Vec<f64> = results.iter().map(RequestResult::advisory_delay_ms).collect();
        let connections = ConnectionMetrics::from_timeline(&telemetry);

        Self {
            run_id: Uuid::nil(),
            scenario_name: scenario.name.clone(),
            description: scenario.description.clone(),
            triggers_stream: scenario.triggers_stream,
            iterations: iteration_count,
            total_requests,
            completed_requests: results.len(),
            failed_iterations,
            total_elapsed_ms,
            theoretical_elapsed_ms,
            total_theoretical_elapsed_ms: theoretical_elapsed_ms * iteration_count as f64,
            average_iteration_ms: average(&iteration_times_ms),
            iteration_times_ms,
            average_request_ms: average(&latencies),
            average_timeout_ms: average(&timeouts),
            success_rate: success_rate(&results),
            efficiency: guarded_ratio(theoretical_elapsed_ms, per_iteration_ms) * 100.0,
            overhead_ms: per_iteration_ms - theoretical_elapsed_ms,
            latency: LatencyDistribution::from_samples(&latencies),
            errors: ErrorAnalysis::from_results(&results),
            analysis: Analysis::compute(total_requests, total_elapsed_ms, &connections),
            connections,
            telemetry,
            results,
        }
    }

    /// Assign the run identifier
    #[must_use]
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    /// Whether every iteration settled and every call succeeded
    pub fn is_clean(&self) -> bool {
        self.failed_iterations.is_empty() && self.errors.is_none()
    }
}

/// Runs scenarios against an executor
#[derive(Clone)]
pub struct ScenarioRunner {
    executor: Arc<dyn RequestExecutor>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl fmt::Debug for ScenarioRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioRunner")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ScenarioRunner {
    /// Runner with no progress output
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            executor,
            reporter: Arc::new(NoopProgress),
            cancel: CancellationToken::new(),
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

    /// Token that cancels this runner's work
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one scenario to completion
    pub async fn run(&self, scenario: &ScenarioSpec) -> LoadscopeResult<ScenarioMetrics> {
        scenario.validate()?;

        tracing::info!(
            scenario = %scenario.name,
            iterations = scenario.iterations,
            batch_size = scenario.batch_size(),
            "scenario started"
        );

        let tracker = Arc::new(ProgressTracker::new(
            scenario.total_requests(),
            &scenario.name,
            Arc::clone(&self.reporter),
        ));
        let run_start = Instant::now();
        let mut iterations = Vec::with_capacity(scenario.iterations);

        for index in 0..scenario.iterations {
            let start = Instant::now();
            let outcome =
                run_batch(&self.executor, &scenario.requests, Some(&tracker), &self.cancel).await;
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

            match outcome {
                Ok(results) => {
                    tracing::debug!(
                        scenario = %scenario.name,
                        iteration = index,
                        elapsed_ms,
                        "iteration settled"
                    );
                    iterations.push(IterationResult::completed(
                        index,
                        results,
                        elapsed_ms,
                        Utc::now(),
                    ));
                }
                Err(BatchError::Join(err)) => {
                    tracing::error!(
                        scenario = %scenario.name,
                        iteration = index,
                        error = %err,
                        "iteration batch failed to join"
                    );
                    iterations.push(IterationResult::failed(index, elapsed_ms, Utc::now()));
                }
                Err(BatchError::Cancelled) => {
                    tracing::warn!(scenario = %scenario.name, iteration = index, "scenario cancelled");
                    return Err(LoadscopeError::cancelled(&scenario.name));
                }
            }
        }

        let total_elapsed_ms = run_start.elapsed().as_secs_f64() * 1000.0;
        let metrics = ScenarioMetrics::compute(scenario, iterations, total_elapsed_ms)
            .with_run_id(Uuid::new_v4());

        tracing::info!(
            scenario = %metrics.scenario_name,
            run_id = %metrics.run_id,
            total_elapsed_ms = metrics.total_elapsed_ms,
            success_rate = metrics.success_rate,
            efficiency = metrics.efficiency,
            "scenario finished"
        );
        self.reporter.on_scenario_complete(&metrics);
        Ok(metrics)
    }

    /// Run scenarios one after another
    pub async fn run_all(&self, scenarios: &[ScenarioSpec]) -> LoadscopeResult<Vec<ScenarioMetrics>> {
        let mut all = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            all.push(self.run(scenario).await?);
        }
        Ok(all)
    }
}
