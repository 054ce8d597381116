//! Loadscope: concurrent HTTP scenario runner for comparing how a service
//! behaves under synchronous and asynchronous handling strategies.
//!
//! Two workloads are supported:
//!
//! - **Scenario runs**: a fixed batch of requests fired concurrently,
//!   repeated for a number of iterations, with latency, efficiency and
//!   connection telemetry collected per run.
//! - **Load runs**: simulated users, each performing a weighted user action
//!   made of page loads, run at once, ramped in stages, or in bursts.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐    ┌────────────────┐    ┌──────────────┐    ┌──────────┐
//! │ catalog /  │───►│ ScenarioRunner │───►│ Request      │───►│ service  │
//! │ presets    │    │ LoadPattern    │    │ Executor     │    │ under    │
//! │            │    │ Scheduler      │    │ (reqwest)    │    │ test     │
//! └────────────┘    └───────┬────────┘    └──────────────┘    └──────────┘
//!                           │
//!                           ▼
//!                  ┌─────────────────┐    ┌──────────────┐
//!                  │ metrics /       │───►│ report       │
//!                  │ telemetry       │    │ text / JSON  │
//!                  └─────────────────┘    └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use loadscope::{presets, HarnessConfig, HttpExecutor, ScenarioRunner};
//!
//! # async fn demo() -> loadscope::LoadscopeResult<()> {
//! let config = HarnessConfig::default().with_env_overrides()?;
//! let runner = ScenarioRunner::new(Arc::new(HttpExecutor::new(config)?));
//! for metrics in runner.run_all(&presets::wait_strategy_scenarios()).await? {
//!     println!("{}", loadscope::report::render_scenario_report(&metrics));
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod batch;

pub mod catalog;
pub mod client;
pub mod config;
pub mod load;
pub mod logging;
pub mod metrics;
pub mod presets;
pub mod progress;
pub mod report;
mod result;
pub mod scenario;
pub mod telemetry;

pub use catalog::{
    Complexity, EndpointDescriptor, PageLoadPattern, ProductionScenario, RequestSpec, RequestType,
    ScenarioSpec, UserAction, WeightedAction, WeightedRequest,
};
pub use client::{
    FailureKind, HttpExecutor, IterationTag, RequestExecutor, RequestOutcome, RequestResult,
};
pub use config::{BurstPhase, HarnessConfig, StatusPolicy};
pub use load::{
    AggregateResult, CustomLoadTest, LoadOutcome, LoadPatternScheduler, RunState, StagedResult,
    StagingMode, TrafficPattern,
};
pub use logging::{LogFormat, Verbosity};
pub use metrics::{Analysis, ConnectionMetrics, ErrorAnalysis, LatencyDistribution};
#[cfg(feature = "console")]
pub use progress::ConsoleProgress;
pub use progress::{NoopProgress, ProgressReporter, TracingProgress};
pub use report::{ComparisonVerdict, RunComparison};
pub use result::{LoadscopeError, LoadscopeResult};
pub use scenario::{IterationResult, ScenarioMetrics, ScenarioRunner};
pub use telemetry::TelemetryTimeline;
