//! Pure aggregation over raw results and telemetry.
//!
//! Nothing in this module performs I/O or holds state; the same input always
//! yields the same summary. Every ratio whose denominator is missing or zero
//! resolves to `0.0` rather than NaN or infinity.

use crate::client::RequestResult;
use crate::telemetry::{PoolSample, QueryExecutionSample, SessionSample, TelemetryTimeline};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Scalar helpers
// =============================================================================

/// Arithmetic mean, 0 on empty input
pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Smallest value, 0 on empty input
pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

/// Largest value, 0 on empty input
pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

/// Population standard deviation, 0 on empty input
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = average(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Element at `floor(n × p)` of a sorted slice, clamped to the last element
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() as f64 * p).floor().max(0.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// `num / den`, or 0 when the division is undefined
pub fn guarded_ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let ratio = num / den;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Share of successful results, 0 when there are none
pub fn success_rate<'a>(results: impl IntoIterator<Item = &'a RequestResult>) -> f64 {
    let (successful, total) = results
        .into_iter()
        .fold((0usize, 0usize), |(ok, total), r| (ok + usize::from(r.success()), total + 1));
    guarded_ratio(successful as f64, total as f64)
}

/// Sort a copy of the samples ascending
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

// =============================================================================
// Latency and errors
// =============================================================================

/// Latency percentiles and spread, in milliseconds
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencyDistribution {
    /// Median
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
    /// Mean
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    /// Fastest sample
    pub min: f64,
    /// Slowest sample
    pub max: f64,
}

impl LatencyDistribution {
    /// Summarize unsorted samples
    pub fn from_samples(samples: &[f64]) -> Self {
        let sorted = sorted(samples);
        Self {
            p50: percentile(&sorted, 0.50),
            p90: percentile(&sorted, 0.90),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            mean: average(&sorted),
            std_dev: std_dev(&sorted),
            min: min(&sorted),
            max: max(&sorted),
        }
    }
}

/// Failure histogram
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorAnalysis {
    /// Failed results
    pub count: usize,
    /// Failed / total
    pub rate: f64,
    /// Failures per message
    pub error_types: BTreeMap<String, usize>,
}

impl ErrorAnalysis {
    /// Histogram of failures, `None` when every result succeeded
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a RequestResult>) -> Option<Self> {
        let mut error_types = BTreeMap::new();
        let mut total = 0usize;
        for result in results {
            total += 1;
            if let Some((_, message)) = result.failure_info() {
                let key = if message.is_empty() { "Unknown" } else { message };
                *error_types.entry(key.to_string()).or_insert(0) += 1;
            }
        }
        let count: usize = error_types.values().sum();
        (count > 0).then(|| Self {
            count,
            rate: guarded_ratio(count as f64, total as f64),
            error_types,
        })
    }
}

// =============================================================================
// Connection telemetry
// =============================================================================

/// Session telemetry summary
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    /// Mean open connections
    pub average_total_connections: f64,
    /// Mean non-idle connections
    pub average_active_connections: f64,
    /// Peak `Threads_connected`
    pub max_threads_connected: u64,
    /// Peak `Threads_running`
    pub max_threads_running: u64,
    /// Peak `Max_used_connections`
    pub max_used_connections: u64,
}

impl SessionSummary {
    /// Summarize samples, `None` when there are none
    pub fn from_samples(samples: &[SessionSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let totals: Vec<f64> = samples.iter().map(|s| s.total_connections as f64).collect();
        let active: Vec<f64> = samples.iter().map(|s| s.active_connections as f64).collect();
        Some(Self {
            average_total_connections: average(&totals),
            average_active_connections: average(&active),
            max_threads_connected: samples.iter().map(|s| s.threads_connected).max().unwrap_or(0),
            max_threads_running: samples.iter().map(|s| s.threads_running).max().unwrap_or(0),
            max_used_connections: samples
                .iter()
                .map(|s| s.max_used_connections)
                .max()
                .unwrap_or(0),
        })
    }
}

/// Pool telemetry summary
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct PoolSummary {
    /// Capacity from the first sample
    pub max_connections: u64,
    /// Mean checked-out connections
    pub average_current_connections: f64,
    /// Mean free connections
    pub average_available_connections: f64,
    /// Wait timeout from the first sample
    pub wait_timeout: u64,
}

impl PoolSummary {
    /// Summarize samples, `None` when there are none
    pub fn from_samples(samples: &[PoolSample]) -> Option<Self> {
        let first = samples.first()?;
        let current: Vec<f64> = samples.iter().map(|s| s.current_connections as f64).collect();
        let available: Vec<f64> = samples
            .iter()
            .map(|s| s.available_connections as f64)
            .collect();
        Some(Self {
            max_connections: first.max_connections,
            average_current_connections: average(&current),
            average_available_connections: average(&available),
            wait_timeout: first.wait_timeout,
        })
    }
}

/// Multi-query execution summary
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct QuerySummary {
    /// Executions reported
    pub count: usize,
    /// Mean requested delay
    pub average_delay_seconds: f64,
    /// Mean measured duration
    pub average_actual_seconds: f64,
    /// Mean of `actual − delay`
    pub average_overrun_seconds: f64,
}

impl QuerySummary {
    /// Summarize samples, `None` when there are none
    pub fn from_samples(samples: &[QueryExecutionSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let delays: Vec<f64> = samples.iter().map(|s| s.delay_seconds).collect();
        let actual: Vec<f64> = samples.iter().map(|s| s.actual_duration_seconds).collect();
        let overrun: Vec<f64> = samples
            .iter()
            .map(|s| s.actual_duration_seconds - s.delay_seconds)
            .collect();
        Some(Self {
            count: samples.len(),
            average_delay_seconds: average(&delays),
            average_actual_seconds: average(&actual),
            average_overrun_seconds: average(&overrun),
        })
    }
}

/// All telemetry summaries of a run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectionMetrics {
    /// Session summary
    pub session: Option<SessionSummary>,
    /// Pool summary
    pub pool: Option<PoolSummary>,
    /// Query summary
    pub queries: Option<QuerySummary>,
}

impl ConnectionMetrics {
    /// Summarize a timeline
    pub fn from_timeline(timeline: &TelemetryTimeline) -> Self {
        Self {
            session: SessionSummary::from_samples(&timeline.sessions),
            pool: PoolSummary::from_samples(&timeline.pools),
            queries: QuerySummary::from_samples(&timeline.queries),
        }
    }
}

// =============================================================================
// Derived analysis
// =============================================================================

/// Connection reuse and stability ratios
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceEfficiency {
    /// Requests served per open connection
    pub connection_reuse: f64,
    /// `1 − |peak threads − mean active| / peak threads`
    pub connection_stability: f64,
}

/// Ratios derived from totals and telemetry
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    /// Share of pool capacity in use
    pub connection_efficiency: f64,
    /// Active / total connections
    pub connection_utilization: f64,
    /// Requests per second
    pub throughput: f64,
    /// Elapsed time per request, in milliseconds
    pub average_response_time: f64,
    /// Running / connected threads at peak
    pub concurrency_impact: f64,
    /// Reuse and stability
    pub resource_efficiency: ResourceEfficiency,
}

impl Analysis {
    /// Derive every ratio
    pub fn compute(
        total_requests: usize,
        total_elapsed_ms: f64,
        connections: &ConnectionMetrics,
    ) -> Self {
        let requests = total_requests as f64;
        let session = connections.session.unwrap_or_default();
        let max_threads_connected = session.max_threads_connected as f64;

        let connection_efficiency = connections.pool.map_or(0.0, |pool| {
            let max_pool = pool.max_connections as f64;
            guarded_ratio(max_pool - pool.average_available_connections, max_pool)
        });

        let connection_stability = if max_threads_connected > 0.0 {
            1.0 - guarded_ratio(
                (max_threads_connected - session.average_active_connections).abs(),
                max_threads_connected,
            )
        } else {
            0.0
        };

        Self {
            connection_efficiency,
            connection_utilization: guarded_ratio(
                session.average_active_connections,
                session.average_total_connections,
            ),
            throughput: guarded_ratio(requests, total_elapsed_ms / 1000.0),
            average_response_time: guarded_ratio(total_elapsed_ms, requests),
            concurrency_impact: guarded_ratio(
                session.max_threads_running as f64,
                max_threads_connected,
            ),
            resource_efficiency: ResourceEfficiency {
                connection_reuse: guarded_ratio(requests, session.average_total_connections),
                connection_stability,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::{EndpointDescriptor, RequestSpec};
    use crate::client::FailureKind;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;

    fn session(total: u64, active: u64, connected: u64, running: u64) -> SessionSample {
        SessionSample {
            iteration: 0,
            timestamp: Utc::now(),
            total_connections: total,
            active_connections: active,
            threads_connected: connected,
            threads_running: running,
            max_used_connections: connected,
        }
    }

    fn pool(max: u64, current: u64, available: u64) -> PoolSample {
        PoolSample {
            iteration: 0,
            timestamp: Utc::now(),
            max_connections: max,
            current_connections: current,
            available_connections: available,
            wait_timeout: 30,
        }
    }

    #[test]
    fn test_scalar_helpers_empty() {
        assert_eq!(average(&[]), 0.0);
        assert_eq!(min(&[]), 0.0);
        assert_eq!(max(&[]), 0.0);
        assert_eq!(std_dev(&[]), 0.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn test_scalar_helpers() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((average(&values) - 5.0).abs() < f64::EPSILON);
        assert!((std_dev(&values) - 2.0).abs() < f64::EPSILON);
        assert_eq!(min(&values), 2.0);
        assert_eq!(max(&values), 9.0);
    }

    #[test]
    fn test_percentile_floor_index() {
        let sorted: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(percentile(&sorted, 0.5), 6.0);
        assert_eq!(percentile(&sorted, 0.9), 10.0);
        assert_eq!(percentile(&sorted, 0.99), 10.0);
        assert_eq!(percentile(&[3.0], 0.99), 3.0);
    }

    #[test]
    fn test_guarded_ratio() {
        assert_eq!(guarded_ratio(1.0, 0.0), 0.0);
        assert_eq!(guarded_ratio(f64::INFINITY, 1.0), 0.0);
        assert_eq!(guarded_ratio(f64::NAN, 2.0), 0.0);
        assert_eq!(guarded_ratio(3.0, 2.0), 1.5);
    }

    #[test]
    fn test_error_analysis() {
        let spec = RequestSpec::new(EndpointDescriptor::new("x", "x"));
        let results = vec![
            RequestResult::from_success(&spec, 1.0, json!({})),
            RequestResult::from_failure(&spec, 1.0, FailureKind::Transport, "connection refused"),
            RequestResult::from_failure(&spec, 1.0, FailureKind::Transport, "connection refused"),
            RequestResult::from_failure(&spec, 1.0, FailureKind::Decode, ""),
        ];
        let errors = ErrorAnalysis::from_results(&results).unwrap();
        assert_eq!(errors.count, 3);
        assert!((errors.rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(errors.error_types["connection refused"], 2);
        assert_eq!(errors.error_types["Unknown"], 1);
        assert!(ErrorAnalysis::from_results(&results[..1]).is_none());
        assert!((success_rate(&results) - 0.25).abs() < f64::EPSILON);
        assert_eq!(success_rate(&Vec::<RequestResult>::new()), 0.0);
    }

    #[test]
    fn test_session_and_pool_summaries() {
        let sessions = vec![session(10, 2, 11, 3), session(20, 6, 15, 1)];
        let summary = SessionSummary::from_samples(&sessions).unwrap();
        assert!((summary.average_total_connections - 15.0).abs() < f64::EPSILON);
        assert!((summary.average_active_connections - 4.0).abs() < f64::EPSILON);
        assert_eq!(summary.max_threads_connected, 15);
        assert_eq!(summary.max_threads_running, 3);

        let pools = vec![pool(20, 5, 15), pool(40, 9, 11)];
        let summary = PoolSummary::from_samples(&pools).unwrap();
        assert_eq!(summary.max_connections, 20);
        assert!((summary.average_available_connections - 13.0).abs() < f64::EPSILON);
        assert!(PoolSummary::from_samples(&[]).is_none());
        assert!(SessionSummary::from_samples(&[]).is_none());
    }

    #[test]
    fn test_analysis_with_telemetry() {
        let connections = ConnectionMetrics {
            session: SessionSummary::from_samples(&[session(10, 5, 8, 4)]),
            pool: PoolSummary::from_samples(&[pool(20, 5, 15)]),
            queries: None,
        };
        let analysis = Analysis::compute(100, 2000.0, &connections);
        assert!((analysis.connection_efficiency - 0.25).abs() < 1e-12);
        assert!((analysis.connection_utilization - 0.5).abs() < 1e-12);
        assert!((analysis.throughput - 50.0).abs() < 1e-12);
        assert!((analysis.average_response_time - 20.0).abs() < 1e-12);
        assert!((analysis.concurrency_impact - 0.5).abs() < 1e-12);
        assert!((analysis.resource_efficiency.connection_reuse - 10.0).abs() < 1e-12);
        assert!((analysis.resource_efficiency.connection_stability - 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_analysis_without_telemetry_is_zero() {
        let analysis = Analysis::compute(10, 0.0, &ConnectionMetrics::default());
        assert_eq!(analysis.connection_efficiency, 0.0);
        assert_eq!(analysis.connection_utilization, 0.0);
        assert_eq!(analysis.throughput, 0.0);
        assert_eq!(analysis.concurrency_impact, 0.0);
        assert_eq!(analysis.resource_efficiency, ResourceEfficiency::default());
        assert!((analysis.average_response_time - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_query_summary() {
        let samples = vec![
            QueryExecutionSample {
                iteration: 0,
                delay_seconds: 0.5,
                actual_duration_seconds: 0.6,
            },
            QueryExecutionSample {
                iteration: 0,
                delay_seconds: 1.5,
                actual_duration_seconds: 1.6,
            },
        ];
        let summary = QuerySummary::from_samples(&samples).unwrap();
        assert_eq!(summary.count, 2);
        assert!((summary.average_delay_seconds - 1.0).abs() < 1e-12);
        assert!((summary.average_overrun_seconds - 0.1).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_percentiles_monotonic(samples in prop::collection::vec(0.0f64..10_000.0, 4..200)) {
            let dist = LatencyDistribution::from_samples(&samples);
            prop_assert!(dist.min <= dist.p50);
            prop_assert!(dist.p50 <= dist.p90);
            prop_assert!(dist.p90 <= dist.p95);
            prop_assert!(dist.p95 <= dist.p99);
            prop_assert!(dist.p99 <= dist.max);
        }

        #[test]
        fn prop_guarded_ratio_finite(num in any::<f64>(), den in any::<f64>()) {
            prop_assert!(guarded_ratio(num, den).is_finite());
        }
    }
}
