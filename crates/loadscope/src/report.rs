//! Report rendering: text tables, JSON, Markdown and run comparison.

use crate::load::{AggregateResult, StagedResult};
use crate::metrics::{guarded_ratio, ErrorAnalysis, LatencyDistribution};
use crate::result::LoadscopeResult;
use crate::scenario::ScenarioMetrics;
use serde::{Deserialize, Serialize};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

/// Latency change (%) beyond which a comparison counts as better or worse
pub const LATENCY_TOLERANCE_PCT: f64 = 5.0;
/// Success-rate change (percentage points) beyond which a comparison counts
pub const SUCCESS_TOLERANCE_PTS: f64 = 1.0;

// =============================================================================
// Text reports
// =============================================================================

fn push_latency(out: &mut String, latency: &LatencyDistribution) {
    out.push_str("Latency:\n");
    out.push_str("┌─────────┬─────────┬─────────┬─────────┬─────────┬─────────┐\n");
    out.push_str("│ p50     │ p90     │ p95     │ p99     │ mean    │ stddev  │\n");
    out.push_str("├─────────┼─────────┼─────────┼─────────┼─────────┼─────────┤\n");
    out.push_str(&format!(
        "│ {:>5.0}ms │ {:>5.0}ms │ {:>5.0}ms │ {:>5.0}ms │ {:>5.0}ms │ {:>5.0}ms │\n",
        latency.p50, latency.p90, latency.p95, latency.p99, latency.mean, latency.std_dev
    ));
    out.push_str("└─────────┴─────────┴─────────┴─────────┴─────────┴─────────┘\n\n");
}

fn push_errors(out: &mut String, errors: Option<&ErrorAnalysis>) {
    let Some(errors) = errors else {
        out.push_str("Errors: none\n");
        return;
    };
    out.push_str(&format!(
        "Errors: {} ({:.2}%)\n",
        errors.count,
        errors.rate * 100.0
    ));
    for (message, count) in &errors.error_types {
        out.push_str(&format!("  {:>5} × {}\n", count, truncate(message, 60)));
    }
}

/// Render a scenario run
pub fn render_scenario_report(metrics: &ScenarioMetrics) -> String {
    let mut out = String::new();

    out.push_str(&format!("SCENARIO RESULTS: {}\n", metrics.scenario_name));
    out.push_str(RULE);
    if !metrics.description.is_empty() {
        out.push_str(&format!("{}\n", metrics.description));
    }
    out.push('\n');

    out.push_str(&format!(
        "Requests: {} ({} collected) │ Iterations: {} │ Success: {:.1}%\n",
        metrics.total_requests,
        metrics.completed_requests,
        metrics.iterations,
        metrics.success_rate * 100.0
    ));
    out.push_str(&format!(
        "Elapsed: {:.0}ms │ Theoretical: {:.0}ms/iteration │ Efficiency: {:.1}% │ Overhead: {:.0}ms\n",
        metrics.total_elapsed_ms,
        metrics.theoretical_elapsed_ms,
        metrics.efficiency,
        metrics.overhead_ms
    ));
    out.push_str(&format!(
        "Avg iteration: {:.0}ms │ Avg request: {:.0}ms │ Avg timeout: {:.0}ms\n",
        metrics.average_iteration_ms, metrics.average_request_ms, metrics.average_timeout_ms
    ));
    if !metrics.failed_iterations.is_empty() {
        out.push_str(&format!(
            "Failed iterations: {:?}\n",
            metrics.failed_iterations
        ));
    }
    out.push('\n');

    push_latency(&mut out, &metrics.latency);

    out.push_str("Connections:\n");
    match metrics.connections.session {
        Some(session) => out.push_str(&format!(
            "  Session: avg total {:.1}, avg active {:.1}, max threads {} connected / {} running, max used {}\n",
            session.average_total_connections,
            session.average_active_connections,
            session.max_threads_connected,
            session.max_threads_running,
            session.max_used_connections
        )),
        None => out.push_str("  Session: no telemetry\n"),
    }
    match metrics.connections.pool {
        Some(pool) => out.push_str(&format!(
            "  Pool: max {}, avg current {:.1}, avg available {:.1}, wait timeout {}\n",
            pool.max_connections,
            pool.average_current_connections,
            pool.average_available_connections,
            pool.wait_timeout
        )),
        None => out.push_str("  Pool: no telemetry\n"),
    }
    if let Some(queries) = metrics.connections.queries {
        out.push_str(&format!(
            "  Queries: {} executed, avg delay {:.2}s, avg actual {:.2}s, avg overrun {:.3}s\n",
            queries.count,
            queries.average_delay_seconds,
            queries.average_actual_seconds,
            queries.average_overrun_seconds
        ));
    }
    out.push('\n');

    let analysis = &metrics.analysis;
    out.push_str("Analysis:\n");
    out.push_str(&format!(
        "  Throughput: {:.2} req/s │ Avg response: {:.1}ms\n",
        analysis.throughput, analysis.average_response_time
    ));
    out.push_str(&format!(
        "  Connection efficiency: {:.2} │ utilization: {:.2} │ concurrency impact: {:.2}\n",
        analysis.connection_efficiency,
        analysis.connection_utilization,
        analysis.concurrency_impact
    ));
    out.push_str(&format!(
        "  Connection reuse: {:.2} │ stability: {:.2}\n\n",
        analysis.resource_efficiency.connection_reuse,
        analysis.resource_efficiency.connection_stability
    ));

    push_errors(&mut out, metrics.errors.as_ref());
    out
}

/// Render a simulated-user run
pub fn render_load_report(result: &AggregateResult) -> String {
    let mut out = String::new();

    out.push_str(&format!("LOAD TEST RESULTS: {}\n", result.scenario_name));
    out.push_str(RULE);
    out.push('\n');

    out.push_str(&format!(
        "Users: {} (nominal {}) │ Requests: {} │ Success: {:.1}% │ Failed: {:.1}%\n",
        result.concurrent_users,
        result.nominal_users,
        result.total_requests,
        result.success_rate * 100.0,
        result.failure_rate * 100.0
    ));
    out.push_str(&format!(
        "Duration: {:.0}ms │ Throughput: {:.2} req/s │ Response: avg {:.0}ms, min {:.0}ms, max {:.0}ms\n\n",
        result.total_time_ms,
        result.throughput,
        result.average_response_ms,
        result.min_response_ms,
        result.max_response_ms
    ));
    if result.failed_users > 0 {
        out.push_str(&format!("Unjoined users: {}\n\n", result.failed_users));
    }

    push_latency(&mut out, &result.latency);

    out.push_str(&format!(
        "Pages (avg load {:.0}ms):\n",
        result.average_page_load_time
    ));
    out.push_str("┌──────────────────────────┬─────────┬─────────┬─────────┬─────────┐\n");
    out.push_str("│ Page                     │ Visits  │ Avg     │ Min     │ Max     │\n");
    out.push_str("├──────────────────────────┼─────────┼─────────┼─────────┼─────────┤\n");
    for page in &result.page_timelines {
        out.push_str(&format!(
            "│ {:<24} │ {:>7} │ {:>5.0}ms │ {:>5.0}ms │ {:>5.0}ms │\n",
            truncate(&page.name, 24),
            page.times.len(),
            page.average,
            page.min,
            page.max
        ));
    }
    out.push_str("└──────────────────────────┴─────────┴─────────┴─────────┴─────────┘\n\n");

    out.push_str("Complexity:\n");
    for (tag, share) in &result.complexity.distribution {
        let avg = result
            .complexity
            .average_times
            .get(tag)
            .map_or_else(|| "-".to_string(), |ms| format!("{ms:.0}ms"));
        out.push_str(&format!(
            "  {:<6} {:>5.1}% of requests, avg {}\n",
            tag.to_string(),
            share * 100.0,
            avg
        ));
    }
    out.push('\n');

    push_errors(&mut out, result.errors.as_ref());
    out
}

/// Render a gradual or burst run
pub fn render_staged_report(result: &StagedResult) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "{} RESULTS: {}\n",
        result.mode.to_string().to_uppercase(),
        result.scenario_name
    ));
    out.push_str(RULE);
    out.push_str(&format!("{}\n\n", result.description));

    out.push_str(&format!(
        "Target users: {} │ Requests: {} │ Avg response: {:.0}ms │ Success: {:.1}%\n\n",
        result.total_users,
        result.total_requests,
        result.average_response_ms,
        result.success_rate * 100.0
    ));

    out.push_str("Stages:\n");
    out.push_str("┌──────────────────────────────┬─────────┬─────────┬─────────┬──────────┬─────────┐\n");
    out.push_str("│ Stage                        │ Users   │ Avg     │ p95     │ Req/s    │ Success │\n");
    out.push_str("├──────────────────────────────┼─────────┼─────────┼─────────┼──────────┼─────────┤\n");
    for stage in &result.comparison {
        out.push_str(&format!(
            "│ {:<28} │ {:>7} │ {:>5.0}ms │ {:>5.0}ms │ {:>8.2} │ {:>6.1}% │\n",
            truncate(&stage.name, 28),
            stage.user_count,
            stage.average_response_ms,
            stage.p95,
            stage.throughput,
            stage.success_rate * 100.0
        ));
    }
    out.push_str("└──────────────────────────────┴─────────┴─────────┴─────────┴──────────┴─────────┘\n\n");

    push_latency(&mut out, &result.latency);
    out
}

/// Pretty JSON for any result type
pub fn to_json<T: Serialize>(value: &T) -> LoadscopeResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

const TABLE_HEADER: &str = "\
| Scenario | Iterations | Requests | Success | Avg (ms) | P95 (ms) | Efficiency | Overhead (ms) | Req/s |
|----------|------------|----------|---------|----------|----------|------------|---------------|-------|";

/// Markdown row for one scenario run
pub fn to_markdown_row(metrics: &ScenarioMetrics) -> String {
    format!(
        "| {} | {} | {} | {:.1}% | {:.1} | {:.1} | {:.1}% | {:.1} | {:.2} |",
        metrics.scenario_name.replace('|', "/"),
        metrics.iterations,
        metrics.total_requests,
        metrics.success_rate * 100.0,
        metrics.average_request_ms,
        metrics.latency.p95,
        metrics.efficiency,
        metrics.overhead_ms,
        metrics.analysis.throughput,
    )
}

/// Markdown table over several scenario runs
pub fn to_markdown_table(results: &[ScenarioMetrics]) -> String {
    let mut lines = vec![
        "## Scenario Results".to_string(),
        String::new(),
        TABLE_HEADER.to_string(),
    ];
    lines.extend(results.iter().map(to_markdown_row));
    lines.push(String::new());
    lines.join("\n")
}

// =============================================================================
// Comparison
// =============================================================================

/// Headline numbers of one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSnapshot {
    /// Run name
    pub name: String,
    /// Successful / issued
    pub success_rate: f64,
    /// Mean call time
    pub average_response_ms: f64,
    /// 95th percentile call time
    pub p95_ms: f64,
    /// Requests per second
    pub throughput: f64,
}

/// Runs that can be compared
pub trait Comparable {
    /// Headline numbers
    fn snapshot(&self) -> RunSnapshot;
}

impl Comparable for AggregateResult {
    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            name: self.scenario_name.clone(),
            success_rate: self.success_rate,
            average_response_ms: self.average_response_ms,
            p95_ms: self.latency.p95,
            throughput: self.throughput,
        }
    }
}

impl Comparable for ScenarioMetrics {
    fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            name: self.scenario_name.clone(),
            success_rate: self.success_rate,
            average_response_ms: self.average_request_ms,
            p95_ms: self.latency.p95,
            throughput: self.analysis.throughput,
        }
    }
}

/// Comparison verdict
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComparisonVerdict {
    /// Candidate is better
    Improved,
    /// Within tolerance
    Unchanged,
    /// Candidate is worse
    Regressed,
}

impl ComparisonVerdict {
    /// Get symbol for display
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Improved => "↑",
            Self::Unchanged => "≈",
            Self::Regressed => "↓",
        }
    }

    /// Upper-case label
    pub const fn label(self) -> &'static str {
        match self {
            Self::Improved => "IMPROVED",
            Self::Unchanged => "UNCHANGED",
            Self::Regressed => "REGRESSED",
        }
    }
}

/// Candidate run measured against a baseline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunComparison {
    /// Baseline numbers
    pub baseline: RunSnapshot,
    /// Candidate numbers
    pub candidate: RunSnapshot,
    /// Success-rate change, percentage points
    pub success_rate_delta: f64,
    /// Average response change (%)
    pub average_response_change: f64,
    /// p95 change (%)
    pub p95_change: f64,
    /// Throughput change (%)
    pub throughput_change: f64,
    /// Overall verdict
    pub verdict: ComparisonVerdict,
}

fn percent_change(baseline: f64, candidate: f64) -> f64 {
    guarded_ratio(candidate - baseline, baseline) * 100.0
}

impl RunComparison {
    /// Compare two runs of the same kind
    pub fn compare<T: Comparable>(baseline: &T, candidate: &T) -> Self {
        let baseline = baseline.snapshot();
        let candidate = candidate.snapshot();
        let success_rate_delta = (candidate.success_rate - baseline.success_rate) * 100.0;
        let average_response_change =
            percent_change(baseline.average_response_ms, candidate.average_response_ms);

        let worse = success_rate_delta < -SUCCESS_TOLERANCE_PTS
            || average_response_change > LATENCY_TOLERANCE_PCT;
        let better = success_rate_delta > SUCCESS_TOLERANCE_PTS
            || average_response_change < -LATENCY_TOLERANCE_PCT;
        let verdict = if worse {
            ComparisonVerdict::Regressed
        } else if better {
            ComparisonVerdict::Improved
        } else {
            ComparisonVerdict::Unchanged
        };

        Self {
            success_rate_delta,
            average_response_change,
            p95_change: percent_change(baseline.p95_ms, candidate.p95_ms),
            throughput_change: percent_change(baseline.throughput, candidate.throughput),
            verdict,
            baseline,
            candidate,
        }
    }
}

fn format_change(change: f64) -> String {
    if change >= 0.0 {
        format!("+{change:.1}%")
    } else {
        format!("{change:.1}%")
    }
}

fn latency_hint(change: f64) -> &'static str {
    if change < -LATENCY_TOLERANCE_PCT {
        "↑ Better"
    } else if change > LATENCY_TOLERANCE_PCT {
        "↓ Worse"
    } else {
        "≈ Same"
    }
}

/// Render a comparison table
pub fn render_comparison(comp: &RunComparison) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "COMPARISON: {} vs {}\n",
        comp.candidate.name, comp.baseline.name
    ));
    out.push_str(RULE);
    out.push('\n');

    out.push_str("┌────────────────┬────────────┬────────────┐\n");
    out.push_str("│ Metric         │ Change     │ Status     │\n");
    out.push_str("├────────────────┼────────────┼────────────┤\n");
    out.push_str(&format!(
        "│ Success Rate   │ {:>9.1}pt │ {:>10} │\n",
        comp.success_rate_delta,
        if comp.success_rate_delta > SUCCESS_TOLERANCE_PTS {
            "↑ Better"
        } else if comp.success_rate_delta < -SUCCESS_TOLERANCE_PTS {
            "↓ Worse"
        } else {
            "≈ Same"
        }
    ));
    out.push_str(&format!(
        "│ Avg Response   │ {:>10} │ {:>10} │\n",
        format_change(comp.average_response_change),
        latency_hint(comp.average_response_change)
    ));
    out.push_str(&format!(
        "│ p95 Latency    │ {:>10} │ {:>10} │\n",
        format_change(comp.p95_change),
        latency_hint(comp.p95_change)
    ));
    out.push_str(&format!(
        "│ Throughput     │ {:>10} │ {:>10} │\n",
        format_change(comp.throughput_change),
        if comp.throughput_change > LATENCY_TOLERANCE_PCT {
            "↑ Better"
        } else if comp.throughput_change < -LATENCY_TOLERANCE_PCT {
            "↓ Worse"
        } else {
            "≈ Same"
        }
    ));
    out.push_str("└────────────────┴────────────┴────────────┘\n\n");

    out.push_str(&format!(
        "Overall: {} {}\n",
        comp.verdict.symbol(),
        comp.verdict.label()
    ));
    out
}

/// Truncate to `max` characters
fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(max.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::{
        Complexity, EndpointDescriptor, ProductionScenario, RequestSpec, ScenarioSpec,
    };
    use crate::client::{FailureKind, RequestResult};
    use crate::load::{PageResult, StagingMode, UserResult};
    use crate::scenario::IterationResult;
    use chrono::Utc;
    use serde_json::json;

    fn scenario_metrics(name: &str, elapsed: f64, fail: bool) -> ScenarioMetrics {
        let request = RequestSpec::new(EndpointDescriptor::new("wait", "Wait")).with_timeout(0.1);
        let spec = ScenarioSpec::new(name, "report test").with_repeated(&request, 2);
        let results = vec![
            RequestResult::from_success(&request, elapsed, json!({})),
            if fail {
                RequestResult::from_failure(&request, elapsed, FailureKind::Status, "HTTP 500")
            } else {
                RequestResult::from_success(&request, elapsed, json!({}))
            },
        ];
        let iteration = IterationResult::completed(0, results, elapsed, Utc::now());
        ScenarioMetrics::compute(&spec, vec![iteration], elapsed)
    }

    fn aggregate(name: &str, ms: f64) -> AggregateResult {
        let request = RequestSpec::new(EndpointDescriptor::new("read", "Read"))
            .with_complexity(Complexity::Low);
        let page = PageResult::completed(
            "listing",
            ms,
            vec![RequestResult::from_success(&request, ms, json!({}))],
        );
        let user = UserResult::from_pages(0, "browse", vec![page]);
        AggregateResult::from_users(&ProductionScenario::new(name, "", 1), vec![user], ms)
    }

    #[test]
    fn test_render_scenario_report() {
        let report = render_scenario_report(&scenario_metrics("wait suite", 120.0, true));
        assert!(report.contains("SCENARIO RESULTS: wait suite"));
        assert!(report.contains("Efficiency"));
        assert!(report.contains("Session: no telemetry"));
        assert!(report.contains("HTTP 500"));
    }

    #[test]
    fn test_render_load_report() {
        let report = render_load_report(&aggregate("shop", 40.0));
        assert!(report.contains("LOAD TEST RESULTS: shop"));
        assert!(report.contains("listing"));
        assert!(report.contains("low"));
        assert!(report.contains("Errors: none"));
    }

    #[test]
    fn test_render_staged_report() {
        let scenario = ProductionScenario::new("shop", "", 2);
        let staged = StagedResult::from_stages(
            StagingMode::Burst,
            &scenario,
            vec![aggregate("shop - peak load", 40.0)],
        );
        let report = render_staged_report(&staged);
        assert!(report.starts_with("BURST RESULTS"));
        assert!(report.contains("shop - peak load"));
    }

    #[test]
    fn test_to_json() {
        let json = to_json(&scenario_metrics("json", 100.0, false)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["scenario_name"], "json");
        assert_eq!(value["total_requests"], 2);
    }

    #[test]
    fn test_to_json_reports_serializer_errors() {
        let unkeyable = std::collections::BTreeMap::from([((1_u8, 2_u8), 3_u8)]);
        let err = to_json(&unkeyable).unwrap_err();
        assert!(matches!(err, crate::result::LoadscopeError::Json(_)));
    }

    #[test]
    fn test_markdown_table() {
        let table = to_markdown_table(&[
            scenario_metrics("a|b", 100.0, false),
            scenario_metrics("c", 100.0, false),
        ]);
        assert!(table.contains("| Scenario |"));
        assert!(table.contains("| a/b | 1 | 2 |"));
        assert_eq!(table.lines().filter(|l| l.starts_with("| ")).count(), 3);
    }

    #[test]
    fn test_comparison_of_aggregates() {
        let comp = RunComparison::compare(&aggregate("sync", 100.0), &aggregate("async", 50.0));
        assert!((comp.average_response_change + 50.0).abs() < 1e-9);
        assert_eq!(comp.verdict, ComparisonVerdict::Improved);
        let output = render_comparison(&comp);
        assert!(output.contains("async vs sync"));
        assert!(output.contains("IMPROVED"));
    }

    #[test]
    fn test_comparison_regression_on_success_rate() {
        let comp = RunComparison::compare(
            &scenario_metrics("before", 100.0, false),
            &scenario_metrics("after", 100.0, true),
        );
        assert!((comp.success_rate_delta + 50.0).abs() < 1e-9);
        assert_eq!(comp.verdict, ComparisonVerdict::Regressed);
    }

    #[test]
    fn test_comparison_unchanged() {
        let comp = RunComparison::compare(&aggregate("a", 100.0), &aggregate("b", 102.0));
        assert_eq!(comp.verdict, ComparisonVerdict::Unchanged);
        assert_eq!(ComparisonVerdict::Unchanged.symbol(), "≈");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is long", 8), "this is…");
    }
}
