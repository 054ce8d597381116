//! End-to-end runs against an in-process axum stub service.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use loadscope::{
    BurstPhase, Complexity, EndpointDescriptor, FailureKind, HarnessConfig, HttpExecutor,
    LoadOutcome, LoadPatternScheduler, PageLoadPattern, ProductionScenario, RequestExecutor,
    RequestSpec, RequestType, RunState, ScenarioRunner, ScenarioSpec, StagingMode, StatusPolicy,
    TrafficPattern, UserAction,
};
use serde_json::{json, Value};

#[derive(Default)]
struct StubState {
    hits: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

struct Stub {
    addr: SocketAddr,
    state: Arc<StubState>,
}

impl Stub {
    fn config(&self) -> HarnessConfig {
        HarnessConfig::default()
            .with_base_url(format!("http://{}", self.addr))
            .with_api_prefix("/api")
    }

    fn executor(&self) -> Arc<dyn RequestExecutor> {
        Arc::new(HttpExecutor::new(self.config()).unwrap())
    }

    fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }
}

async fn wait(
    State(state): State<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.peak.fetch_max(now, Ordering::SeqCst);

    let secs = params
        .get("timeout")
        .and_then(|t| t.parse::<f64>().ok())
        .unwrap_or(0.02);
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    Json(json!({
        "status": "ok",
        "data": {
            "session_info": {
                "total_connections": 8,
                "active_connections": "3",
                "threads_connected": 8,
                "threads_running": 2,
                "max_used_connections": 12
            },
            "pool_info": {
                "max_connections": 20,
                "current_connections": 5,
                "available_connections": 15,
                "wait_timeout": 30
            }
        }
    }))
}

async fn bare(State(state): State<Arc<StubState>>) -> Json<Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "status": "ok" }))
}

async fn plain() -> &'static str {
    "not json"
}

async fn broken() -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "boom" })),
    )
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({}))
}

async fn spawn_stub() -> Stub {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route("/api/wait", get(wait))
        .route("/api/bare", get(bare))
        .route("/api/plain", get(plain))
        .route("/api/broken", get(broken))
        .route("/api/slow", get(slow))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Stub { addr, state }
}

fn wait_request(secs: f64) -> RequestSpec {
    RequestSpec::new(EndpointDescriptor::new("wait", "Wait").with_param("timeout"))
        .with_timeout(secs)
}

fn single(path: &str) -> ScenarioSpec {
    ScenarioSpec::new(path, "single call")
        .with_repeated(&RequestSpec::new(EndpointDescriptor::new(path, path)), 1)
}

fn browse_scenario(users: usize) -> ProductionScenario {
    let read = RequestType::new(
        EndpointDescriptor::new("wait", "Wait").with_param("query_count"),
        1,
        20,
        Complexity::Low,
    );
    let page = PageLoadPattern::new("listing", "product list").with_request(read, 0.1);
    let action = UserAction::new("browse", "open the listing", vec![page]);
    ProductionScenario::new("browse", "stub shoppers", users).with_action(action, 1.0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scenario_run_collects_totals_and_telemetry() {
    let stub = spawn_stub().await;
    let runner = ScenarioRunner::new(stub.executor());
    let scenario = ScenarioSpec::new("wait x4", "four concurrent waits")
        .with_repeated(&wait_request(0.05), 4)
        .with_iterations(3);

    let metrics = runner.run(&scenario).await.unwrap();

    assert_eq!(metrics.total_requests, 12);
    assert_eq!(metrics.completed_requests, 12);
    assert_eq!(stub.hits(), 12);
    assert_eq!(metrics.success_rate, 1.0);
    assert!(metrics.average_request_ms >= 50.0);
    assert!((metrics.average_timeout_ms - 50.0).abs() < 1e-9);
    assert!(metrics.efficiency > 100.0);
    assert!(metrics.is_clean());

    // Iterations never overlap
    assert!(stub.peak() <= 4);
    assert!(stub.peak() >= 2);

    let session = metrics.connections.session.unwrap();
    assert!((session.average_active_connections - 3.0).abs() < 1e-9);
    assert_eq!(session.max_used_connections, 12);
    let pool = metrics.connections.pool.unwrap();
    assert_eq!(pool.max_connections, 20);
    assert!(metrics.analysis.throughput > 0.0);
    assert!(metrics.analysis.connection_efficiency > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ten_concurrent_calls_finish_together() {
    let stub = spawn_stub().await;
    let scenario = ScenarioSpec::new("wait x10", "").with_repeated(&wait_request(0.05), 10);

    let metrics = ScenarioRunner::new(stub.executor()).run(&scenario).await.unwrap();

    assert_eq!(metrics.total_requests, 10);
    assert_eq!(metrics.success_rate, 1.0);
    assert!(metrics.average_request_ms >= 50.0);
    assert!(metrics.average_request_ms < 400.0);
    // Ten sequential calls would take at least 500ms
    assert!(metrics.total_elapsed_ms < 450.0);
}

#[tokio::test]
async fn test_non_json_body_is_a_decode_failure() {
    let stub = spawn_stub().await;
    let metrics = ScenarioRunner::new(stub.executor())
        .run(&single("plain"))
        .await
        .unwrap();

    assert_eq!(metrics.success_rate, 0.0);
    let (kind, _) = metrics.results[0].failure_info().unwrap();
    assert_eq!(kind, FailureKind::Decode);
    assert_eq!(metrics.errors.unwrap().count, 1);
}

#[tokio::test]
async fn test_status_policy() {
    let stub = spawn_stub().await;

    let lenient = ScenarioRunner::new(stub.executor())
        .run(&single("broken"))
        .await
        .unwrap();
    assert_eq!(lenient.success_rate, 1.0);
    assert_eq!(lenient.results[0].payload().unwrap()["error"], "boom");

    let strict_executor = HttpExecutor::new(
        stub.config()
            .with_status_policy(StatusPolicy::RequireSuccess),
    )
    .unwrap();
    let strict = ScenarioRunner::new(Arc::new(strict_executor))
        .run(&single("broken"))
        .await
        .unwrap();
    let (kind, message) = strict.results[0].failure_info().unwrap();
    assert_eq!(kind, FailureKind::Status);
    assert!(message.contains("500"));
}

#[tokio::test]
async fn test_client_timeout_is_reported() {
    let stub = spawn_stub().await;
    let executor = HttpExecutor::new(stub.config().with_default_timeout(0.2)).unwrap();
    let result = executor
        .execute(&RequestSpec::new(EndpointDescriptor::new("slow", "Slow")))
        .await;

    let (kind, _) = result.failure_info().unwrap();
    assert_eq!(kind, FailureKind::Timeout);
    assert!(result.elapsed_ms < 4000.0);
}

#[tokio::test]
async fn test_unreachable_service_is_a_transport_failure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let executor = HttpExecutor::new(
        HarnessConfig::default()
            .with_base_url(format!("http://{addr}"))
            .with_default_timeout(2.0),
    )
    .unwrap();
    let result = executor
        .execute(&RequestSpec::new(EndpointDescriptor::new("wait", "Wait")))
        .await;

    let (kind, _) = result.failure_info().unwrap();
    assert_eq!(kind, FailureKind::Transport);
}

#[tokio::test]
async fn test_missing_telemetry_gives_zero_analysis() {
    let stub = spawn_stub().await;
    let metrics = ScenarioRunner::new(stub.executor())
        .run(&single("bare"))
        .await
        .unwrap();

    assert_eq!(metrics.success_rate, 1.0);
    assert!(metrics.connections.session.is_none());
    assert!(metrics.connections.pool.is_none());
    assert_eq!(metrics.analysis.connection_efficiency, 0.0);
    assert_eq!(metrics.analysis.connection_utilization, 0.0);
    assert!(metrics.analysis.throughput > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_production_run() {
    let stub = spawn_stub().await;
    let scheduler = LoadPatternScheduler::new(stub.executor());

    let result = scheduler.run_scenario(&browse_scenario(3)).await.unwrap();

    assert_eq!(scheduler.state(), RunState::Complete);
    assert_eq!(result.concurrent_users, 3);
    assert_eq!(result.total_requests, 3);
    assert_eq!(stub.hits(), 3);
    assert_eq!(result.success_rate, 1.0);
    assert_eq!(result.page_timelines.len(), 1);
    assert_eq!(result.page_timelines[0].times.len(), 3);
    assert!((result.complexity.distribution[&Complexity::Low] - 1.0).abs() < 1e-9);
    assert!(result.errors.is_none());

    let report = loadscope::report::render_load_report(&result);
    assert!(report.contains("LOAD TEST RESULTS: browse"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_gradual_run() {
    let stub = spawn_stub().await;
    let scheduler = LoadPatternScheduler::new(stub.executor());

    let staged = scheduler.run_gradual(&browse_scenario(4), 2).await.unwrap();

    assert_eq!(staged.mode, StagingMode::Gradual);
    let users: Vec<usize> = staged.comparison.iter().map(|s| s.user_count).collect();
    assert_eq!(users, vec![2, 4]);
    assert_eq!(staged.total_requests, 6);
    assert_eq!(stub.hits(), 6);
    assert_eq!(staged.success_rate, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_run() {
    let stub = spawn_stub().await;
    let scheduler = LoadPatternScheduler::new(stub.executor()).with_config(stub.config());

    let staged = scheduler.run_burst(&browse_scenario(4)).await.unwrap();

    assert_eq!(staged.mode, StagingMode::Burst);
    let users: Vec<usize> = staged.comparison.iter().map(|s| s.user_count).collect();
    assert_eq!(users, vec![1, 4, 2]);
    assert_eq!(staged.total_requests, 7);
    assert!(staged.comparison[1].name.contains("peak load"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_burst_run_with_configured_phases() {
    let stub = spawn_stub().await;
    let config = stub
        .config()
        .with_burst_phases(vec![BurstPhase::new("a", 0.1), BurstPhase::new("b", 0.33)]);
    let scheduler = LoadPatternScheduler::new(stub.executor()).with_config(config);

    let staged = scheduler.run_burst(&browse_scenario(10)).await.unwrap();

    let users: Vec<usize> = staged.comparison.iter().map(|s| s.user_count).collect();
    assert_eq!(users, vec![1, 4]);
    let names: Vec<&str> = staged.comparison.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["browse - a (1 users)", "browse - b (4 users)"]);
    assert_eq!(staged.total_requests, 5);
    assert_eq!(stub.hits(), 5);
    assert_eq!(staged.total_users, 10);
}

#[tokio::test]
async fn test_custom_uniform_run() {
    let stub = spawn_stub().await;
    let scheduler = LoadPatternScheduler::new(stub.executor());
    let action = browse_scenario(1).actions[0].action.clone();
    let test = loadscope::CustomLoadTest {
        users: 2,
        actions: vec![action],
        pattern: TrafficPattern::Uniform,
    };

    match scheduler.run_custom(&test).await.unwrap() {
        LoadOutcome::Single(result) => {
            assert_eq!(result.concurrent_users, 2);
            assert_eq!(result.total_requests, 2);
        }
        LoadOutcome::Staged(_) => panic!("uniform runs are single"),
    }
}

#[tokio::test]
async fn test_json_report_of_live_run() {
    let stub = spawn_stub().await;
    let metrics = ScenarioRunner::new(stub.executor())
        .run(&single("bare"))
        .await
        .unwrap();

    let json = loadscope::report::to_json(&metrics).unwrap();
    let value: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["scenario_name"], "bare");
    assert_eq!(value["results"][0]["outcome"]["status"], "success");
}
