//! Built-in catalogs for the standard benchmark service.
//!
//! The service exposes the same work behind different execution strategies
//! (sync handler, async handler awaiting async or blocking waits, sync or async
//! DB sessions). The suites here issue identical load against each strategy so
//! their metrics can be compared side by side.

use crate::catalog::{
    Complexity, EndpointDescriptor, PageLoadPattern, ProductionScenario, RequestSpec,
    RequestType, ScenarioSpec, UserAction,
};
use crate::load::{CustomLoadTest, TrafficPattern};

/// Advisory delays, in seconds, cycled through by the ten-request suites
pub const DELAY_CYCLE: [f64; 10] = [1.0, 2.0, 3.0, 2.0, 1.0, 3.0, 2.0, 1.0, 3.0, 2.0];

/// User counts offered for custom runs
pub const CUSTOM_USER_COUNTS: [usize; 6] = [10, 20, 50, 100, 200, 500];

// =============================================================================
// Endpoints
// =============================================================================

/// Plain sync handler
pub fn sync_api() -> EndpointDescriptor {
    EndpointDescriptor::new("sync-test", "Sync API")
}

/// Plain async handler
pub fn async_api() -> EndpointDescriptor {
    EndpointDescriptor::new("async-test", "Async API")
}

/// Sync handler with a wait
pub fn sync_wait_api() -> EndpointDescriptor {
    EndpointDescriptor::new("sync-test-with-wait", "Sync wait API").with_param("timeout")
}

/// Async handler with an awaited wait
pub fn async_wait_api() -> EndpointDescriptor {
    EndpointDescriptor::new("async-test-with-await", "Async wait API").with_param("timeout")
}

/// Async handler awaiting an async sleep
pub fn async_with_async_wait() -> EndpointDescriptor {
    EndpointDescriptor::new(
        "async-test-with-await-with-async",
        "Async method + async wait",
    )
    .with_param("timeout")
}

/// Async handler blocking on a sync sleep
pub fn async_with_sync_wait() -> EndpointDescriptor {
    EndpointDescriptor::new("async-test-with-await-with-sync", "Async method + sync wait")
        .with_param("timeout")
}

/// Sync handler with a sync sleep
pub fn sync_with_wait() -> EndpointDescriptor {
    EndpointDescriptor::new("sync-test-with-await", "Sync method + sync wait").with_param("timeout")
}

/// Sync handler on a sync DB session
pub fn sync_with_sync_db() -> EndpointDescriptor {
    EndpointDescriptor::new("sync-test-with-sync-db-session", "Sync method + sync DB session")
        .with_param("timeout")
}

/// Async handler on a sync DB session
pub fn async_with_sync_db() -> EndpointDescriptor {
    EndpointDescriptor::new(
        "async-test-with-async-db-session-with-sync",
        "Async method + sync DB session",
    )
    .with_param("timeout")
}

/// Async handler on an async DB session
pub fn async_with_async_db() -> EndpointDescriptor {
    EndpointDescriptor::new(
        "async-test-with-async-db-session",
        "Async method + async DB session",
    )
    .with_param("timeout")
}

/// Sync handler running several queries on a sync DB session
pub fn sync_with_sync_db_multiple() -> EndpointDescriptor {
    EndpointDescriptor::new(
        "sync-test-with-sync-db-session-multiple-queries",
        "Sync method + sync DB session (multiple queries)",
    )
    .with_param("query_count")
}

/// Async handler running several queries on an async DB session
pub fn async_with_async_db_multiple() -> EndpointDescriptor {
    EndpointDescriptor::new(
        "async-test-with-async-db-session-multiple-queries",
        "Async method + async DB session (multiple queries)",
    )
    .with_param("query_count")
}

/// Every endpoint the service exposes
pub fn endpoint_catalog() -> Vec<EndpointDescriptor> {
    vec![
        sync_api(),
        async_api(),
        sync_wait_api(),
        async_wait_api(),
        async_with_async_wait(),
        async_with_sync_wait(),
        sync_with_wait(),
        sync_with_sync_db(),
        async_with_sync_db(),
        async_with_async_db(),
        sync_with_sync_db_multiple(),
        async_with_async_db_multiple(),
    ]
}

// =============================================================================
// Scenario suites
// =============================================================================

fn cycled(name: &str, description: &str, endpoint: &EndpointDescriptor) -> ScenarioSpec {
    let mut scenario = ScenarioSpec::new(name, description);
    for delay in DELAY_CYCLE {
        scenario.add_request(RequestSpec::new(endpoint.clone()).with_timeout(delay));
    }
    scenario
}

fn timed(endpoint: &EndpointDescriptor, timeout: f64) -> RequestSpec {
    RequestSpec::new(endpoint.clone()).with_timeout(timeout)
}

fn operation(endpoint: &EndpointDescriptor, op: &str, timeout: f64) -> RequestSpec {
    timed(endpoint, timeout).with_operation(op)
}

/// Wait-strategy comparison: the same delays against each wait style
pub fn wait_strategy_scenarios() -> Vec<ScenarioSpec> {
    vec![
        cycled(
            "Scenario 1: async method + async wait (3 iterations)",
            "Async handler awaiting an async sleep",
            &async_with_async_wait(),
        )
        .with_iterations(3),
        cycled(
            "Scenario 2: async method + sync wait (3 iterations)",
            "Async handler blocking the event loop with a sync sleep",
            &async_with_sync_wait(),
        )
        .with_iterations(3),
        cycled(
            "Scenario 3: sync method + sync wait (3 iterations)",
            "Sync handler running on the worker thread pool",
            &sync_with_wait(),
        )
        .with_iterations(3),
        ScenarioSpec::new(
            "Scenario 4: 50 concurrent requests (async + async)",
            "Large batch against the async wait endpoint",
        )
        .with_repeated(&timed(&async_with_async_wait(), 2.0), 50),
        ScenarioSpec::new(
            "Scenario 5: 50 concurrent requests (async + sync)",
            "Large batch against the blocking wait endpoint",
        )
        .with_repeated(&timed(&async_with_sync_wait(), 2.0), 50),
        ScenarioSpec::new(
            "Scenario 6: 50 concurrent requests (sync + sync)",
            "Large batch against the sync wait endpoint",
        )
        .with_repeated(&timed(&sync_with_wait(), 2.0), 50),
    ]
}

/// DB-session comparison: basic, escalating and realistic workloads
pub fn db_session_scenarios() -> Vec<ScenarioSpec> {
    let sync_db = sync_with_sync_db();
    let async_db = async_with_async_db();

    let mut suites = vec![
        cycled(
            "Basic 1: sync method + sync DB session (10 requests)",
            "Ten requests with varying delays on a sync session",
            &sync_db,
        ),
        cycled(
            "Basic 2: async method + sync DB session (10 requests)",
            "Ten requests with varying delays, async handler on a sync session",
            &async_with_sync_db(),
        ),
        cycled(
            "Basic 3: async method + async DB session (10 requests)",
            "Ten requests with varying delays on an async session",
            &async_db,
        ),
    ];

    for (label, endpoint) in [("sync", &sync_db), ("async", &async_db)] {
        let mut scenario = ScenarioSpec::new(
            &format!("Advanced: escalating load - {label} DB session"),
            "Batches of 10, 30, 50 and 100 requests in one wave",
        )
        .with_iterations(3);
        for count in [10, 30, 50, 100] {
            scenario.add_repeated(&timed(endpoint, 1.0), count);
        }
        suites.push(scenario);
    }

    suites.push(
        ScenarioSpec::new(
            "Advanced: long-lived connections",
            "Five-second holds on both session types",
        )
        .with_repeated(&timed(&sync_db, 5.0), 30)
        .with_repeated(&timed(&async_db, 5.0), 30)
        .with_iterations(2),
    );

    let mut mixed = ScenarioSpec::new(
        "Advanced: mixed load",
        "Short, medium and long holds on both session types",
    )
    .with_iterations(2);
    for endpoint in [&sync_db, &async_db] {
        mixed.add_repeated(&timed(endpoint, 1.0), 20);
        mixed.add_repeated(&timed(endpoint, 3.0), 15);
        mixed.add_repeated(&timed(endpoint, 5.0), 10);
    }
    suites.push(mixed);

    suites.push(
        ScenarioSpec::new(
            "Advanced: extreme load",
            "300 simultaneous one-second holds",
        )
        .with_repeated(&timed(&sync_db, 1.0), 150)
        .with_repeated(&timed(&async_db, 1.0), 150),
    );

    for (suffix, context, endpoint) in [("A", "sync", &sync_db), ("B", "async", &async_db)] {
        suites.push(
            ScenarioSpec::new(
                &format!("Realistic 1-{suffix}: complex queries, {context} context"),
                "Complex joins and large dataset processing",
            )
            .with_repeated(&operation(endpoint, "complex_join", 3.0), 30)
            .with_repeated(&operation(endpoint, "large_dataset", 5.0), 20)
            .with_iterations(2),
        );
    }
    for (suffix, context, endpoint) in [("A", "sync", &sync_db), ("B", "async", &async_db)] {
        suites.push(
            ScenarioSpec::new(
                &format!("Realistic 2-{suffix}: mixed workload, {context} context"),
                "Reads, writes and analysis queries together",
            )
            .with_repeated(&operation(endpoint, "read", 1.0), 30)
            .with_repeated(&operation(endpoint, "write", 2.0), 20)
            .with_repeated(&operation(endpoint, "analysis", 5.0), 10)
            .with_iterations(2),
        );
    }

    suites
}

// =============================================================================
// Simulated users
// =============================================================================

/// Light read on a sync session
pub fn simple_read() -> RequestType {
    RequestType::new(sync_with_sync_db_multiple(), 2, 500, Complexity::Low)
}

/// Heavier read on a sync session
pub fn complex_read() -> RequestType {
    RequestType::new(sync_with_sync_db_multiple(), 5, 1200, Complexity::Medium)
}

/// Write on a sync session
pub fn write_operation() -> RequestType {
    RequestType::new(sync_with_sync_db_multiple(), 3, 800, Complexity::Medium)
}

/// Analytics on a sync session
pub fn analytics() -> RequestType {
    RequestType::new(sync_with_sync_db_multiple(), 8, 2500, Complexity::High)
}

/// Light read on an async session
pub fn async_simple_read() -> RequestType {
    RequestType::new(async_with_async_db_multiple(), 2, 500, Complexity::Low)
}

/// Heavier read on an async session
pub fn async_complex_read() -> RequestType {
    RequestType::new(async_with_async_db_multiple(), 5, 1200, Complexity::Medium)
}

/// Write on an async session
pub fn async_write_operation() -> RequestType {
    RequestType::new(async_with_async_db_multiple(), 3, 800, Complexity::Medium)
}

/// Analytics on an async session
pub fn async_analytics() -> RequestType {
    RequestType::new(async_with_async_db_multiple(), 8, 2500, Complexity::High)
}

/// The four page shapes, built from one set of request types
struct PageSet {
    listing: PageLoadPattern,
    detail: PageLoadPattern,
    checkout: PageLoadPattern,
    dashboard: PageLoadPattern,
}

fn page_set(async_db: bool) -> PageSet {
    let (simple, complex, write, analysis, tag) = if async_db {
        (
            async_simple_read(),
            async_complex_read(),
            async_write_operation(),
            async_analytics(),
            " (async)",
        )
    } else {
        (simple_read(), complex_read(), write_operation(), analytics(), "")
    };
    PageSet {
        listing: PageLoadPattern::new(
            &format!("Product listing{tag}"),
            "Product list, light reads",
        )
        .with_request(simple.clone(), 0.7)
        .with_request(complex.clone(), 0.3),
        detail: PageLoadPattern::new(
            &format!("Product detail{tag}"),
            "Details, reviews and recommendations",
        )
        .with_request(simple.clone(), 0.4)
        .with_request(complex.clone(), 0.4)
        .with_request(analysis.clone(), 0.2),
        checkout: PageLoadPattern::new(
            &format!("Checkout{tag}"),
            "Payment and order confirmation, includes writes",
        )
        .with_request(simple, 0.3)
        .with_request(write, 0.6)
        .with_request(complex.clone(), 0.1),
        dashboard: PageLoadPattern::new(
            &format!("Admin dashboard{tag}"),
            "Monitoring and analytics for administrators",
        )
        .with_request(complex, 0.4)
        .with_request(analysis, 0.6),
    }
}

/// Every page pattern, sync session first
pub fn page_patterns() -> Vec<PageLoadPattern> {
    [false, true]
        .into_iter()
        .flat_map(|async_db| {
            let pages = page_set(async_db);
            [pages.listing, pages.detail, pages.checkout, pages.dashboard]
        })
        .collect()
}

fn actions_for(async_db: bool) -> [UserAction; 3] {
    let pages = page_set(async_db);
    let tag = if async_db { " (async)" } else { "" };
    [
        UserAction::new(
            &format!("Browse products{tag}"),
            "Search products and open their detail pages",
            vec![pages.listing.clone(), pages.detail.clone(), pages.detail.clone()],
        ),
        UserAction::new(
            &format!("Purchase flow{tag}"),
            "Search, view and buy a product",
            vec![pages.listing.clone(), pages.detail.clone(), pages.checkout],
        ),
        UserAction::new(
            &format!("Admin work{tag}"),
            "Check the dashboard and manage products",
            vec![pages.dashboard, pages.listing, pages.detail],
        ),
    ]
}

/// Every user action, sync session first
pub fn user_actions() -> Vec<UserAction> {
    [false, true].into_iter().flat_map(actions_for).collect()
}

/// Built-in production scenarios, from off-peak to sync vs async comparisons
pub fn production_scenarios() -> Vec<ProductionScenario> {
    let [browse, purchase, admin] = actions_for(false);
    let [browse_async, purchase_async, _] = actions_for(true);
    vec![
        ProductionScenario::new("Low traffic: 10 concurrent users", "Off-peak hours", 10)
            .with_action(browse.clone(), 0.6)
            .with_action(purchase.clone(), 0.4),
        ProductionScenario::new("Medium traffic: 50 concurrent users", "Regular business hours", 50)
            .with_action(browse.clone(), 0.5)
            .with_action(purchase.clone(), 0.4)
            .with_action(admin, 0.1),
        ProductionScenario::new("High traffic: 100 concurrent users", "Promotion or sale period", 100)
            .with_action(browse.clone(), 0.7)
            .with_action(purchase.clone(), 0.3),
        ProductionScenario::new("Peak traffic: 200 concurrent users", "Black Friday level traffic", 200)
            .with_action(browse.clone(), 0.6)
            .with_action(purchase.clone(), 0.4),
        ProductionScenario::new(
            "Sync vs async: low traffic (50 users)",
            "Same browsing flow on sync and async sessions",
            50,
        )
        .with_action(browse, 0.5)
        .with_action(browse_async, 0.5),
        ProductionScenario::new(
            "Sync vs async: high traffic (100 users)",
            "Same purchase flow on sync and async sessions",
            100,
        )
        .with_action(purchase, 0.5)
        .with_action(purchase_async, 0.5),
    ]
}

/// One custom run per offered user count, each over every built-in action
pub fn custom_load_tests(pattern: TrafficPattern) -> Vec<CustomLoadTest> {
    CUSTOM_USER_COUNTS
        .iter()
        .map(|&users| CustomLoadTest {
            users,
            actions: user_actions(),
            pattern,
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_endpoint_paths_unique() {
        let catalog = endpoint_catalog();
        let paths: HashSet<&str> = catalog.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths.len(), catalog.len());
        assert!(catalog
            .iter()
            .filter(|e| e.path.ends_with("multiple-queries"))
            .all(|e| e.accepts("query_count")));
    }

    #[test]
    fn test_every_scenario_validates() {
        for scenario in wait_strategy_scenarios()
            .iter()
            .chain(db_session_scenarios().iter())
        {
            scenario.validate().unwrap();
        }
        for scenario in production_scenarios() {
            scenario.validate().unwrap();
        }
    }

    #[test]
    fn test_wait_suite_shapes() {
        let suites = wait_strategy_scenarios();
        assert_eq!(suites.len(), 6);
        assert_eq!(suites[0].total_requests(), 30);
        assert!((suites[0].theoretical_elapsed_ms() - 20_000.0).abs() < 1e-9);
        assert_eq!(suites[3].batch_size(), 50);
    }

    #[test]
    fn test_db_suite_shapes() {
        let suites = db_session_scenarios();
        assert_eq!(suites.len(), 12);
        assert_eq!(suites[3].batch_size(), 190);
        assert_eq!(suites[6].batch_size(), 90);
        assert_eq!(suites[7].batch_size(), 300);
        assert_eq!(
            suites[8].requests[0].operation.as_deref(),
            Some("complex_join")
        );
    }

    #[test]
    fn test_page_expansion() {
        let pages = page_patterns();
        assert_eq!(pages.len(), 8);
        // 0.7 → 7, 0.3 → 3
        assert_eq!(pages[0].expand().len(), 10);
        assert!(pages[4].expand().iter().all(|s| s.endpoint.path.starts_with("async")));
    }

    #[test]
    fn test_production_user_counts() {
        let scenarios = production_scenarios();
        assert_eq!(scenarios.len(), 6);
        for scenario in &scenarios {
            assert_eq!(scenario.realized_users(), scenario.concurrent_users);
        }
        assert_eq!(user_actions().len(), 6);
    }

    #[test]
    fn test_custom_runs_cover_offered_user_counts() {
        let tests = custom_load_tests(TrafficPattern::Burst);
        let users: Vec<usize> = tests.iter().map(|t| t.users).collect();
        assert_eq!(users, CUSTOM_USER_COUNTS.to_vec());
        for test in &tests {
            assert_eq!(test.pattern, TrafficPattern::Burst);
            let scenario = test.to_scenario();
            scenario.validate().unwrap();
            assert_eq!(scenario.actions.len(), 6);
            assert!(scenario.name.contains("burst"));
        }
    }
}
