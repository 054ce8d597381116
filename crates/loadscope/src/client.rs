//! Request execution: the executor seam and its reqwest implementation.
//!
//! Call-level problems never escape [`RequestExecutor::execute`]; they become
//! [`RequestOutcome::Failure`] values inside the returned [`RequestResult`].

use crate::catalog::{Complexity, RequestSpec};
use crate::config::{HarnessConfig, StatusPolicy};
use crate::result::{LoadscopeError, LoadscopeResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

/// Why a call failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection refused, reset, DNS, ...
    Transport,
    /// Client-side timeout elapsed
    Timeout,
    /// Body was not valid JSON
    Decode,
    /// Status rejected by [`StatusPolicy::RequireSuccess`]
    Status,
}

/// Outcome of one call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Decoded JSON body
    Success {
        /// Response payload
        payload: Value,
    },
    /// Call did not produce a usable body
    Failure {
        /// Failure class
        kind: FailureKind,
        /// Error text, used as the error-histogram key
        message: String,
    },
}

/// Iteration a result belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IterationTag {
    /// Zero-based iteration index
    pub index: usize,
    /// Wall-clock time of the whole iteration
    pub elapsed_ms: f64,
}

/// Result of one call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestResult {
    /// Endpoint label
    pub endpoint_label: String,
    /// Endpoint path
    pub path: String,
    /// Advisory delay the call was issued with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<f64>,
    /// Query count the call was issued with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_count: Option<u32>,
    /// Operation tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Complexity tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    /// Set by the scenario runner once the iteration has settled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<IterationTag>,
    /// Wall-clock time of the call
    pub elapsed_ms: f64,
    /// When the call settled
    #[serde(default = "Utc::now")]
    pub completed_at: DateTime<Utc>,
    /// Outcome
    pub outcome: RequestOutcome,
}

impl RequestResult {
    fn from_spec(spec: &RequestSpec, elapsed_ms: f64, outcome: RequestOutcome) -> Self {
        Self {
            endpoint_label: spec.endpoint.label.clone(),
            path: spec.endpoint.path.clone(),
            timeout_secs: spec.timeout_secs,
            query_count: spec.query_count,
            operation: spec.operation.clone(),
            complexity: spec.complexity,
            iteration: None,
            elapsed_ms,
            completed_at: Utc::now(),
            outcome,
        }
    }

    /// Successful call
    pub fn from_success(spec: &RequestSpec, elapsed_ms: f64, payload: Value) -> Self {
        Self::from_spec(spec, elapsed_ms, RequestOutcome::Success { payload })
    }

    /// Failed call
    pub fn from_failure(
        spec: &RequestSpec,
        elapsed_ms: f64,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::from_spec(
            spec,
            elapsed_ms,
            RequestOutcome::Failure {
                kind,
                message: message.into(),
            },
        )
    }

    /// Attach the iteration tag
    #[must_use]
    pub fn with_iteration(mut self, tag: IterationTag) -> Self {
        self.iteration = Some(tag);
        self
    }

    /// Override the settle time
    #[must_use]
    pub fn with_completed_at(mut self, completed_at: DateTime<Utc>) -> Self {
        self.completed_at = completed_at;
        self
    }

    /// Whether the call succeeded
    pub const fn success(&self) -> bool {
        matches!(self.outcome, RequestOutcome::Success { .. })
    }

    /// Decoded payload of a successful call
    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            RequestOutcome::Success { payload } => Some(payload),
            RequestOutcome::Failure { .. } => None,
        }
    }

    /// Failure kind and message of a failed call
    pub fn failure_info(&self) -> Option<(FailureKind, &str)> {
        match &self.outcome {
            RequestOutcome::Success { .. } => None,
            RequestOutcome::Failure { kind, message } => Some((*kind, message.as_str())),
        }
    }

    /// Advisory delay in milliseconds, 0 when the call had none
    pub fn advisory_delay_ms(&self) -> f64 {
        self.timeout_secs.unwrap_or(0.0) * 1000.0
    }
}

/// Executes one planned call.
///
/// Implementations must not return early on failure and must not touch shared
/// state; every problem is captured in the returned result.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Perform the call and measure it
    async fn execute(&self, spec: &RequestSpec) -> RequestResult;
}

/// Query string for a spec: `timeout` and `query_count`, only when present
pub fn query_params(spec: &RequestSpec) -> Vec<(&'static str, String)> {
    let mut params = Vec::with_capacity(2);
    if let Some(timeout) = spec.timeout_secs {
        params.push(("timeout", timeout.to_string()));
    }
    if let Some(count) = spec.query_count {
        params.push(("query_count", count.to_string()));
    }
    params
}

/// reqwest-backed executor
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    config: HarnessConfig,
}

impl HttpExecutor {
    /// Build an executor with a pooled client sized from the configuration
    pub fn new(config: HarnessConfig) -> LoadscopeResult<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| LoadscopeError::HttpClient {
                message: e.to_string(),
            })?;
        Ok(Self { client, config })
    }

    /// Use a caller-supplied client
    pub fn with_client(config: HarnessConfig, client: reqwest::Client) -> Self {
        Self { client, config }
    }

    /// Active configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    async fn call(&self, spec: &RequestSpec) -> Result<Value, (FailureKind, String)> {
        let url = self.config.endpoint_url(&spec.endpoint.path);
        let response = self
            .client
            .get(&url)
            .query(&query_params(spec))
            .timeout(self.config.request_timeout(spec))
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if self.config.status_policy == StatusPolicy::RequireSuccess && !status.is_success() {
            return Err((FailureKind::Status, format!("HTTP {status}")));
        }

        let body = response.bytes().await.map_err(classify)?;
        serde_json::from_slice(&body).map_err(|e| (FailureKind::Decode, e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> (FailureKind, String) {
    if err.is_timeout() {
        (FailureKind::Timeout, err.to_string())
    } else {
        (FailureKind::Transport, err.to_string())
    }
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, spec: &RequestSpec) -> RequestResult {
        let start = Instant::now();
        let outcome = self.call(spec).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(payload) => RequestResult::from_success(spec, elapsed_ms, payload),
            Err((kind, message)) => {
                tracing::debug!(path = %spec.endpoint.path, ?kind, %message, "request failed");
                RequestResult::from_failure(spec, elapsed_ms, kind, message)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::catalog::EndpointDescriptor;
    use serde_json::json;

    fn spec() -> RequestSpec {
        RequestSpec::new(EndpointDescriptor::new("async-test", "Async"))
    }

    #[test]
    fn test_query_params_only_when_present() {
        assert!(query_params(&spec()).is_empty());
        let params = query_params(&spec().with_timeout(0.5).with_query_count(3));
        assert_eq!(
            params,
            vec![
                ("timeout", "0.5".to_string()),
                ("query_count", "3".to_string())
            ]
        );
        assert_eq!(
            query_params(&spec().with_timeout(2.0)),
            vec![("timeout", "2".to_string())]
        );
    }

    #[test]
    fn test_result_carries_spec_fields() {
        let spec = spec()
            .with_timeout(1.0)
            .with_operation("read")
            .with_complexity(Complexity::Medium);
        let result = RequestResult::from_success(&spec, 12.0, json!({"ok": true}));
        assert!(result.success());
        assert_eq!(result.path, "async-test");
        assert_eq!(result.endpoint_label, "Async");
        assert_eq!(result.operation.as_deref(), Some("read"));
        assert_eq!(result.complexity, Some(Complexity::Medium));
        assert!((result.advisory_delay_ms() - 1000.0).abs() < f64::EPSILON);
        assert!(result.failure_info().is_none());
    }

    #[test]
    fn test_failure_result() {
        let result = RequestResult::from_failure(&spec(), 3.0, FailureKind::Decode, "expected value");
        assert!(!result.success());
        assert!(result.payload().is_none());
        assert_eq!(
            result.failure_info(),
            Some((FailureKind::Decode, "expected value"))
        );
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let result = RequestResult::from_failure(&spec(), 1.0, FailureKind::Timeout, "deadline")
            .with_iteration(IterationTag {
                index: 2,
                elapsed_ms: 40.0,
            });
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["outcome"]["status"], "failure");
        assert_eq!(value["outcome"]["kind"], "timeout");
        assert_eq!(value["iteration"]["index"], 2);
        assert!(value.get("timeout_secs").is_none());
    }

    #[test]
    fn test_executor_rejects_invalid_config() {
        let err = HttpExecutor::new(HarnessConfig::new().with_base_url(" ")).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }
}
