//! Server-side telemetry carried in response payloads.
//!
//! Services under test report their database state under `data.session_info`,
//! `data.pool_info` and `data.query_executions`. Values arrive as numbers or as
//! numeric strings (MySQL status variables are strings); anything unreadable
//! counts as zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Leading-integer reading of a JSON value.
///
/// Numbers truncate toward zero; strings parse an optional sign followed by
/// digits and ignore the rest (`"12abc"` → 12). Everything else is 0.
pub fn leading_int(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => parse_leading_int(s),
        _ => 0,
    }
}

fn parse_leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let digits: &str = &rest[..rest.bytes().take_while(u8::is_ascii_digit).count()];
    digits.parse::<i64>().map_or(0, |n| sign * n)
}

fn count(value: Option<&Value>) -> u64 {
    u64::try_from(leading_int(value)).unwrap_or(0)
}

/// Fractional reading of a JSON value, 0 when unreadable
pub fn lenient_f64(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite()).unwrap_or(0.0)
}

/// Database session snapshot reported with one response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSample {
    /// Iteration the response belongs to
    pub iteration: usize,
    /// When the sample was recorded
    pub timestamp: DateTime<Utc>,
    /// Open server connections
    pub total_connections: u64,
    /// Non-idle connections
    pub active_connections: u64,
    /// `Threads_connected`
    pub threads_connected: u64,
    /// `Threads_running`
    pub threads_running: u64,
    /// `Max_used_connections`
    pub max_used_connections: u64,
}

impl SessionSample {
    /// Read from a `session_info` object
    pub fn from_value(iteration: usize, timestamp: DateTime<Utc>, info: &Value) -> Self {
        Self {
            iteration,
            timestamp,
            total_connections: count(info.get("total_connections")),
            active_connections: count(info.get("active_connections")),
            threads_connected: count(info.get("threads_connected")),
            threads_running: count(info.get("threads_running")),
            max_used_connections: count(info.get("max_used_connections")),
        }
    }
}

/// Connection pool snapshot reported with one response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSample {
    /// Iteration the response belongs to
    pub iteration: usize,
    /// When the sample was recorded
    pub timestamp: DateTime<Utc>,
    /// Pool capacity
    pub max_connections: u64,
    /// Connections checked out
    pub current_connections: u64,
    /// Connections free
    pub available_connections: u64,
    /// Pool wait timeout
    pub wait_timeout: u64,
}

impl PoolSample {
    /// Read from a `pool_info` object
    pub fn from_value(iteration: usize, timestamp: DateTime<Utc>, info: &Value) -> Self {
        Self {
            iteration,
            timestamp,
            max_connections: count(info.get("max_connections")),
            current_connections: count(info.get("current_connections")),
            available_connections: count(info.get("available_connections")),
            wait_timeout: count(info.get("wait_timeout")),
        }
    }
}

/// One query the server ran on behalf of a multi-query request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryExecutionSample {
    /// Iteration the response belongs to
    pub iteration: usize,
    /// Requested sleep
    pub delay_seconds: f64,
    /// Measured duration on the server
    pub actual_duration_seconds: f64,
}

impl QueryExecutionSample {
    /// Read from one `query_executions` entry
    pub fn from_value(iteration: usize, entry: &Value) -> Self {
        Self {
            iteration,
            delay_seconds: lenient_f64(entry.get("delay_seconds")),
            actual_duration_seconds: lenient_f64(entry.get("actual_duration_seconds")),
        }
    }
}

/// Telemetry collected over a run, in arrival order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TelemetryTimeline {
    /// Session samples
    pub sessions: Vec<SessionSample>,
    /// Pool samples
    pub pools: Vec<PoolSample>,
    /// Query execution samples
    pub queries: Vec<QueryExecutionSample>,
}

impl TelemetryTimeline {
    /// Empty timeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract whatever telemetry a payload carries, stamped with the time its
    /// iteration settled
    pub fn record(&mut self, iteration: usize, timestamp: DateTime<Utc>, payload: &Value) {
        let Some(data) = payload.get("data") else {
            return;
        };
        if let Some(info) = data.get("session_info").filter(|v| v.is_object()) {
            self.sessions.push(SessionSample::from_value(iteration, timestamp, info));
        }
        if let Some(info) = data.get("pool_info").filter(|v| v.is_object()) {
            self.pools.push(PoolSample::from_value(iteration, timestamp, info));
        }
        if let Some(entries) = data.get("query_executions").and_then(Value::as_array) {
            self.queries.extend(
                entries
                    .iter()
                    .map(|entry| QueryExecutionSample::from_value(iteration, entry)),
            );
        }
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty() && self.pools.is_empty() && self.queries.is_empty()
    }
}
