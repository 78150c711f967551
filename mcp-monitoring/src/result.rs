//! Probe results and combined health records

use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use mcp_health_protocol::MalformedTool;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// One of the two monitoring paths of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbePath {
    Rpc,
    Rest,
}

impl ProbePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for ProbePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    /// No verdict possible (no path enabled, or every probe was deferred)
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Unhealthy => "UNHEALTHY",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Numeric encoding for gauges
    pub fn as_gauge(&self) -> i64 {
        match self {
            Self::Healthy => 2,
            Self::Degraded => 1,
            Self::Unhealthy => 0,
            Self::Unknown => -1,
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one RPC `tools/list` probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcProbeResult {
    pub success: bool,
    pub discovered_tools: Vec<String>,
    pub missing_tools: Vec<String>,
    pub malformed_tools: Vec<MalformedTool>,
    /// Latency of the last attempt, send to parsed response
    pub latency_ms: u64,
    /// Network attempts made (0 when the probe never went out)
    pub attempts: u32,
    /// JSON-RPC error code returned by the server, if any
    pub error_code: Option<i64>,
    pub error: Option<ProbeError>,
    pub timestamp: DateTime<Utc>,
}

impl RpcProbeResult {
    /// Result for a probe that failed before or without a usable response
    pub fn failed(error: ProbeError, attempts: u32, latency: Duration) -> Self {
        let error_code = match &error {
            ProbeError::Protocol { code, .. } => *code,
            _ => None,
        };
        Self {
            success: false,
            discovered_tools: Vec::new(),
            missing_tools: Vec::new(),
            malformed_tools: Vec::new(),
            latency_ms: latency.as_millis() as u64,
            attempts,
            error_code,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    /// Placeholder for a probe the circuit breaker did not allow
    pub fn skipped(retry_after: Duration) -> Self {
        Self::failed(ProbeError::circuit_open(retry_after), 0, Duration::ZERO)
    }
}

/// Result of one REST health probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestProbeResult {
    pub success: bool,
    pub http_status: Option<u16>,
    /// HEALTHY, DEGRADED or UNHEALTHY as derived from status code and body
    pub level: HealthStatus,
    /// Raw value of the status/health/healthy indicator
    pub status_indicator: Option<String>,
    /// Error indicator keys present in the body
    pub error_indicators: Vec<String>,
    /// Embedded metrics object, passed through
    pub metrics: Map<String, Value>,
    /// Circuit breaker state reported by the target itself
    pub circuit_breaker_state: Option<String>,
    pub latency_ms: u64,
    pub attempts: u32,
    pub error: Option<ProbeError>,
    pub timestamp: DateTime<Utc>,
}

impl RestProbeResult {
    pub fn failed(error: ProbeError, http_status: Option<u16>, attempts: u32, latency: Duration) -> Self {
        Self {
            success: false,
            http_status,
            level: HealthStatus::Unhealthy,
            status_indicator: None,
            error_indicators: Vec::new(),
            metrics: Map::new(),
            circuit_breaker_state: None,
            latency_ms: latency.as_millis() as u64,
            attempts,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    pub fn skipped(retry_after: Duration) -> Self {
        Self::failed(ProbeError::circuit_open(retry_after), None, 0, Duration::ZERO)
    }
}

/// How a path took part in a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PathState {
    Disabled,
    /// Circuit open, probe not issued
    Skipped { retry_after_ms: u64 },
    /// Declined by the resource monitor, retried next cycle
    Deferred,
    Succeeded,
    Failed,
}

impl PathState {
    pub fn from_outcome(success: bool, error: Option<&ProbeError>) -> Self {
        match error {
            Some(ProbeError::CircuitOpen { retry_after_ms }) => Self::Skipped {
                retry_after_ms: *retry_after_ms,
            },
            Some(ProbeError::ResourceLimit { .. }) => Self::Deferred,
            _ if success => Self::Succeeded,
            _ => Self::Failed,
        }
    }

    /// Whether the path's result takes part in aggregation
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Latency and success figures carried by a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub rpc_latency_ms: Option<u64>,
    pub rest_latency_ms: Option<u64>,
    pub average_latency_ms: Option<f64>,
    /// Success rate of the path over the monitor's recent history
    pub rpc_success_rate: Option<f64>,
    pub rest_success_rate: Option<f64>,
    pub total_attempts: u32,
}

/// Fused verdict for one server in one cycle
///
/// Created once and shared behind `Arc`; replaced, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedHealthRecord {
    pub server: String,
    pub rpc: Option<RpcProbeResult>,
    pub rest: Option<RestProbeResult>,
    pub rpc_state: PathState,
    pub rest_state: PathState,
    pub status: HealthStatus,
    /// Weighted score in `[0, 1]`
    pub score: f64,
    pub available_paths: Vec<ProbePath>,
    pub metrics: AggregatedMetrics,
    /// Sanitized messages for auth, validation and protocol problems
    pub diagnostics: Vec<String>,
    /// Configuration problem that prevented a verdict
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CombinedHealthRecord {
    pub fn path_state(&self, path: ProbePath) -> PathState {
        match path {
            ProbePath::Rpc => self.rpc_state,
            ProbePath::Rest => self.rest_state,
        }
    }

    pub fn is_available(&self, path: ProbePath) -> bool {
        self.available_paths.contains(&path)
    }
}
