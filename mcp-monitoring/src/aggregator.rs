//! Result aggregation
//!
//! Fuses the RPC and REST outcomes of one server into a single
//! [`CombinedHealthRecord`]. A path that is disabled, circuit-open or
//! deferred is not authoritative and does not influence the verdict.

use crate::config::{AggregationConfig, ServerConfig};
use crate::error::ProbeError;
use crate::result::{
    AggregatedMetrics, CombinedHealthRecord, HealthStatus, PathState, ProbePath, RestProbeResult,
    RpcProbeResult,
};
use chrono::Utc;
use std::time::Duration;

/// Message recorded for a server with no enabled path
pub const NO_PATH_ENABLED: &str = "no monitoring path enabled";

/// Combines per-path results into one verdict
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    config: AggregationConfig,
}

struct PathView {
    path: ProbePath,
    state: PathState,
    latency_ms: u64,
    timeout: Duration,
    /// Verdict of this path alone
    level: HealthStatus,
    weight: f64,
}

impl PathView {
    fn succeeded(&self) -> bool {
        self.state == PathState::Succeeded
    }

    /// Normalized score in `[0, 1]`
    fn score(&self) -> f64 {
        if !self.succeeded() {
            return 0.0;
        }
        let timeout_ms = self.timeout.as_millis().max(1) as f64;
        let latency_ratio = (self.latency_ms as f64 / timeout_ms).clamp(0.0, 1.0);
        let score = 0.5 + 0.5 * (1.0 - latency_ratio);
        if self.level == HealthStatus::Degraded {
            score / 2.0
        } else {
            score
        }
    }
}

impl ResultAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Combine the results of one cycle
    ///
    /// `None` marks a disabled path.
    pub fn combine(
        &self,
        server: &ServerConfig,
        rpc: Option<RpcProbeResult>,
        rest: Option<RestProbeResult>,
    ) -> CombinedHealthRecord {
        let rpc_state = rpc
            .as_ref()
            .map_or(PathState::Disabled, |r| PathState::from_outcome(r.success, r.error.as_ref()));
        let rest_state = rest
            .as_ref()
            .map_or(PathState::Disabled, |r| PathState::from_outcome(r.success, r.error.as_ref()));

        let mut views = Vec::with_capacity(2);
        if let Some(result) = &rpc {
            views.push(PathView {
                path: ProbePath::Rpc,
                state: rpc_state,
                latency_ms: result.latency_ms,
                timeout: server.rpc.timeout(),
                level: if result.success {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Unhealthy
                },
                weight: self.config.rpc_weight,
            });
        }
        if let Some(result) = &rest {
            views.push(PathView {
                path: ProbePath::Rest,
                state: rest_state,
                latency_ms: result.latency_ms,
                timeout: server.rest.timeout(),
                level: if result.success {
                    result.level
                } else {
                    HealthStatus::Unhealthy
                },
                weight: self.config.rest_weight,
            });
        }

        let authoritative: Vec<&PathView> =
            views.iter().filter(|v| v.state.is_authoritative()).collect();

        let (status, error) = if views.is_empty() {
            (HealthStatus::Unknown, Some(NO_PATH_ENABLED.to_string()))
        } else {
            (Self::status(&views, &authoritative), None)
        };

        let mut diagnostics = Vec::new();
        if let Some(e) = rpc.as_ref().and_then(|r| r.error.as_ref()) {
            diagnostics.push(diagnostic(ProbePath::Rpc, e));
        }
        if let Some(e) = rest.as_ref().and_then(|r| r.error.as_ref()) {
            diagnostics.push(diagnostic(ProbePath::Rest, e));
        }

        let metrics = Self::metrics(&authoritative, rpc.as_ref(), rest.as_ref());

        CombinedHealthRecord {
            server: server.name.clone(),
            score: Self::score(&authoritative),
            available_paths: views
                .iter()
                .filter(|v| v.succeeded())
                .map(|v| v.path)
                .collect(),
            rpc,
            rest,
            rpc_state,
            rest_state,
            status,
            metrics,
            diagnostics,
            error,
            checked_at: Utc::now(),
        }
    }

    fn status(views: &[PathView], authoritative: &[&PathView]) -> HealthStatus {
        match authoritative {
            [] => {
                let any_open = views
                    .iter()
                    .any(|v| matches!(v.state, PathState::Skipped { .. }));
                if any_open {
                    HealthStatus::Unhealthy
                } else {
                    HealthStatus::Unknown
                }
            }
            [only] => only.level,
            [first, second, ..] => match (first.succeeded(), second.succeeded()) {
                (true, true) => {
                    if first.level == HealthStatus::Degraded || second.level == HealthStatus::Degraded {
                        HealthStatus::Degraded
                    } else {
                        HealthStatus::Healthy
                    }
                }
                (false, false) => HealthStatus::Unhealthy,
                _ => HealthStatus::Degraded,
            },
        }
    }

    fn score(authoritative: &[&PathView]) -> f64 {
        if authoritative.is_empty() {
            return 0.0;
        }
        let total_weight: f64 = authoritative.iter().map(|v| v.weight).sum();
        if total_weight <= 0.0 {
            let sum: f64 = authoritative.iter().map(|v| v.score()).sum();
            return sum / authoritative.len() as f64;
        }
        authoritative
            .iter()
            .map(|v| v.weight * v.score())
            .sum::<f64>()
            / total_weight
    }

    fn metrics(
        authoritative: &[&PathView],
        rpc: Option<&RpcProbeResult>,
        rest: Option<&RestProbeResult>,
    ) -> AggregatedMetrics {
        let latency_of = |path: ProbePath| {
            authoritative
                .iter()
                .find(|v| v.path == path)
                .map(|v| v.latency_ms)
        };
        let average_latency_ms = (!authoritative.is_empty()).then(|| {
            authoritative.iter().map(|v| v.latency_ms as f64).sum::<f64>()
                / authoritative.len() as f64
        });

        AggregatedMetrics {
            rpc_latency_ms: latency_of(ProbePath::Rpc),
            rest_latency_ms: latency_of(ProbePath::Rest),
            average_latency_ms,
            rpc_success_rate: None,
            rest_success_rate: None,
            total_attempts: rpc.map_or(0, |r| r.attempts) + rest.map_or(0, |r| r.attempts),
        }
    }
}

fn diagnostic(path: ProbePath, error: &ProbeError) -> String {
    format!("{path}: {error}")
}
