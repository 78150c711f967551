//! Unit tests for result aggregation

#[cfg(test)]
mod tests {
    use crate::aggregator::*;
    use crate::config::{AggregationConfig, PathConfig, ServerConfig};
    use crate::error::{ProbeError, TransportErrorKind};
    use crate::result::*;
    use chrono::Utc;
    use serde_json::Map;
    use std::time::Duration;

    fn server() -> ServerConfig {
        ServerConfig::new("search", "http://search/mcp", "http://search/health")
    }

    fn rpc_ok(latency_ms: u64) -> RpcProbeResult {
        RpcProbeResult {
            success: true,
            discovered_tools: vec!["search".to_string()],
            missing_tools: Vec::new(),
            malformed_tools: Vec::new(),
            latency_ms,
            attempts: 1,
            error_code: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn rpc_failed() -> RpcProbeResult {
        RpcProbeResult::failed(
            ProbeError::transport(TransportErrorKind::ConnectionRefused, "refused"),
            3,
            Duration::from_millis(10),
        )
    }

    fn rest_with(level: HealthStatus, latency_ms: u64) -> RestProbeResult {
        RestProbeResult {
            success: level != HealthStatus::Unhealthy,
            http_status: Some(200),
            level,
            status_indicator: None,
            error_indicators: Vec::new(),
            metrics: Map::new(),
            circuit_breaker_state: None,
            latency_ms,
            attempts: 1,
            error: None,
            timestamp: Utc::now(),
        }
    }

    fn rest_failed() -> RestProbeResult {
        RestProbeResult::failed(ProbeError::http_status(503, "HTTP 503"), Some(503), 3, Duration::ZERO)
    }

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(AggregationConfig::default())
    }

    #[test]
    fn test_both_disabled_is_unknown() {
        let record = aggregator().combine(&server(), None, None);
        assert_eq!(record.status, HealthStatus::Unknown);
        assert_eq!(record.error.as_deref(), Some(NO_PATH_ENABLED));
        assert_eq!(record.rpc_state, PathState::Disabled);
        assert_eq!(record.score, 0.0);
        assert!(record.available_paths.is_empty());
    }

    #[test]
    fn test_both_succeed_is_healthy() {
        let record = aggregator().combine(
            &server(),
            Some(rpc_ok(0)),
            Some(rest_with(HealthStatus::Healthy, 0)),
        );
        assert_eq!(record.status, HealthStatus::Healthy);
        assert_eq!(record.score, 1.0);
        assert_eq!(record.available_paths, vec![ProbePath::Rpc, ProbePath::Rest]);
        assert!(record.diagnostics.is_empty());
    }

    #[test]
    fn test_exactly_one_success_is_degraded() {
        let cases = [
            (rpc_ok(10), rest_failed()),
            (rpc_failed(), rest_with(HealthStatus::Healthy, 10)),
            (rpc_failed(), rest_with(HealthStatus::Degraded, 10)),
        ];
        for (rpc, rest) in cases {
            let record = aggregator().combine(&server(), Some(rpc), Some(rest));
            assert_eq!(record.status, HealthStatus::Degraded);
            assert_eq!(record.available_paths.len(), 1);
            assert_eq!(record.diagnostics.len(), 1);
        }
    }

    #[test]
    fn test_both_fail_is_unhealthy() {
        let record = aggregator().combine(&server(), Some(rpc_failed()), Some(rest_failed()));
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert_eq!(record.score, 0.0);
        assert_eq!(record.diagnostics.len(), 2);
        assert!(record.diagnostics[0].starts_with("rpc: "));
        assert!(record.diagnostics[1].starts_with("rest: "));
        assert_eq!(record.metrics.total_attempts, 6);
    }

    #[test]
    fn test_rest_degraded_downgrades_combined() {
        let record = aggregator().combine(
            &server(),
            Some(rpc_ok(0)),
            Some(rest_with(HealthStatus::Degraded, 0)),
        );
        assert_eq!(record.status, HealthStatus::Degraded);
        assert_eq!(record.available_paths.len(), 2);
        assert_eq!(record.score, 0.75);
    }

    #[test]
    fn test_single_enabled_path_follows_its_result() {
        let record = aggregator().combine(&server(), None, Some(rest_failed()));
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert_eq!(record.rpc_state, PathState::Disabled);

        let record = aggregator().combine(&server(), Some(rpc_ok(5)), None);
        assert_eq!(record.status, HealthStatus::Healthy);
        assert_eq!(record.available_paths, vec![ProbePath::Rpc]);
    }

    #[test]
    fn test_circuit_open_path_is_skipped_not_failed() {
        let record = aggregator().combine(
            &server(),
            Some(RpcProbeResult::skipped(Duration::from_secs(20))),
            Some(rest_with(HealthStatus::Healthy, 0)),
        );
        assert_eq!(record.status, HealthStatus::Healthy);
        assert_eq!(
            record.rpc_state,
            PathState::Skipped {
                retry_after_ms: 20_000
            }
        );
        assert_eq!(record.available_paths, vec![ProbePath::Rest]);
        assert_eq!(record.metrics.rpc_latency_ms, None);
    }

    #[test]
    fn test_all_paths_open_is_unhealthy() {
        let record = aggregator().combine(
            &server(),
            Some(RpcProbeResult::skipped(Duration::from_secs(5))),
            Some(RestProbeResult::skipped(Duration::from_secs(5))),
        );
        assert_eq!(record.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_all_paths_deferred_is_unknown() {
        let deferred = ProbeError::resource_limit("busy");
        let record = aggregator().combine(
            &server(),
            Some(RpcProbeResult::failed(deferred.clone(), 0, Duration::ZERO)),
            Some(RestProbeResult::failed(deferred, None, 0, Duration::ZERO)),
        );
        assert_eq!(record.status, HealthStatus::Unknown);
        assert_eq!(record.rest_state, PathState::Deferred);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_weighted_latency_score() {
        let mut server = server();
        server.rpc = PathConfig {
            timeout_ms: 1_000,
            ..PathConfig::default()
        };
        server.rest = PathConfig {
            timeout_ms: 1_000,
            ..PathConfig::default()
        };
        let aggregator = ResultAggregator::new(AggregationConfig {
            rpc_weight: 0.75,
            rest_weight: 0.25,
            ..AggregationConfig::default()
        });

        // rpc: 0.5 + 0.5 * 0.5 = 0.75, rest: 1.0
        let record = aggregator.combine(
            &server,
            Some(rpc_ok(500)),
            Some(rest_with(HealthStatus::Healthy, 0)),
        );
        assert!((record.score - (0.75 * 0.75 + 0.25 * 1.0)).abs() < 1e-9);
        assert_eq!(record.metrics.average_latency_ms, Some(250.0));
    }

    #[test]
    fn test_healthy_requires_a_success() {
        let results = [
            (Some(rpc_failed()), None),
            (None, Some(rest_failed())),
            (Some(rpc_failed()), Some(rest_failed())),
            (Some(RpcProbeResult::skipped(Duration::from_secs(1))), Some(rest_failed())),
        ];
        for (rpc, rest) in results {
            let record = aggregator().combine(&server(), rpc, rest);
            assert_ne!(record.status, HealthStatus::Healthy);
        }
    }
}
