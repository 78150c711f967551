//! Unit tests for the monitoring orchestrator

#[cfg(test)]
mod tests {
    use crate::aggregator::NO_PATH_ENABLED;
    use crate::circuit_breaker::BreakerState;
    use crate::config::{CircuitBreakerConfig, MonitoringConfig, PathConfig, ServerConfig};
    use crate::error::{MonitorError, ProbeError, TransportErrorKind};
    use crate::optimizer::{ResourceUsage, UsageSampler};
    use crate::orchestrator::*;
    use crate::result::{HealthStatus, PathState, ProbePath};
    use crate::test_support::*;
    use crate::transport::ProbeResponse;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn url(server: &str, path: &str) -> String {
        format!("http://{server}.test/{path}")
    }

    fn server(name: &str) -> ServerConfig {
        ServerConfig::new(name, url(name, "mcp"), url(name, "health"))
            .with_expected_tools(["search"])
    }

    /// Server probed over REST only, failing fast without retries
    fn rest_only(name: &str) -> ServerConfig {
        let mut server = server(name);
        server.rpc = PathConfig::disabled();
        server.rest.retry_attempts = 0;
        server.circuit_breaker = CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_threshold: 1,
            reset_timeout_ms: 10_000,
        };
        server
    }

    fn monitor(
        servers: Vec<ServerConfig>,
        transport: &Arc<ScriptedTransport>,
    ) -> HealthMonitor {
        monitor_with(MonitoringConfig::default(), servers, transport)
    }

    fn monitor_with(
        config: MonitoringConfig,
        servers: Vec<ServerConfig>,
        transport: &Arc<ScriptedTransport>,
    ) -> HealthMonitor {
        HealthMonitor::builder(config)
            .servers(servers)
            .transport(transport.clone())
            .sampler(Arc::new(IdleSampler))
            .build()
            .unwrap()
    }

    fn healthy(transport: &ScriptedTransport, name: &str) {
        transport.tools(&url(name, "mcp"), &["search"]);
        transport.health(&url(name, "health"), 200, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_cycle_combines_both_paths() {
        let transport = ScriptedTransport::new();
        healthy(&transport, "a");
        healthy(&transport, "b");
        let monitor = monitor(vec![server("a"), server("b")], &transport);

        let results = monitor.run_configured_cycle().await;
        assert_eq!(results.len(), 2);
        for record in results.values() {
            assert_eq!(record.status, HealthStatus::Healthy);
            assert_eq!(record.available_paths, vec![ProbePath::Rpc, ProbePath::Rest]);
            assert_eq!(record.metrics.rpc_success_rate, Some(1.0));
            assert_eq!(record.metrics.rest_success_rate, Some(1.0));
        }

        let cached = monitor.get_last_result("a").unwrap();
        assert!(Arc::ptr_eq(&cached, &results["a"]));
        assert_eq!(monitor.metrics().snapshot().cycles, 1);
    }

    #[tokio::test]
    async fn test_open_circuit_skips_network() {
        let transport = ScriptedTransport::new();
        transport.health(&url("svc", "health"), 503, json!({"status": "down"}));
        let monitor = monitor(vec![rest_only("svc")], &transport);

        for _ in 0..3 {
            let results = monitor.run_configured_cycle().await;
            assert_eq!(results["svc"].rest_state, PathState::Failed);
        }
        let state = monitor.get_circuit_state("svc", ProbePath::Rest).unwrap();
        assert_eq!(state.state, BreakerState::Open);
        assert_eq!(transport.calls_to(&url("svc", "health")), 3);

        let results = monitor.run_configured_cycle().await;
        let record = &results["svc"];
        assert_matches!(record.rest_state, PathState::Skipped { .. });
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert!(record.available_paths.is_empty());
        assert_eq!(transport.calls_to(&url("svc", "health")), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_recovers_after_reset_timeout() {
        let transport = ScriptedTransport::new();
        transport.route(&url("svc", "health"), |_, call| {
            if call < 3 {
                Reply::Respond(ProbeResponse::new(500, "boom"))
            } else {
                Reply::Respond(ProbeResponse::json(200, &json!({"status": "ok"})))
            }
        });
        let monitor = monitor(vec![rest_only("svc")], &transport);

        for _ in 0..3 {
            monitor.run_configured_cycle().await;
        }
        assert_eq!(
            monitor.get_circuit_state("svc", ProbePath::Rest).unwrap().state,
            BreakerState::Open
        );

        tokio::time::advance(Duration::from_secs(11)).await;
        let results = monitor.run_configured_cycle().await;
        assert_eq!(results["svc"].status, HealthStatus::Healthy);
        assert_eq!(
            monitor.get_circuit_state("svc", ProbePath::Rest).unwrap().state,
            BreakerState::Closed
        );
    }

    #[tokio::test]
    async fn test_validation_failures_do_not_trip_breaker_by_default() {
        let transport = ScriptedTransport::new();
        transport.tools(&url("svc", "mcp"), &["other"]);
        let mut server = server("svc");
        server.rest = PathConfig::disabled();
        let monitor = monitor(vec![server], &transport);

        for _ in 0..5 {
            let results = monitor.run_configured_cycle().await;
            assert_eq!(results["svc"].status, HealthStatus::Unhealthy);
        }
        let state = monitor.get_circuit_state("svc", ProbePath::Rpc).unwrap();
        assert_eq!(state.state, BreakerState::Closed);
        assert_eq!(transport.calls_to(&url("svc", "mcp")), 5);
    }

    #[tokio::test]
    async fn test_transitions_are_broadcast() {
        let transport = ScriptedTransport::new();
        transport.route(&url("svc", "health"), |_, call| {
            if call == 0 {
                Reply::Respond(ProbeResponse::json(200, &json!({"status": "ok"})))
            } else {
                Reply::Respond(ProbeResponse::new(503, "unavailable"))
            }
        });
        let monitor = monitor(vec![rest_only("svc")], &transport);
        let mut transitions = monitor.subscribe();

        monitor.run_configured_cycle().await;
        assert!(transitions.try_recv().is_err());

        monitor.run_configured_cycle().await;
        let transition = transitions.try_recv().unwrap();
        assert_eq!(transition.server, "svc");
        assert_eq!(transition.from, HealthStatus::Healthy);
        assert_eq!(transition.to, HealthStatus::Unhealthy);

        // unchanged status, no event
        monitor.run_configured_cycle().await;
        assert!(transitions.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_last_result_lookup() {
        let transport = ScriptedTransport::new();
        healthy(&transport, "a");
        let monitor = monitor(vec![server("a")], &transport);

        assert_matches!(monitor.get_last_result("a"), Err(MonitorError::NoResult(_)));
        assert_matches!(
            monitor.get_last_result("nobody"),
            Err(MonitorError::ServerNotFound(_))
        );

        monitor.run_configured_cycle().await;
        assert_eq!(monitor.get_last_result("a").unwrap().status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_manual_check_rejects_unknown_names() {
        let transport = ScriptedTransport::new();
        healthy(&transport, "a");
        let monitor = monitor(vec![server("a")], &transport);

        let result = monitor.trigger_manual_check(&["a", "ghost"], None).await;
        assert_matches!(result, Err(MonitorError::ServerNotFound(name)) if name == "ghost");
        assert_eq!(transport.calls_to(&url("a", "mcp")), 0);

        let results = monitor.trigger_manual_check(&["a"], None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results["a"].status, HealthStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_check_timeout_override() {
        let transport = ScriptedTransport::new();
        transport.route(&url("a", "mcp"), |_, _| Reply::Hang);
        transport.health(&url("a", "health"), 200, json!({"status": "ok"}));
        let mut server = server("a");
        server.rpc.retry_attempts = 0;
        let monitor = monitor(vec![server], &transport);

        let overrides = ProbeOverrides {
            rpc_timeout: Some(Duration::from_millis(100)),
            rest_timeout: None,
        };
        let results = monitor
            .trigger_manual_check(&["a"], Some(overrides))
            .await
            .unwrap();
        let record = &results["a"];
        let rpc = record.rpc.as_ref().unwrap();
        assert_eq!(rpc.latency_ms, 100);
        assert_matches!(
            rpc.error,
            Some(ProbeError::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            })
        );
        // one path down, the other up
        assert_eq!(record.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_both_paths_disabled() {
        let transport = ScriptedTransport::new();
        let mut server = ServerConfig::new("idle", "", "");
        server.rpc = PathConfig::disabled();
        server.rest = PathConfig::disabled();
        let monitor = monitor(vec![server], &transport);

        let results = monitor.run_configured_cycle().await;
        let record = &results["idle"];
        assert_eq!(record.status, HealthStatus::Unknown);
        assert_eq!(record.error.as_deref(), Some(NO_PATH_ENABLED));
        assert_eq!(record.rpc_state, PathState::Disabled);
        assert_eq!(record.rest_state, PathState::Disabled);
    }

    struct HeavySampler;

    impl UsageSampler for HeavySampler {
        fn sample(&self) -> ResourceUsage {
            ResourceUsage {
                memory_bytes: 512 * 1024 * 1024,
                cpu_percent: 5.0,
            }
        }
    }

    #[tokio::test]
    async fn test_probes_deferred_over_memory_ceiling() {
        let transport = ScriptedTransport::new();
        healthy(&transport, "a");
        let mut config = MonitoringConfig::default();
        config.resources.max_memory_mb = Some(256);
        let monitor = HealthMonitor::builder(config)
            .servers(vec![server("a")])
            .transport(transport.clone())
            .sampler(Arc::new(HeavySampler))
            .build()
            .unwrap();

        let results = monitor.run_configured_cycle().await;
        let record = &results["a"];
        assert_eq!(record.rpc_state, PathState::Deferred);
        assert_eq!(record.rest_state, PathState::Deferred);
        assert_eq!(record.status, HealthStatus::Unknown);
        assert_eq!(transport.calls_to(&url("a", "mcp")), 0);
        // a deferral is not a breaker failure
        let state = monitor.get_circuit_state("a", ProbePath::Rpc).unwrap();
        assert_eq!(state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_reload_prunes_removed_servers() {
        let transport = ScriptedTransport::new();
        healthy(&transport, "kept");
        transport.health(&url("gone", "health"), 503, json!({}));
        let monitor = monitor(vec![server("kept"), rest_only("gone")], &transport);

        monitor.run_configured_cycle().await;
        assert!(monitor.get_last_result("gone").is_ok());

        monitor.reload_config(vec![server("kept")]).await.unwrap();
        assert_matches!(
            monitor.get_last_result("gone"),
            Err(MonitorError::ServerNotFound(_))
        );
        assert_matches!(
            monitor.get_circuit_state("gone", ProbePath::Rest),
            Err(MonitorError::ServerNotFound(_))
        );
        assert!(
            monitor
                .metrics()
                .snapshot()
                .paths
                .iter()
                .all(|p| p.server != "gone")
        );
        assert!(monitor.get_last_result("kept").is_ok());

        let results = monitor.run_configured_cycle().await;
        assert_eq!(results.len(), 1);
        assert!(results.contains_key("kept"));
    }

    #[tokio::test]
    async fn test_reload_rejects_invalid_set() {
        let transport = ScriptedTransport::new();
        let monitor = monitor(vec![server("a")], &transport);

        let result = monitor.reload_config(vec![server("b"), server("b")]).await;
        assert_matches!(result, Err(MonitorError::Config(_)));
        assert_eq!(monitor.servers().len(), 1);
        assert_eq!(monitor.servers()[0].name, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_of_removed_server_not_cached() {
        let transport = ScriptedTransport::new();
        transport.route(&url("slow", "health"), |_, _| {
            Reply::Delayed(
                Duration::from_millis(200),
                ProbeResponse::json(200, &json!({"status": "ok"})),
            )
        });
        let monitor = Arc::new(monitor(vec![rest_only("slow")], &transport));
        let mut transitions = monitor.subscribe();

        let cycle = tokio::spawn({
            let monitor = monitor.clone();
            async move { monitor.run_configured_cycle().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.reload_config(Vec::new()).await.unwrap();

        let results = cycle.await.unwrap();
        assert_eq!(results["slow"].status, HealthStatus::Healthy);
        assert_matches!(
            monitor.get_last_result("slow"),
            Err(MonitorError::ServerNotFound(_))
        );
        assert!(transitions.try_recv().is_err());
        assert_matches!(
            monitor.get_circuit_state("slow", ProbePath::Rest),
            Err(MonitorError::ServerNotFound(_))
        );
        assert!(monitor.metrics().snapshot().paths.iter().all(|p| p.server != "slow"));
        let text = monitor.metrics().render_prometheus().unwrap();
        assert!(!text.contains(r#"server="slow""#), "{text}");
        assert!(monitor.run_configured_cycle().await.is_empty());
    }

    #[tokio::test]
    async fn test_circuit_state_defaults() {
        let transport = ScriptedTransport::new();
        let monitor = monitor(vec![server("a")], &transport);

        let state = monitor.get_circuit_state("a", ProbePath::Rpc).unwrap();
        assert_eq!(state.state, BreakerState::Closed);
        assert_matches!(
            monitor.get_circuit_state("b", ProbePath::Rpc),
            Err(MonitorError::ServerNotFound(_))
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let transport = ScriptedTransport::new();
        healthy(&transport, "a");
        let monitor = Arc::new(monitor(vec![server("a")], &transport));
        let shutdown = tokio_util::sync::CancellationToken::new();

        let handle = tokio::spawn({
            let monitor = monitor.clone();
            let shutdown = shutdown.clone();
            async move { monitor.run(shutdown).await }
        });
        // first tick fires immediately
        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor.get_last_result("a").is_err() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
