//! End-to-end monitoring scenarios over a scripted fleet

use crate::test_utils::*;
use assert_matches::assert_matches;
use mcp_health_monitor::{
    BreakerState, CircuitBreakerConfig, HealthStatus, MonitorError, PathConfig, PathState,
    ProbeError, ProbePath, ProbeResponse, TransportErrorKind,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test]
async fn test_missing_expected_tool_fails_rpc_probe() {
    let fleet = ScriptedFleet::new();
    fleet.serve_tools(&rpc_url("search"), &["search"]);
    fleet.serve_health(&rest_url("search"), 200, json!({"status": "ok"}));
    let monitor = scripted_monitor(&fleet, vec![fleet_server("search", &["search", "recommend"])]);

    let results = monitor.run_configured_cycle().await;
    let record = &results["search"];
    let rpc = record.rpc.as_ref().unwrap();
    assert!(!rpc.success);
    assert_eq!(rpc.missing_tools, vec!["recommend".to_string()]);
    assert_eq!(rpc.discovered_tools, vec!["search".to_string()]);

    // REST still answers, so the server is degraded rather than down
    assert_eq!(record.status, HealthStatus::Degraded);
    assert_eq!(record.available_paths, vec![ProbePath::Rest]);
    assert!(record.diagnostics.iter().any(|d| d.contains("recommend")));
}

#[tokio::test]
async fn test_error_body_on_2xx_is_unhealthy() {
    let fleet = ScriptedFleet::new();
    fleet.serve_health(&rest_url("search"), 200, json!({"status": "error"}));
    let mut server = fleet_server("search", &[]);
    server.rpc = PathConfig::disabled();
    let monitor = scripted_monitor(&fleet, vec![server]);

    let results = monitor.run_configured_cycle().await;
    let rest = results["search"].rest.as_ref().unwrap();
    assert_eq!(rest.http_status, Some(200));
    assert_eq!(rest.level, HealthStatus::Unhealthy);
    assert!(!rest.success);
    assert_eq!(results["search"].status, HealthStatus::Unhealthy);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_timeouts_open_the_circuit() {
    let fleet = ScriptedFleet::new();
    fleet.on(&rpc_url("search"), |_, _| Scripted::Hang);
    let mut server = fleet_server("search", &["search"]);
    server.rest = PathConfig::disabled();
    server.rpc.timeout_ms = 200;
    server.rpc.retry_attempts = 0;
    server.circuit_breaker = CircuitBreakerConfig {
        failure_threshold: 3,
        recovery_threshold: 2,
        reset_timeout_ms: 30_000,
    };
    let monitor = scripted_monitor(&fleet, vec![server]);

    for _ in 0..3 {
        let results = monitor.run_configured_cycle().await;
        let rpc = results["search"].rpc.as_ref().unwrap();
        assert_matches!(
            rpc.error,
            Some(ProbeError::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            })
        );
    }
    let state = monitor.get_circuit_state("search", ProbePath::Rpc).unwrap();
    assert_eq!(state.state, BreakerState::Open);
    assert_eq!(fleet.hits(&rpc_url("search")), 3);

    let results = monitor.run_configured_cycle().await;
    let record = &results["search"];
    assert_matches!(
        record.rpc_state,
        PathState::Skipped { retry_after_ms } if retry_after_ms > 0
    );
    assert_matches!(
        record.rpc.as_ref().unwrap().error,
        Some(ProbeError::CircuitOpen { retry_after_ms }) if retry_after_ms > 0
    );
    assert_eq!(fleet.hits(&rpc_url("search")), 3);
}

#[tokio::test(start_paused = true)]
async fn test_server_removed_mid_cycle_reported_once() {
    let fleet = ScriptedFleet::new();
    fleet.serve_tools(&rpc_url("stable"), &["search"]);
    fleet.serve_health(&rest_url("stable"), 200, json!({"status": "ok"}));
    fleet.on(&rpc_url("leaving"), |request, _| {
        Scripted::After(
            Duration::from_millis(500),
            rpc_reply(request, json!({"tools": [tool("search")]})),
        )
    });
    fleet.serve_health(&rest_url("leaving"), 200, json!({"status": "ok"}));

    let monitor = Arc::new(scripted_monitor(
        &fleet,
        vec![
            fleet_server("stable", &["search"]),
            fleet_server("leaving", &["search"]),
        ],
    ));

    let cycle = tokio::spawn({
        let monitor = monitor.clone();
        async move { monitor.run_configured_cycle().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    tokio_test::assert_ok!(
        monitor
            .reload_config(vec![fleet_server("stable", &["search"])])
            .await
    );

    let in_flight = cycle.await.unwrap();
    assert_eq!(in_flight.len(), 2);
    assert_eq!(in_flight["leaving"].status, HealthStatus::Healthy);

    let next = monitor.run_configured_cycle().await;
    assert_eq!(next.len(), 1);
    assert!(next.contains_key("stable"));
    assert_matches!(
        monitor.get_last_result("leaving"),
        Err(MonitorError::ServerNotFound(_))
    );
    // the late result must not bring back breakers or metric series
    for path in [ProbePath::Rpc, ProbePath::Rest] {
        assert_matches!(
            monitor.get_circuit_state("leaving", path),
            Err(MonitorError::ServerNotFound(_))
        );
    }
    let text = monitor.metrics().render_prometheus().unwrap();
    assert!(!text.contains(r#"server="leaving""#), "{text}");
    assert!(monitor.metrics().snapshot().path("leaving", ProbePath::Rpc).is_none());
    assert_eq!(fleet.hits(&rpc_url("leaving")), 1);
}

#[tokio::test]
async fn test_exactly_one_path_up_is_degraded() {
    let fleet = ScriptedFleet::new();
    // RPC up, REST down
    fleet.serve_tools(&rpc_url("a"), &["search"]);
    fleet.serve_health(&rest_url("a"), 404, json!({}));
    // RPC down, REST up
    fleet.on(&rpc_url("b"), |_, _| {
        Scripted::Reply(ProbeResponse::new(400, "bad request"))
    });
    fleet.serve_health(&rest_url("b"), 200, json!({"healthy": true}));

    let monitor = scripted_monitor(
        &fleet,
        vec![fleet_server("a", &["search"]), fleet_server("b", &["search"])],
    );
    let results = monitor.run_configured_cycle().await;

    assert_eq!(results["a"].status, HealthStatus::Degraded);
    assert_eq!(results["a"].available_paths, vec![ProbePath::Rpc]);
    assert_eq!(results["b"].status, HealthStatus::Degraded);
    assert_eq!(results["b"].available_paths, vec![ProbePath::Rest]);
}

#[tokio::test]
async fn test_both_paths_disabled_is_unknown() {
    let fleet = ScriptedFleet::new();
    let mut server = fleet_server("dark", &[]);
    server.rpc = PathConfig::disabled();
    server.rest = PathConfig::disabled();
    let monitor = scripted_monitor(&fleet, vec![server]);

    let results = monitor.run_configured_cycle().await;
    assert_eq!(results["dark"].status, HealthStatus::Unknown);
    assert!(results["dark"].error.is_some());
    assert_eq!(fleet.hits(&rpc_url("dark")) + fleet.hits(&rest_url("dark")), 0);
}

#[tokio::test]
async fn test_one_unreachable_server_does_not_abort_cycle() {
    let fleet = ScriptedFleet::new();
    fleet.serve_tools(&rpc_url("up"), &["search"]);
    fleet.serve_health(&rest_url("up"), 200, json!({"status": "ok"}));
    let mut down = fleet_server("down", &["search"]);
    down.rpc.retry_attempts = 0;
    down.rest.retry_attempts = 0;

    let monitor = scripted_monitor(&fleet, vec![fleet_server("up", &["search"]), down]);
    let results = monitor.run_configured_cycle().await;

    assert_eq!(results.len(), 2);
    assert_eq!(results["up"].status, HealthStatus::Healthy);
    assert_eq!(results["down"].status, HealthStatus::Unhealthy);
    assert_matches!(
        results["down"].rest.as_ref().unwrap().error,
        Some(ProbeError::Transport {
            kind: TransportErrorKind::ConnectionRefused,
            ..
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_retry_delays_strictly_increase() {
    let fleet = ScriptedFleet::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    fleet.on(&rest_url("flaky"), {
        let seen = seen.clone();
        move |_, _| {
            seen.lock().push(Instant::now());
            Scripted::Error(ProbeError::transport(
                TransportErrorKind::ConnectionRefused,
                "refused",
            ))
        }
    });
    let mut server = fleet_server("flaky", &[]);
    server.rpc = PathConfig::disabled();
    server.rest.retry_attempts = 3;
    let monitor = scripted_monitor(&fleet, vec![server]);

    let results = monitor.run_configured_cycle().await;
    assert_eq!(results["flaky"].rest.as_ref().unwrap().attempts, 4);

    let seen = seen.lock();
    assert_eq!(seen.len(), 4);
    let gaps: Vec<Duration> = seen.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.windows(2).all(|g| g[1] > g[0]), "{gaps:?}");
}

#[tokio::test]
async fn test_client_errors_never_retried() {
    let fleet = ScriptedFleet::new();
    fleet.serve_health(&rest_url("strict"), 403, json!({"error": "forbidden"}));
    let mut server = fleet_server("strict", &[]);
    server.rpc = PathConfig::disabled();
    server.rest.retry_attempts = 3;
    let monitor = scripted_monitor(&fleet, vec![server]);

    monitor.run_configured_cycle().await;
    assert_eq!(fleet.hits(&rest_url("strict")), 1);
}
