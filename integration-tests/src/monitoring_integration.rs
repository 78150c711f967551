//! Monitoring over real HTTP: transport, config loading, metrics and the run loop

use crate::test_utils::*;
use mcp_health_monitor::{FleetConfig, HealthMonitor, HealthStatus, ProbePath};
use mockito::{Matcher, Server};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_healthy_server_over_http() {
    let mut server = Server::new_async().await;
    let rpc = mock_tools(&mut server, "/mcp", &["search", "recommend"])
        .match_header("mcp-protocol-version", Matcher::Any)
        .match_body(Matcher::PartialJsonString(
            r#"{"jsonrpc":"2.0","method":"tools/list"}"#.to_string(),
        ))
        .expect(1)
        .create_async()
        .await;
    let health = server
        .mock("GET", "/health")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"status":"healthy","metrics":{"uptime_secs":120},"circuit_breaker":"closed"}"#)
        .expect(1)
        .create_async()
        .await;

    let monitor = http_monitor(vec![http_server(
        "search",
        &server.url(),
        &["search", "recommend"],
    )]);
    let results = monitor.run_configured_cycle().await;
    let record = &results["search"];

    assert_eq!(record.status, HealthStatus::Healthy);
    assert!(record.score > 0.5);
    assert!(record.diagnostics.is_empty());
    let rest = record.rest.as_ref().unwrap();
    assert_eq!(rest.metrics["uptime_secs"], 120);
    assert_eq!(rest.circuit_breaker_state.as_deref(), Some("closed"));

    rpc.assert_async().await;
    health.assert_async().await;

    let stats = monitor.optimizer_stats();
    assert_eq!(stats.rpc_pool.acquired_total, 1);
    assert_eq!(stats.rest_pool.acquired_total, 1);
}

#[tokio::test]
async fn test_sse_framed_tools_list() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/mcp")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body_from_request(|request| {
            let id = request
                .body()
                .ok()
                .and_then(|body| serde_json::from_slice::<serde_json::Value>(body).ok())
                .and_then(|body| body.get("id").cloned())
                .unwrap_or(serde_json::Value::Null);
            let message = serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"tools": [tool("search")]}
            });
            format!("event: message\ndata: {message}\n\n").into_bytes()
        })
        .create_async()
        .await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .with_body("OK")
        .create_async()
        .await;

    let monitor = http_monitor(vec![http_server("search", &server.url(), &["search"])]);
    let results = monitor.run_configured_cycle().await;
    assert_eq!(results["search"].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_server_errors_retried_over_http() {
    let mut server = Server::new_async().await;
    let health = server
        .mock("GET", "/health")
        .with_status(503)
        .with_body("maintenance")
        .expect(2)
        .create_async()
        .await;

    let mut config = http_server("search", &server.url(), &[]);
    config.rpc.enabled = false;
    config.rest.retry_attempts = 1;
    let monitor = http_monitor(vec![config]);

    let results = monitor.run_configured_cycle().await;
    let rest = results["search"].rest.as_ref().unwrap();
    assert_eq!(rest.http_status, Some(503));
    assert_eq!(rest.attempts, 2);
    health.assert_async().await;
}

#[tokio::test]
async fn test_fleet_file_to_prometheus() {
    let mut server = Server::new_async().await;
    mock_tools(&mut server, "/mcp", &["search"])
        .create_async()
        .await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .with_body(r#"{"status":"ok"}"#)
        .create_async()
        .await;

    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[monitoring]
interval_secs = 5

[[servers]]
name = "search"
rpc_url = "{base}/mcp"
rest_url = "{base}/health"
expected_tools = ["search"]

[[servers]]
name = "rest-only"
rest_url = "{base}/health"

[servers.rpc]
enabled = false
"#,
        base = server.url()
    )
    .unwrap();

    let fleet = FleetConfig::from_file(file.path()).unwrap();
    fleet.validate().unwrap();
    let monitor = HealthMonitor::from_fleet(&fleet).unwrap();

    let results = monitor.trigger_manual_check(&["rest-only"], None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results["rest-only"].status, HealthStatus::Healthy);
    assert_eq!(results["rest-only"].available_paths, vec![ProbePath::Rest]);

    monitor.run_configured_cycle().await;
    let text = monitor.metrics().render_prometheus().unwrap();
    assert!(text.contains(r#"mcp_health_health_status{server="search"} 2"#));
    assert!(text.lines().any(|line| line.starts_with("mcp_health_probes_total")
        && line.contains(r#"server="search""#)
        && line.contains(r#"path="rpc""#)
        && line.ends_with(" 1")));
    assert!(text.contains("mcp_health_cycles_total 2"));

    let snapshot = monitor.metrics().snapshot();
    let rest = snapshot.path("rest-only", ProbePath::Rest).unwrap();
    assert_eq!(rest.probes, 2);
    assert_eq!(rest.success_rate, Some(1.0));
}

#[tokio::test]
async fn test_run_loop_until_shutdown() {
    let mut server = Server::new_async().await;
    mock_tools(&mut server, "/mcp", &["search"])
        .create_async()
        .await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .create_async()
        .await;

    let monitor = Arc::new(http_monitor(vec![http_server(
        "search",
        &server.url(),
        &["search"],
    )]));
    let shutdown = CancellationToken::new();
    let running = tokio::spawn({
        let monitor = monitor.clone();
        let shutdown = shutdown.clone();
        async move { monitor.run(shutdown).await }
    });

    wait_for_condition(
        || {
            let monitor = monitor.clone();
            async move { monitor.get_last_result("search").is_ok() }
        },
        Duration::from_secs(5),
        Duration::from_millis(20),
    )
    .await
    .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        monitor.get_last_result("search").unwrap().status,
        HealthStatus::Healthy
    );
}

#[tokio::test]
async fn test_monitors_do_not_share_state() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(500)
        .create_async()
        .await;

    let mut config = http_server("search", &server.url(), &[]);
    config.rpc.enabled = false;
    config.rest.retry_attempts = 0;
    config.circuit_breaker.failure_threshold = 1;

    let first = http_monitor(vec![config.clone()]);
    let second = http_monitor(vec![config]);
    first.run_configured_cycle().await;

    let tripped = first.get_circuit_state("search", ProbePath::Rest).unwrap();
    let untouched = second.get_circuit_state("search", ProbePath::Rest).unwrap();
    assert_ne!(tripped.state, untouched.state);
    assert_eq!(second.metrics().snapshot().cycles, 0);
}
