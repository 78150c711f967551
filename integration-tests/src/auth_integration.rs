//! Authenticated probes against real HTTP endpoints

use crate::test_utils::*;
use assert_matches::assert_matches;
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use mcp_health_auth::AuthConfig;
use mcp_health_monitor::{BreakerState, HealthStatus, PathState, ProbeError, ProbePath};
use mockito::{Matcher, Server};
use serde_json::json;

fn client_credentials(token_url: String, client_id: &str) -> AuthConfig {
    AuthConfig::OAuth2ClientCredentials {
        token_url,
        client_id: client_id.to_string(),
        client_secret: "fleet-secret".to_string(),
        scopes: vec!["mcp.read".to_string()],
        refresh_buffer_secs: 60,
    }
}

#[tokio::test]
async fn test_token_fetched_once_and_reused_across_cycles() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".to_string(),
            "client_credentials".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"fleet-token","token_type":"Bearer","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;
    let rpc = mock_tools(&mut server, "/mcp", &["search"])
        .match_header("authorization", "Bearer fleet-token")
        .expect(3)
        .create_async()
        .await;
    let health = server
        .mock("GET", "/health")
        .match_header("authorization", "Bearer fleet-token")
        .with_status(200)
        .with_body(r#"{"status":"ok"}"#)
        .expect(3)
        .create_async()
        .await;

    let config = http_server("search", &server.url(), &["search"]).with_auth(
        client_credentials(format!("{}/oauth/token", server.url()), "monitor"),
    );
    let monitor = http_monitor(vec![config]);

    for _ in 0..3 {
        let results = monitor.run_configured_cycle().await;
        assert_eq!(results["search"].status, HealthStatus::Healthy);
    }

    token.assert_async().await;
    rpc.assert_async().await;
    health.assert_async().await;
    assert_eq!(monitor.auth().refresh_count(), 1);
}

#[tokio::test]
async fn test_credentials_are_per_server() {
    let mut server = Server::new_async().await;
    let token = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"shared-idp-token","token_type":"Bearer","expires_in":3600}"#)
        .expect(2)
        .create_async()
        .await;
    mock_tools(&mut server, "/mcp", &["search"])
        .create_async()
        .await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .with_body(r#"{"status":"ok"}"#)
        .create_async()
        .await;

    let token_url = format!("{}/oauth/token", server.url());
    let monitor = http_monitor(vec![
        http_server("alpha", &server.url(), &["search"])
            .with_auth(client_credentials(token_url.clone(), "alpha")),
        http_server("beta", &server.url(), &["search"])
            .with_auth(client_credentials(token_url, "beta")),
    ]);

    let results = monitor.run_configured_cycle().await;
    assert_eq!(results["alpha"].status, HealthStatus::Healthy);
    assert_eq!(results["beta"].status, HealthStatus::Healthy);

    token.assert_async().await;
    assert!(monitor.auth().cached_credential("alpha").is_some());
    assert!(monitor.auth().cached_credential("beta").is_some());
}

#[tokio::test]
async fn test_jwt_discovery_then_probe() {
    let mut server = Server::new_async().await;
    let token_url = format!("{}/oauth/token", server.url());
    let discovery = server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(200)
        .with_body(json!({"issuer": server.url(), "token_endpoint": token_url}).to_string())
        .expect(1)
        .create_async()
        .await;

    let jwt = encode(
        &Header::default(),
        &json!({"sub": "monitor", "exp": Utc::now().timestamp() + 3_600}),
        &EncodingKey::from_secret(b"idp-secret"),
    )
    .unwrap();
    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(json!({"access_token": jwt, "token_type": "Bearer"}).to_string())
        .expect(1)
        .create_async()
        .await;
    let rpc = mock_tools(&mut server, "/mcp", &["search"])
        .match_header("authorization", format!("Bearer {jwt}").as_str())
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/health")
        .with_status(200)
        .create_async()
        .await;

    let config = http_server("search", &server.url(), &["search"]).with_auth(AuthConfig::Jwt {
        discovery_url: server.url(),
        client_id: "monitor".to_string(),
        client_secret: "fleet-secret".to_string(),
        scopes: Vec::new(),
        audience: None,
        refresh_buffer_secs: 60,
    });
    let monitor = http_monitor(vec![config]);

    monitor.run_configured_cycle().await;
    let results = monitor.run_configured_cycle().await;
    assert_eq!(results["search"].status, HealthStatus::Healthy);

    discovery.assert_async().await;
    rpc.assert_async().await;
}

#[tokio::test]
async fn test_rejected_credentials_are_not_downtime() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/oauth/token")
        .with_status(401)
        .with_body(r#"{"error":"invalid_client"}"#)
        .create_async()
        .await;
    let rpc = mock_tools(&mut server, "/mcp", &["search"])
        .expect(0)
        .create_async()
        .await;

    let mut config = http_server("search", &server.url(), &["search"]).with_auth(
        client_credentials(format!("{}/oauth/token", server.url()), "monitor"),
    );
    config.circuit_breaker.failure_threshold = 2;
    let monitor = http_monitor(vec![config]);

    for _ in 0..4 {
        let results = monitor.run_configured_cycle().await;
        let record = &results["search"];
        assert_eq!(record.rpc_state, PathState::Failed);
        assert_matches!(
            record.rpc.as_ref().unwrap().error,
            Some(ProbeError::Auth { .. })
        );
        assert!(record.diagnostics.iter().any(|d| d.starts_with("rpc:")));
        // the client secret never reaches a report
        assert!(record.diagnostics.iter().all(|d| !d.contains("fleet-secret")));
    }

    let state = monitor.get_circuit_state("search", ProbePath::Rpc).unwrap();
    assert_eq!(state.state, BreakerState::Closed);
    rpc.assert_async().await;
}
