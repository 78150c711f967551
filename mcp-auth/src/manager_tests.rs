//! Tests for the authentication manager

use super::*;
use assert_matches::assert_matches;
use chrono::Duration as ChronoDuration;
use jsonwebtoken::{EncodingKey, Header, encode};
use mockito::{Matcher, Server};
use serde_json::json;
use std::collections::BTreeMap;

fn oauth_config(token_url: String) -> AuthConfig {
    AuthConfig::OAuth2ClientCredentials {
        token_url,
        client_id: "monitor".to_string(),
        client_secret: "s3cr3t".to_string(),
        scopes: vec!["mcp.read".to_string()],
        refresh_buffer_secs: 300,
    }
}

fn header<'a>(headers: &'a AuthHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[tokio::test]
async fn test_static_variants() {
    let manager = AuthManager::in_memory().unwrap();

    let headers = manager
        .get_auth_headers("a", &AuthConfig::Bearer { token: "tok".to_string() })
        .await
        .unwrap();
    assert_eq!(header(&headers, "Authorization"), Some("Bearer tok"));

    let headers = manager
        .get_auth_headers(
            "a",
            &AuthConfig::ApiKey {
                key: "k1".to_string(),
                header_name: "X-API-Key".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(header(&headers, "X-API-Key"), Some("k1"));

    let headers = manager
        .get_auth_headers(
            "a",
            &AuthConfig::Basic {
                username: "user".to_string(),
                password: "pass".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(header(&headers, "Authorization"), Some("Basic dXNlcjpwYXNz"));

    let headers = manager
        .get_auth_headers(
            "a",
            &AuthConfig::CustomHeaders {
                headers: BTreeMap::from([
                    ("X-Tenant".to_string(), "acme".to_string()),
                    ("X-Region".to_string(), "eu".to_string()),
                ]),
            },
        )
        .await
        .unwrap();
    assert_eq!(headers.len(), 2);
    assert_eq!(header(&headers, "X-Tenant"), Some("acme"));

    assert_eq!(manager.refresh_count(), 0);
}

#[tokio::test]
async fn test_client_credentials_exchange_and_reuse() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".to_string(),
            "client_credentials".to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"opaque-1","token_type":"bearer","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let manager = AuthManager::in_memory().unwrap();
    let config = oauth_config(format!("{}/oauth/token", server.url()));

    for _ in 0..3 {
        let headers = manager.get_auth_headers("search", &config).await.unwrap();
        assert_eq!(header(&headers, "Authorization"), Some("Bearer opaque-1"));
    }

    mock.assert_async().await;
    assert_eq!(manager.refresh_count(), 1);
    let cached = manager.cached_credential("search").unwrap();
    assert_eq!(cached.scopes, vec!["mcp.read".to_string()]);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    // Expired credential from an earlier cycle
    store.put(
        "search",
        CachedCredential::new("stale", Utc::now() - ChronoDuration::seconds(10)),
    );

    let manager = Arc::new(AuthManager::new(AuthManagerConfig::default(), store).unwrap());
    let config = oauth_config(format!("{}/oauth/token", server.url()));

    let calls = (0..16).map(|_| {
        let manager = manager.clone();
        let config = config.clone();
        tokio::spawn(async move { manager.get_auth_headers("search", &config).await })
    });

    for result in futures::future::join_all(calls).await {
        let headers = result.unwrap().unwrap();
        assert_eq!(header(&headers, "Authorization"), Some("Bearer fresh"));
    }

    mock.assert_async().await;
    assert_eq!(manager.refresh_count(), 1);
}

#[tokio::test]
async fn test_jwt_discovery_once_and_expiry_from_claims() {
    let mut server = Server::new_async().await;
    let token_url = format!("{}/oauth/token", server.url());

    let discovery = server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(200)
        .with_body(json!({"issuer": server.url(), "token_endpoint": token_url}).to_string())
        .expect(1)
        .create_async()
        .await;

    // Expires inside the 300s buffer, so every call refreshes
    let exp = Utc::now().timestamp() + 120;
    let jwt = encode(
        &Header::default(),
        &json!({"sub": "monitor", "exp": exp}),
        &EncodingKey::from_secret(b"idp-secret"),
    )
    .unwrap();

    let token = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(json!({"access_token": jwt, "token_type": "Bearer"}).to_string())
        .expect(2)
        .create_async()
        .await;

    let manager = AuthManager::in_memory().unwrap();
    let config = AuthConfig::Jwt {
        discovery_url: server.url(),
        client_id: "monitor".to_string(),
        client_secret: "s3cr3t".to_string(),
        scopes: Vec::new(),
        audience: Some("mcp".to_string()),
        refresh_buffer_secs: 300,
    };

    manager.get_auth_headers("search", &config).await.unwrap();
    let cached = manager.cached_credential("search").unwrap();
    assert_eq!(cached.expires_at.timestamp(), exp);

    manager.get_auth_headers("search", &config).await.unwrap();

    discovery.assert_async().await;
    token.assert_async().await;
    assert_eq!(manager.refresh_count(), 2);
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_auth_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/oauth/token")
        .with_status(401)
        .with_body(r#"{"error":"invalid_client","client_secret":"s3cr3t"}"#)
        .create_async()
        .await;

    let manager = AuthManager::in_memory().unwrap();
    let config = oauth_config(format!("{}/oauth/token", server.url()));

    let err = manager.get_auth_headers("search", &config).await.unwrap_err();
    assert_matches!(err, AuthError::TokenRequest { status: 401, ref message } if !message.contains("s3cr3t"));
    assert!(manager.cached_credential("search").is_none());
}

#[tokio::test]
async fn test_invalid_token_response() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body("<html>login</html>")
        .create_async()
        .await;

    let manager = AuthManager::in_memory().unwrap();
    let config = oauth_config(format!("{}/oauth/token", server.url()));

    assert_matches!(
        manager.get_auth_headers("search", &config).await,
        Err(AuthError::InvalidTokenResponse(_))
    );
}

#[tokio::test]
async fn test_discovery_failure() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/.well-known/openid-configuration")
        .with_status(404)
        .create_async()
        .await;

    let manager = AuthManager::in_memory().unwrap();
    let config = AuthConfig::Jwt {
        discovery_url: server.url(),
        client_id: "monitor".to_string(),
        client_secret: "s3cr3t".to_string(),
        scopes: Vec::new(),
        audience: None,
        refresh_buffer_secs: 300,
    };

    assert_matches!(
        manager.get_auth_headers("search", &config).await,
        Err(AuthError::Discovery(_))
    );
}

#[tokio::test]
async fn test_invalidate_forces_refresh() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"t","expires_in":3600}"#)
        .expect(2)
        .create_async()
        .await;

    let manager = AuthManager::in_memory().unwrap();
    let config = oauth_config(format!("{}/oauth/token", server.url()));

    manager.get_auth_headers("search", &config).await.unwrap();
    manager.invalidate("search");
    assert!(manager.cached_credential("search").is_none());
    manager.get_auth_headers("search", &config).await.unwrap();

    mock.assert_async().await;
    assert_eq!(manager.refresh_count(), 2);
}

#[tokio::test]
async fn test_credentials_isolated_per_server() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"t","expires_in":3600}"#)
        .expect(2)
        .create_async()
        .await;

    let manager = AuthManager::in_memory().unwrap();
    let config = oauth_config(format!("{}/oauth/token", server.url()));

    manager.get_auth_headers("search", &config).await.unwrap();
    manager.get_auth_headers("recommend", &config).await.unwrap();
    manager.forget_server("search").await;

    assert!(manager.cached_credential("search").is_none());
    assert!(manager.cached_credential("recommend").is_some());
    mock.assert_async().await;
}

#[test]
fn test_static_headers_need_no_network() {
    let manager = AuthManager::in_memory().unwrap();
    let config = AuthConfig::ApiKey {
        key: "k".to_string(),
        header_name: "X-API-Key".to_string(),
    };
    let headers = tokio_test::block_on(manager.get_auth_headers("a", &config)).unwrap();
    assert_eq!(header(&headers, "X-API-Key"), Some("k"));
    assert!(manager.cached_credential("a").is_none());
}
