//! OAuth2 client-credentials exchange

use crate::credential::{CachedCredential, DEFAULT_TOKEN_LIFETIME_SECS};
use crate::error::AuthError;
use crate::jwt::token_expiry;
use chrono::{DateTime, Duration, Utc};
use mcp_health_logging::get_sanitizer;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Token endpoint response (RFC 6749 §5.1)
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Parameters of one client-credentials request
#[derive(Debug, Clone, Copy)]
pub struct ClientCredentialsRequest<'a> {
    pub token_url: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub scopes: &'a [String],
    pub audience: Option<&'a str>,
}

/// Exchange client credentials for an access token
pub async fn request_token(
    client: &Client,
    request: ClientCredentialsRequest<'_>,
) -> Result<CachedCredential, AuthError> {
    let mut form: Vec<(&str, String)> = vec![
        ("grant_type", "client_credentials".to_string()),
        ("client_id", request.client_id.to_string()),
        ("client_secret", request.client_secret.to_string()),
    ];
    if !request.scopes.is_empty() {
        form.push(("scope", request.scopes.join(" ")));
    }
    if let Some(audience) = request.audience {
        form.push(("audience", audience.to_string()));
    }

    debug!("Requesting client-credentials token from {}", request.token_url);

    let response = client
        .post(request.token_url)
        .header(reqwest::header::ACCEPT, "application/json")
        .form(&form)
        .send()
        .await
        .map_err(|e| AuthError::network(&e))?;

    let status = response.status();
    let body = response.text().await.map_err(|e| AuthError::network(&e))?;

    if !status.is_success() {
        return Err(AuthError::TokenRequest {
            status: status.as_u16(),
            message: get_sanitizer().sanitize(body.trim()),
        });
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| AuthError::InvalidTokenResponse(e.to_string()))?;

    credential_from_response(token, request.scopes, Utc::now())
}

fn credential_from_response(
    token: TokenResponse,
    requested_scopes: &[String],
    now: DateTime<Utc>,
) -> Result<CachedCredential, AuthError> {
    if token.access_token.trim().is_empty() {
        return Err(AuthError::InvalidTokenResponse(
            "access_token is empty".to_string(),
        ));
    }

    let expires_at = match token_expiry(&token.access_token) {
        Some(at) => at,
        None => {
            let lifetime = token.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
            if lifetime <= 0 {
                return Err(AuthError::InvalidTokenResponse(format!(
                    "expires_in must be positive, got {lifetime}"
                )));
            }
            Duration::try_seconds(lifetime)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .ok_or_else(|| {
                    AuthError::InvalidTokenResponse(format!("expires_in out of range: {lifetime}"))
                })?
        }
    };

    let scopes = match token.scope {
        Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
        None => requested_scopes.to_vec(),
    };

    Ok(CachedCredential::new(token.access_token, expires_at)
        .with_token_type(token.token_type.unwrap_or_else(|| "Bearer".to_string()))
        .with_scopes(scopes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(access_token: &str, expires_in: Option<i64>) -> TokenResponse {
        TokenResponse {
            access_token: access_token.to_string(),
            token_type: Some("bearer".to_string()),
            expires_in,
            scope: None,
        }
    }

    #[test]
    fn test_expires_in_used_for_opaque_tokens() {
        let now = Utc::now();
        let credential = credential_from_response(response("opaque", Some(120)), &[], now).unwrap();
        assert_eq!(credential.expires_at, now + Duration::seconds(120));
        assert_eq!(credential.authorization_value(), "Bearer opaque");
    }

    #[test]
    fn test_default_lifetime_without_expiry() {
        let now = Utc::now();
        let credential = credential_from_response(response("opaque", None), &[], now).unwrap();
        assert_eq!(
            credential.expires_at,
            now + Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)
        );
    }

    #[test]
    fn test_scope_falls_back_to_requested() {
        let requested = vec!["mcp.read".to_string()];
        let credential =
            credential_from_response(response("opaque", Some(60)), &requested, Utc::now()).unwrap();
        assert_eq!(credential.scopes, requested);

        let mut granted = response("opaque", Some(60));
        granted.scope = Some("a b".to_string());
        let credential = credential_from_response(granted, &requested, Utc::now()).unwrap();
        assert_eq!(credential.scopes, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_unrepresentable_lifetime_rejected() {
        for expires_in in [100_000_000_000_000, i64::MAX, 0, -30] {
            let result = credential_from_response(response("opaque", Some(expires_in)), &[], Utc::now());
            assert!(
                matches!(result, Err(AuthError::InvalidTokenResponse(_))),
                "expires_in {expires_in}"
            );
        }
    }

    #[tokio::test]
    async fn test_huge_expires_in_from_endpoint_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"opaque","expires_in":100000000000000}"#)
            .create_async()
            .await;

        let token_url = format!("{}/token", server.url());
        let result = request_token(
            &Client::new(),
            ClientCredentialsRequest {
                token_url: &token_url,
                client_id: "monitor",
                client_secret: "secret",
                scopes: &[],
                audience: None,
            },
        )
        .await;
        assert!(matches!(result, Err(AuthError::InvalidTokenResponse(_))));
    }

    #[test]
    fn test_empty_token_rejected() {
        let result = credential_from_response(response("  ", Some(60)), &[], Utc::now());
        assert!(matches!(result, Err(AuthError::InvalidTokenResponse(_))));
    }
}
