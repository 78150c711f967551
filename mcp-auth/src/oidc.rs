//! OIDC discovery

use crate::error::AuthError;
use mcp_health_logging::get_sanitizer;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

/// Subset of the provider metadata document the monitor needs
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    #[serde(default)]
    pub issuer: Option<String>,
    pub token_endpoint: String,
}

/// Resolve the metadata URL for an issuer or a full discovery URL
pub fn metadata_url(discovery_url: &str) -> String {
    if discovery_url.contains("/.well-known/") {
        discovery_url.to_string()
    } else {
        format!("{}{}", discovery_url.trim_end_matches('/'), WELL_KNOWN_PATH)
    }
}

/// Fetch the provider metadata and return it
pub async fn discover(client: &Client, discovery_url: &str) -> Result<ProviderMetadata, AuthError> {
    let url = metadata_url(discovery_url);
    debug!("Fetching OIDC provider metadata from {}", url);

    let response = client
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| AuthError::Discovery(get_sanitizer().sanitize(&e.to_string())))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Discovery(format!(
            "{url} returned HTTP {}",
            status.as_u16()
        )));
    }

    let metadata: ProviderMetadata = response
        .json()
        .await
        .map_err(|e| AuthError::Discovery(format!("invalid provider metadata: {e}")))?;

    if metadata.token_endpoint.trim().is_empty() {
        return Err(AuthError::Discovery(
            "provider metadata has an empty token_endpoint".to_string(),
        ));
    }

    Ok(metadata)
}
