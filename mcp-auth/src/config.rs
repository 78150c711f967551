//! Per-server authentication configuration

use crate::error::AuthError;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Default proactive refresh window (5 minutes before expiry)
pub const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;

/// Largest accepted refresh window (one day)
pub const MAX_REFRESH_BUFFER_SECS: u64 = 86_400;

/// Default header used by the API key variant
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

fn default_refresh_buffer_secs() -> u64 {
    DEFAULT_REFRESH_BUFFER_SECS
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

/// How a probe authenticates against one server
///
/// Each server owns its own value; credentials are never shared between
/// servers.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// OIDC discovery followed by a client-credentials exchange
    Jwt {
        discovery_url: String,
        client_id: String,
        client_secret: String,
        #[serde(default)]
        scopes: Vec<String>,
        #[serde(default)]
        audience: Option<String>,
        #[serde(default = "default_refresh_buffer_secs")]
        refresh_buffer_secs: u64,
    },

    /// Static bearer token
    Bearer { token: String },

    /// Static API key sent in a header
    ApiKey {
        key: String,
        #[serde(default = "default_api_key_header")]
        header_name: String,
    },

    /// HTTP basic credentials
    Basic { username: String, password: String },

    /// Client-credentials grant against a known token endpoint
    #[serde(rename = "oauth2_client_credentials")]
    OAuth2ClientCredentials {
        token_url: String,
        client_id: String,
        client_secret: String,
        #[serde(default)]
        scopes: Vec<String>,
        #[serde(default = "default_refresh_buffer_secs")]
        refresh_buffer_secs: u64,
    },

    /// Arbitrary static headers
    CustomHeaders { headers: BTreeMap<String, String> },
}

impl AuthConfig {
    /// Short name of the variant, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Jwt { .. } => "jwt",
            Self::Bearer { .. } => "bearer",
            Self::ApiKey { .. } => "api_key",
            Self::Basic { .. } => "basic",
            Self::OAuth2ClientCredentials { .. } => "oauth2_client_credentials",
            Self::CustomHeaders { .. } => "custom_headers",
        }
    }

    /// Whether credentials are fetched from a token endpoint and expire
    pub fn requires_refresh(&self) -> bool {
        matches!(self, Self::Jwt { .. } | Self::OAuth2ClientCredentials { .. })
    }

    /// Refresh window for token-based variants
    pub fn refresh_buffer(&self) -> chrono::Duration {
        match self {
            Self::Jwt {
                refresh_buffer_secs,
                ..
            }
            | Self::OAuth2ClientCredentials {
                refresh_buffer_secs,
                ..
            } => chrono::Duration::seconds((*refresh_buffer_secs).min(MAX_REFRESH_BUFFER_SECS) as i64),
            _ => chrono::Duration::zero(),
        }
    }

    /// Validate the variant's fields at config-load time
    pub fn validate(&self) -> Result<(), AuthError> {
        match self {
            Self::Jwt {
                discovery_url,
                client_id,
                client_secret,
                refresh_buffer_secs,
                ..
            } => {
                validate_url("discovery_url", discovery_url)?;
                require("client_id", client_id)?;
                require("client_secret", client_secret)?;
                validate_refresh_buffer(*refresh_buffer_secs)
            }
            Self::Bearer { token } => {
                require("token", token)?;
                validate_header_value("token", token)
            }
            Self::ApiKey { key, header_name } => {
                require("key", key)?;
                validate_header_name(header_name)?;
                validate_header_value("key", key)
            }
            Self::Basic { username, .. } => {
                require("username", username)?;
                if username.contains(':') {
                    return Err(AuthError::invalid_config("username must not contain ':'"));
                }
                Ok(())
            }
            Self::OAuth2ClientCredentials {
                token_url,
                client_id,
                client_secret,
                refresh_buffer_secs,
                ..
            } => {
                validate_url("token_url", token_url)?;
                require("client_id", client_id)?;
                require("client_secret", client_secret)?;
                validate_refresh_buffer(*refresh_buffer_secs)
            }
            Self::CustomHeaders { headers } => {
                if headers.is_empty() {
                    return Err(AuthError::invalid_config(
                        "custom_headers requires at least one header",
                    ));
                }
                for (name, value) in headers {
                    validate_header_name(name)?;
                    validate_header_value(name, value)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const REDACTED: &str = "[REDACTED]";
        match self {
            Self::Jwt {
                discovery_url,
                client_id,
                scopes,
                audience,
                refresh_buffer_secs,
                ..
            } => f
                .debug_struct("Jwt")
                .field("discovery_url", discovery_url)
                .field("client_id", client_id)
                .field("client_secret", &REDACTED)
                .field("scopes", scopes)
                .field("audience", audience)
                .field("refresh_buffer_secs", refresh_buffer_secs)
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &REDACTED).finish(),
            Self::ApiKey { header_name, .. } => f
                .debug_struct("ApiKey")
                .field("key", &REDACTED)
                .field("header_name", header_name)
                .finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &REDACTED)
                .finish(),
            Self::OAuth2ClientCredentials {
                token_url,
                client_id,
                scopes,
                refresh_buffer_secs,
                ..
            } => f
                .debug_struct("OAuth2ClientCredentials")
                .field("token_url", token_url)
                .field("client_id", client_id)
                .field("client_secret", &REDACTED)
                .field("scopes", scopes)
                .field("refresh_buffer_secs", refresh_buffer_secs)
                .finish(),
            Self::CustomHeaders { headers } => {
                let names: Vec<&String> = headers.keys().collect();
                f.debug_struct("CustomHeaders")
                    .field("headers", &names)
                    .finish()
            }
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), AuthError> {
    if value.trim().is_empty() {
        Err(AuthError::invalid_config(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

fn validate_refresh_buffer(secs: u64) -> Result<(), AuthError> {
    if secs > MAX_REFRESH_BUFFER_SECS {
        return Err(AuthError::invalid_config(format!(
            "refresh_buffer_secs must be at most {MAX_REFRESH_BUFFER_SECS}, got {secs}"
        )));
    }
    Ok(())
}

fn validate_url(field: &str, value: &str) -> Result<(), AuthError> {
    let parsed = url::Url::parse(value)
        .map_err(|e| AuthError::invalid_config(format!("{field} is not a valid URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(AuthError::invalid_config(format!(
            "{field} must use http or https, got {other}"
        ))),
    }
}

fn validate_header_name(name: &str) -> Result<(), AuthError> {
    HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|_| AuthError::invalid_config(format!("invalid header name: {name}")))
}

fn validate_header_value(field: &str, value: &str) -> Result<(), AuthError> {
    HeaderValue::from_str(value)
        .map(|_| ())
        .map_err(|_| AuthError::invalid_config(format!("{field} is not a valid header value")))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
