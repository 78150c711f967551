//! Authentication errors

use thiserror::Error;

/// Failure to build or refresh credentials for a probe
///
/// Surfaced to the monitor as its own category so that "credentials invalid"
/// is never confused with "server down".
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("Token request rejected with HTTP {status}: {message}")]
    TokenRequest { status: u16, message: String },

    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    #[error("Invalid auth configuration: {0}")]
    InvalidConfig(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl AuthError {
    /// Create a network error from a reqwest failure, scrubbing credentials
    pub fn network(err: &reqwest::Error) -> Self {
        Self::Network(mcp_health_logging::get_sanitizer().sanitize(&err.to_string()))
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether another attempt in a later cycle could succeed
    ///
    /// Configuration errors need an operator; everything else may be a
    /// transient identity-provider outage.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidConfig(_))
    }
}
