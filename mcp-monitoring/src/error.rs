//! Error types for probing and monitoring

use mcp_health_auth::AuthError;
use mcp_health_logging::{ErrorClassification, get_sanitizer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Kind of transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    ConnectionRefused,
    Dns,
    Timeout,
    /// Probe cancelled by shutdown
    Cancelled,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ConnectionRefused => "connection refused",
            Self::Dns => "dns",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Other => "transport",
        };
        f.write_str(name)
    }
}

/// Why a probe did not produce a healthy answer
///
/// Always attached to the probe result; never propagated out of a cycle.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum ProbeError {
    #[error("Transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    #[error("Protocol error: {message}")]
    Protocol {
        code: Option<i64>,
        http_status: Option<u16>,
        message: String,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Authentication error: {message}")]
    Auth { message: String },

    #[error("Resource limit: {message}")]
    ResourceLimit { message: String },

    #[error("Circuit open, retry after {retry_after_ms} ms")]
    CircuitOpen { retry_after_ms: u64 },
}

impl ProbeError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            message: get_sanitizer().sanitize(&message.into()),
        }
    }

    pub fn timeout(after: Duration) -> Self {
        Self::Transport {
            kind: TransportErrorKind::Timeout,
            message: format!("no response within {} ms", after.as_millis()),
        }
    }

    pub fn cancelled() -> Self {
        Self::Transport {
            kind: TransportErrorKind::Cancelled,
            message: "probe cancelled".to_string(),
        }
    }

    /// Unexpected HTTP status
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Protocol {
            code: None,
            http_status: Some(status),
            message: get_sanitizer().sanitize(&message.into()),
        }
    }

    /// Malformed envelope or JSON-RPC error object
    pub fn protocol(code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            http_status: None,
            message: get_sanitizer().sanitize(&message.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: get_sanitizer().sanitize(&message.into()),
        }
    }

    pub fn resource_limit(message: impl Into<String>) -> Self {
        Self::ResourceLimit {
            message: message.into(),
        }
    }

    pub fn circuit_open(retry_after: Duration) -> Self {
        Self::CircuitOpen {
            retry_after_ms: retry_after.as_millis() as u64,
        }
    }

    /// Whether the probe loop may retry within the same cycle
    ///
    /// Transport failures and 5xx answers are retried. Everything else is
    /// deterministic or must wait for the next cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { kind, .. } => *kind != TransportErrorKind::Cancelled,
            Self::Protocol {
                http_status: Some(status),
                ..
            } => (500..600).contains(status),
            _ => false,
        }
    }

    /// Whether the failure drives the path's circuit breaker
    pub fn counts_as_failure(&self, count_validation_failures: bool) -> bool {
        match self {
            Self::Transport { kind, .. } => *kind != TransportErrorKind::Cancelled,
            Self::Protocol { .. } => true,
            Self::Validation { .. } => count_validation_failures,
            Self::Auth { .. } | Self::ResourceLimit { .. } | Self::CircuitOpen { .. } => false,
        }
    }

    /// Stable category name for logs, metrics and reports
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Protocol { .. } => "protocol",
            Self::Validation { .. } => "validation",
            Self::Auth { .. } => "auth",
            Self::ResourceLimit { .. } => "resource_limit",
            Self::CircuitOpen { .. } => "circuit_open",
        }
    }
}

impl From<AuthError> for ProbeError {
    fn from(err: AuthError) -> Self {
        Self::auth(err.to_string())
    }
}

impl ErrorClassification for ProbeError {
    fn error_type(&self) -> &str {
        self.category()
    }

    fn is_retryable(&self) -> bool {
        ProbeError::is_retryable(self)
    }

    fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            }
        )
    }

    fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::ConnectionRefused
                    | TransportErrorKind::Dns
                    | TransportErrorKind::Other,
                ..
            }
        )
    }
}

/// Errors surfaced by the monitor's own API
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown server: {0}")]
    ServerNotFound(String),

    #[error("No result recorded yet for server: {0}")]
    NoResult(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl MonitorError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<prometheus::Error> for MonitorError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

/// Result type for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;
