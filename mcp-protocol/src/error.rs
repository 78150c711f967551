//! Error types for the MCP protocol

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol error type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub struct Error {
    /// Error code following the JSON-RPC specification
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error {
    /// Create a new error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error with additional data
    pub fn with_data(code: ErrorCode, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Create a parse error
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Create a malformed envelope error
    pub fn malformed_envelope(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedEnvelope, message)
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a validation error
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Numeric JSON-RPC code
    pub fn code_value(&self) -> i64 {
        self.code.as_i64()
    }
}

/// Error codes following the JSON-RPC 2.0 specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // Standard JSON-RPC 2.0 errors
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,

    // MCP-specific errors
    Unauthorized,
    Forbidden,
    ValidationError,
    RateLimitExceeded,

    // The response did not follow the JSON-RPC envelope rules
    MalformedEnvelope,

    /// Any code this crate does not name
    Other(i64),
}

impl ErrorCode {
    /// Numeric value carried on the wire
    pub fn as_i64(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::Unauthorized => -32000,
            ErrorCode::Forbidden => -32001,
            ErrorCode::ValidationError => -32004,
            ErrorCode::RateLimitExceeded => -32005,
            ErrorCode::MalformedEnvelope => -32098,
            ErrorCode::Other(code) => *code,
        }
    }

    /// Map a wire value back to a code
    pub fn from_i64(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32000 => ErrorCode::Unauthorized,
            -32001 => ErrorCode::Forbidden,
            -32004 => ErrorCode::ValidationError,
            -32005 => ErrorCode::RateLimitExceeded,
            -32098 => ErrorCode::MalformedEnvelope,
            other => ErrorCode::Other(other),
        }
    }

    /// Whether the code reports a credential problem
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ErrorCode::Unauthorized | ErrorCode::Forbidden)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::ParseError => write!(f, "ParseError"),
            ErrorCode::InvalidRequest => write!(f, "InvalidRequest"),
            ErrorCode::MethodNotFound => write!(f, "MethodNotFound"),
            ErrorCode::InvalidParams => write!(f, "InvalidParams"),
            ErrorCode::InternalError => write!(f, "InternalError"),
            ErrorCode::Unauthorized => write!(f, "Unauthorized"),
            ErrorCode::Forbidden => write!(f, "Forbidden"),
            ErrorCode::ValidationError => write!(f, "ValidationError"),
            ErrorCode::RateLimitExceeded => write!(f, "RateLimitExceeded"),
            ErrorCode::MalformedEnvelope => write!(f, "MalformedEnvelope"),
            ErrorCode::Other(code) => write!(f, "Code({code})"),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::parse_error(err.to_string())
    }
}
