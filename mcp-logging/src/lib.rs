//! Structured logging for the MCP health monitor
//!
//! This crate provides the logging side of the monitor:
//! - Subscriber setup with `tracing-subscriber`
//! - Structured probe and cycle events
//! - Log sanitization so credentials never reach a log line
//!
//! # Example
//!
//! ```rust,no_run
//! use mcp_health_logging::{LogConfig, StructuredContext, StructuredLogger, init_logging};
//!
//! init_logging(&LogConfig::default()).expect("Failed to initialize logging");
//!
//! let ctx = StructuredContext::new("search-server", "rpc");
//! StructuredLogger::log_probe_start(&ctx, "https://search.example.com/mcp");
//! ```

pub mod sanitization;
pub mod structured;

pub use sanitization::{LogSanitizer, SanitizationConfig, get_sanitizer};
pub use structured::{
    ErrorClass, LogConfig, StructuredContext, StructuredLogger, init_logging,
};

/// Result type for logging operations
pub type Result<T> = std::result::Result<T, LoggingError>;

/// Logging error types
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tracing error: {0}")]
    Tracing(String),
}

/// Generic error trait for classification
pub trait ErrorClassification: std::fmt::Display + std::error::Error {
    fn error_type(&self) -> &str;
    fn is_retryable(&self) -> bool;
    fn is_timeout(&self) -> bool;
    fn is_auth_error(&self) -> bool;
    fn is_connection_error(&self) -> bool;
}
