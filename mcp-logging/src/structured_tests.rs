//! Unit tests for structured logging

use super::*;
use crate::ErrorClassification;

#[derive(Debug)]
struct MockError {
    auth: bool,
    timeout: bool,
    retryable: bool,
}

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mock failure token=abc123")
    }
}

impl std::error::Error for MockError {}

impl ErrorClassification for MockError {
    fn error_type(&self) -> &str {
        "mock"
    }
    fn is_retryable(&self) -> bool {
        self.retryable
    }
    fn is_timeout(&self) -> bool {
        self.timeout
    }
    fn is_auth_error(&self) -> bool {
        self.auth
    }
    fn is_connection_error(&self) -> bool {
        false
    }
}

#[test]
fn test_context_creation() {
    let ctx = StructuredContext::new("search", "rpc");
    assert_eq!(ctx.server, "search");
    assert_eq!(ctx.path, "rpc");
    assert_eq!(ctx.attempt, 0);
    assert_eq!(ctx.correlation_id.len(), 32);
}

#[test]
fn test_next_attempt_keeps_correlation() {
    let ctx = StructuredContext::new("search", "rest").with_correlation_id("req-1");
    let next = ctx.next_attempt();
    assert_eq!(next.attempt, 1);
    assert_eq!(next.correlation_id, "req-1");
    assert_eq!(next.server, ctx.server);
}

#[test]
fn test_custom_fields() {
    let ctx = StructuredContext::new("search", "rpc").with_field("expected_tools", 2);
    assert_eq!(ctx.custom_fields.get("expected_tools"), Some(&Value::from(2)));
}

#[test]
fn test_error_classification() {
    let auth = MockError { auth: true, timeout: false, retryable: false };
    assert!(matches!(ErrorClass::from_error(&auth), ErrorClass::Auth { .. }));

    let timeout = MockError { auth: false, timeout: true, retryable: true };
    assert_eq!(
        ErrorClass::from_error(&timeout),
        ErrorClass::Network { error_type: "mock".to_string(), timeout: true }
    );

    let server = MockError { auth: false, timeout: false, retryable: true };
    assert!(matches!(ErrorClass::from_error(&server), ErrorClass::Server { retryable: true, .. }));

    let client = MockError { auth: false, timeout: false, retryable: false };
    assert!(matches!(ErrorClass::from_error(&client), ErrorClass::Client { retryable: false, .. }));
}

#[test]
fn test_logging_without_subscriber_is_harmless() {
    let ctx = StructuredContext::new("search", "rpc");
    StructuredLogger::log_probe_start(&ctx, "https://user:pw@search.example.com/mcp");
    StructuredLogger::log_probe_end(&ctx, false, Some(&MockError { auth: false, timeout: true, retryable: true }));
    StructuredLogger::log_probe_end::<MockError>(&ctx, true, None);
    StructuredLogger::log_retry(&ctx, Duration::from_millis(200), "timeout");
    StructuredLogger::log_slow_probe(&ctx, 0);
    StructuredLogger::log_cycle_summary("cycle", 3, 1, 1, 1, Duration::from_millis(5));
    let _span = StructuredLogger::create_span(&ctx);
}

#[test]
fn test_default_log_config() {
    let config = LogConfig::default();
    assert_eq!(config.default_filter, "info");
    assert!(!config.json);
}
