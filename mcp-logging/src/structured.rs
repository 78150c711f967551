//! Structured logging for probes and monitoring cycles
//!
//! Every probe attempt is logged with the same field set (server, path,
//! correlation id, attempt, duration) so that one server's history can be
//! reconstructed from the log stream alone.

use crate::sanitization::get_sanitizer;
use crate::{LoggingError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Include the module target in each line
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
            with_target: false,
        }
    }
}

/// Install the global tracing subscriber
///
/// Fails if a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_filter))
        .map_err(|e| LoggingError::Config(format!("Invalid log filter: {e}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| LoggingError::Tracing(e.to_string()))
}

/// Structured logging context for one probe
#[derive(Debug, Clone)]
pub struct StructuredContext {
    pub correlation_id: String,
    pub server: String,
    pub path: String,
    pub attempt: u32,
    pub start_time: Instant,
    pub start_timestamp: u64,
    pub custom_fields: HashMap<String, Value>,
}

impl StructuredContext {
    /// Create a new context for a probe on one server path
    pub fn new(server: impl Into<String>, path: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            correlation_id: generate_correlation_id(),
            server: server.into(),
            path: path.into(),
            attempt: 0,
            start_time: Instant::now(),
            start_timestamp: timestamp,
            custom_fields: HashMap::new(),
        }
    }

    /// Reuse the correlation id carried by the outgoing request
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Context for the next retry attempt, timing restarts
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next.start_time = Instant::now();
        next
    }

    /// Add custom field
    pub fn with_field<K: ToString, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.custom_fields.insert(key.to_string(), value.into());
        self
    }

    /// Get elapsed time since context creation
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}

/// Error classification for log fields
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Client errors (4xx equivalent)
    Client { error_type: String, retryable: bool },
    /// Server errors (5xx equivalent)
    Server { error_type: String, retryable: bool },
    /// Network/communication errors
    Network { error_type: String, timeout: bool },
    /// Authentication/authorization errors
    Auth { error_type: String },
}

impl ErrorClass {
    /// Classify an error using the ErrorClassification trait
    pub fn from_error<E: crate::ErrorClassification>(error: &E) -> Self {
        if error.is_auth_error() {
            Self::Auth {
                error_type: error.error_type().to_string(),
            }
        } else if error.is_connection_error() || error.is_timeout() {
            Self::Network {
                error_type: error.error_type().to_string(),
                timeout: error.is_timeout(),
            }
        } else if error.is_retryable() {
            Self::Server {
                error_type: error.error_type().to_string(),
                retryable: true,
            }
        } else {
            Self::Client {
                error_type: error.error_type().to_string(),
                retryable: false,
            }
        }
    }
}

/// Structured logger for probe and cycle events
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log the start of a probe attempt
    pub fn log_probe_start(ctx: &StructuredContext, endpoint: &str) {
        debug!(
            correlation_id = %ctx.correlation_id,
            server = %ctx.server,
            path = %ctx.path,
            attempt = ctx.attempt,
            endpoint = %get_sanitizer().sanitize(endpoint),
            start_timestamp = ctx.start_timestamp,
            custom_fields = ?ctx.custom_fields,
            "Probe attempt started"
        );
    }

    /// Log the end of a probe attempt
    pub fn log_probe_end<E: crate::ErrorClassification>(
        ctx: &StructuredContext,
        success: bool,
        error: Option<&E>,
    ) {
        let duration_ms = ctx.elapsed_ms();

        if success {
            debug!(
                correlation_id = %ctx.correlation_id,
                server = %ctx.server,
                path = %ctx.path,
                attempt = ctx.attempt,
                duration_ms = duration_ms,
                "Probe attempt succeeded"
            );
        } else {
            let error_class = error.map(ErrorClass::from_error);
            warn!(
                correlation_id = %ctx.correlation_id,
                server = %ctx.server,
                path = %ctx.path,
                attempt = ctx.attempt,
                duration_ms = duration_ms,
                error_class = ?error_class,
                error_message = ?error.map(|e| get_sanitizer().sanitize_error(e)),
                "Probe attempt failed"
            );
        }
    }

    /// Log a retry decision
    pub fn log_retry(ctx: &StructuredContext, delay: Duration, reason: &str) {
        info!(
            correlation_id = %ctx.correlation_id,
            server = %ctx.server,
            path = %ctx.path,
            attempt = ctx.attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %get_sanitizer().sanitize(reason),
            "Retrying probe after backoff"
        );
    }

    /// Log performance warnings
    pub fn log_slow_probe(ctx: &StructuredContext, threshold_ms: u64) {
        let duration_ms = ctx.elapsed_ms();
        if duration_ms > threshold_ms {
            warn!(
                correlation_id = %ctx.correlation_id,
                server = %ctx.server,
                path = %ctx.path,
                duration_ms = duration_ms,
                threshold_ms = threshold_ms,
                "Slow probe detected"
            );
        }
    }

    /// Log the summary of one monitoring cycle
    pub fn log_cycle_summary(
        cycle_id: &str,
        servers: usize,
        healthy: usize,
        degraded: usize,
        unhealthy: usize,
        duration: Duration,
    ) {
        info!(
            cycle_id = %cycle_id,
            servers = servers,
            healthy = healthy,
            degraded = degraded,
            unhealthy = unhealthy,
            duration_ms = duration.as_millis() as u64,
            "Monitoring cycle completed"
        );
    }

    /// Create a structured tracing span
    pub fn create_span(ctx: &StructuredContext) -> tracing::Span {
        tracing::info_span!(
            "probe",
            correlation_id = %ctx.correlation_id,
            server = %ctx.server,
            path = %ctx.path
        )
    }
}

/// Generate a correlation ID for request tracing
fn generate_correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
#[path = "structured_tests.rs"]
mod structured_tests;
