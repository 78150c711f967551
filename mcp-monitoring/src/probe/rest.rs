//! REST probe: GET against the health endpoint, with body inspection

use super::retry::{RetryPolicy, run_with_retry};
use super::{ProbeOptions, check_status};
use crate::config::{RetryConfig, ServerConfig};
use crate::error::ProbeError;
use crate::result::{HealthStatus, ProbePath, RestProbeResult};
use crate::transport::{ProbeRequest, ProbeResponse, ProbeTransport};
use chrono::Utc;
use mcp_health_auth::AuthManager;
use mcp_health_logging::{StructuredContext, StructuredLogger};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

const STATUS_KEYS: [&str; 3] = ["status", "health", "healthy"];
const ERROR_KEYS: [&str; 4] = ["error", "errors", "failure", "failed"];
const BREAKER_KEYS: [&str; 3] = ["circuit_breaker", "circuitBreaker", "circuit_breaker_state"];

const HEALTHY_VALUES: [&str; 7] = ["ok", "healthy", "up", "pass", "passing", "green", "running"];
const DEGRADED_VALUES: [&str; 5] = ["degraded", "warn", "warning", "partial", "yellow"];
const UNHEALTHY_VALUES: [&str; 8] = [
    "error", "unhealthy", "down", "fail", "failed", "failing", "critical", "red",
];

pub struct RestProbe {
    transport: Arc<dyn ProbeTransport>,
    auth: Arc<AuthManager>,
    retry: RetryConfig,
}

impl RestProbe {
    pub fn new(transport: Arc<dyn ProbeTransport>, auth: Arc<AuthManager>, retry: RetryConfig) -> Self {
        Self {
            transport,
            auth,
            retry,
        }
    }

    /// Probe one server's REST health endpoint
    pub async fn probe(&self, server: &ServerConfig, options: &ProbeOptions) -> RestProbeResult {
        let ctx = StructuredContext::new(&server.name, ProbePath::Rest.as_str());
        let span = StructuredLogger::create_span(&ctx);
        self.probe_inner(server, options, ctx).instrument(span).await
    }

    async fn probe_inner(
        &self,
        server: &ServerConfig,
        options: &ProbeOptions,
        ctx: StructuredContext,
    ) -> RestProbeResult {
        let auth_headers = match &server.auth {
            Some(config) => match self.auth.get_auth_headers(&server.name, config).await {
                Ok(headers) => headers,
                Err(e) => return RestProbeResult::failed(e.into(), None, 0, Duration::ZERO),
            },
            None => Vec::new(),
        };

        let policy = RetryPolicy::new(&self.retry, options.retry_attempts);
        let outcome = run_with_retry(
            policy,
            options.timeout,
            &options.cancel,
            &ctx,
            &server.rest_url,
            |_| {
                let request = ProbeRequest::get(ProbePath::Rest, &server.rest_url, options.timeout)
                    .with_header("Accept", "application/json")
                    .with_headers(auth_headers.iter().cloned());
                async move {
                    let response = self.transport.send(request).await?;
                    check_status(&response, &self.auth, &server.name)?;
                    Ok(response)
                }
            },
        )
        .await;

        match outcome.result {
            Ok(response) => interpret(&response, outcome.attempts, outcome.latency),
            Err(e) => {
                let status = status_of(&e);
                RestProbeResult::failed(e, status, outcome.attempts, outcome.latency)
            }
        }
    }
}

fn status_of(error: &ProbeError) -> Option<u16> {
    match error {
        ProbeError::Protocol { http_status, .. } => *http_status,
        _ => None,
    }
}

/// Classification of a 2xx health answer
fn interpret(response: &ProbeResponse, attempts: u32, latency: Duration) -> RestProbeResult {
    let mut result = RestProbeResult {
        success: true,
        http_status: Some(response.status),
        level: HealthStatus::Healthy,
        status_indicator: None,
        error_indicators: Vec::new(),
        metrics: Map::new(),
        circuit_breaker_state: None,
        latency_ms: latency.as_millis() as u64,
        attempts,
        error: None,
        timestamp: Utc::now(),
    };

    let body = response.body.trim();
    if body.is_empty() {
        return result;
    }
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        // plain-text bodies such as "OK" carry no indicators
        return result;
    };
    let Some(object) = value.as_object() else {
        result.success = false;
        result.level = HealthStatus::Unhealthy;
        result.error = Some(ProbeError::validation("unrecognized health body"));
        return result;
    };

    let indicator = STATUS_KEYS
        .iter()
        .find_map(|key| object.get(*key).filter(|v| !v.is_null()));
    let explicit = indicator.map(classify_indicator);
    result.status_indicator = indicator.map(indicator_text);

    result.error_indicators = ERROR_KEYS
        .iter()
        .filter(|key| object.get(**key).is_some_and(is_present))
        .map(|key| key.to_string())
        .collect();

    result.level = match (explicit, result.error_indicators.is_empty()) {
        (Some(level), true) => level,
        (None, true) => HealthStatus::Healthy,
        (Some(HealthStatus::Healthy), false) => HealthStatus::Degraded,
        (_, false) => HealthStatus::Unhealthy,
    };

    if let Some(Value::Object(metrics)) = object.get("metrics") {
        result.metrics = metrics.clone();
    }
    result.circuit_breaker_state = BREAKER_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .map(breaker_text);

    result.success = matches!(result.level, HealthStatus::Healthy | HealthStatus::Degraded);
    if !result.success {
        let mut reasons = Vec::new();
        if let Some(indicator) = &result.status_indicator {
            reasons.push(format!("status indicator {indicator:?}"));
        }
        if !result.error_indicators.is_empty() {
            reasons.push(format!("error indicators: {}", result.error_indicators.join(", ")));
        }
        result.error = Some(ProbeError::validation(format!(
            "health endpoint reports unhealthy ({})",
            reasons.join("; ")
        )));
    }
    result
}

fn classify_indicator(value: &Value) -> HealthStatus {
    match value {
        Value::Bool(true) => HealthStatus::Healthy,
        Value::Bool(false) => HealthStatus::Unhealthy,
        Value::String(s) => {
            let s = s.trim().to_ascii_lowercase();
            if HEALTHY_VALUES.contains(&s.as_str()) {
                HealthStatus::Healthy
            } else if DEGRADED_VALUES.contains(&s.as_str()) {
                HealthStatus::Degraded
            } else if UNHEALTHY_VALUES.contains(&s.as_str()) {
                HealthStatus::Unhealthy
            } else {
                HealthStatus::Degraded
            }
        }
        _ => HealthStatus::Degraded,
    }
}

fn indicator_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn breaker_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("state")
            .map(indicator_text)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// Whether an error indicator carries anything
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
        Value::Number(_) => true,
    }
}
