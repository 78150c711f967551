//! RPC probe: JSON-RPC `tools/list` with inventory validation

use super::retry::{RetryPolicy, run_with_retry};
use super::{ProbeOptions, check_status};
use crate::config::{RetryConfig, ServerConfig};
use crate::error::ProbeError;
use crate::result::{ProbePath, RpcProbeResult};
use crate::transport::{ProbeRequest, ProbeTransport};
use chrono::Utc;
use mcp_health_auth::{AuthHeaders, AuthManager};
use mcp_health_logging::{StructuredContext, StructuredLogger};
use mcp_health_protocol::{
    PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER, Request, check_inventory, parse_body,
    parse_list_tools, validate_response_envelope,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, warn};

/// Upper bound on `nextCursor` pages followed in one attempt
pub const MAX_TOOL_PAGES: usize = 8;

pub struct RpcProbe {
    transport: Arc<dyn ProbeTransport>,
    auth: Arc<AuthManager>,
    retry: RetryConfig,
}

impl RpcProbe {
    pub fn new(transport: Arc<dyn ProbeTransport>, auth: Arc<AuthManager>, retry: RetryConfig) -> Self {
        Self {
            transport,
            auth,
            retry,
        }
    }

    /// Probe one server's RPC endpoint
    pub async fn probe(&self, server: &ServerConfig, options: &ProbeOptions) -> RpcProbeResult {
        let ctx = StructuredContext::new(&server.name, ProbePath::Rpc.as_str())
            .with_field("expected_tools", server.expected_tools.len());
        let span = StructuredLogger::create_span(&ctx);
        self.probe_inner(server, options, ctx).instrument(span).await
    }

    async fn probe_inner(
        &self,
        server: &ServerConfig,
        options: &ProbeOptions,
        ctx: StructuredContext,
    ) -> RpcProbeResult {
        let auth_headers = match &server.auth {
            Some(config) => match self.auth.get_auth_headers(&server.name, config).await {
                Ok(headers) => headers,
                Err(e) => return RpcProbeResult::failed(e.into(), 0, Duration::ZERO),
            },
            None => Vec::new(),
        };

        let policy = RetryPolicy::new(&self.retry, options.retry_attempts);
        let outcome = run_with_retry(
            policy,
            options.timeout,
            &options.cancel,
            &ctx,
            &server.rpc_url,
            |_| self.list_all_tools(server, &auth_headers, options.timeout),
        )
        .await;

        let tools = match outcome.result {
            Ok(tools) => tools,
            Err(e) => return RpcProbeResult::failed(e, outcome.attempts, outcome.latency),
        };

        let inventory = check_inventory(&tools, &server.expected_tools);
        let error = (!inventory.is_complete()).then(|| inventory_error(&inventory));

        RpcProbeResult {
            success: error.is_none(),
            discovered_tools: inventory.discovered,
            missing_tools: inventory.missing,
            malformed_tools: inventory.malformed,
            latency_ms: outcome.latency.as_millis() as u64,
            attempts: outcome.attempts,
            error_code: None,
            error,
            timestamp: Utc::now(),
        }
    }

    /// One attempt: every page of `tools/list`
    async fn list_all_tools(
        &self,
        server: &ServerConfig,
        auth_headers: &AuthHeaders,
        timeout: Duration,
    ) -> Result<Vec<Value>, ProbeError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let request = match &cursor {
                Some(cursor) => Request::list_tools_page(cursor),
                None => Request::list_tools(),
            };
            let page = self.list_page(server, auth_headers, timeout, &request).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        warn!(
            server = %server.name,
            pages = MAX_TOOL_PAGES,
            "tools/list pagination truncated"
        );
        Ok(tools)
    }

    async fn list_page(
        &self,
        server: &ServerConfig,
        auth_headers: &AuthHeaders,
        timeout: Duration,
        request: &Request,
    ) -> Result<mcp_health_protocol::ListToolsResult, ProbeError> {
        let body = serde_json::to_value(request)
            .map_err(|e| ProbeError::protocol(None, format!("failed to encode request: {e}")))?;
        let probe_request = ProbeRequest::post(ProbePath::Rpc, &server.rpc_url, body, timeout)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json, text/event-stream")
            .with_header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .with_headers(auth_headers.iter().cloned());

        let response = self.transport.send(probe_request).await?;
        check_status(&response, &self.auth, &server.name)?;

        let message = parse_body(&response.body).map_err(protocol_error)?;
        let envelope = validate_response_envelope(&message, &request.id).map_err(protocol_error)?;
        let result = envelope
            .outcome
            .map_err(|err| ProbeError::protocol(Some(err.code), err.message))?;
        parse_list_tools(result).map_err(protocol_error)
    }
}

fn protocol_error(err: mcp_health_protocol::Error) -> ProbeError {
    ProbeError::protocol(Some(err.code.as_i64()), err.message)
}

fn inventory_error(inventory: &mcp_health_protocol::ToolInventory) -> ProbeError {
    let mut parts = Vec::new();
    if !inventory.missing.is_empty() {
        parts.push(format!("missing tools: {}", inventory.missing.join(", ")));
    }
    for tool in &inventory.malformed {
        parts.push(format!("malformed tool {}: {}", tool.name, tool.reasons.join("; ")));
    }
    ProbeError::validation(parts.join("; "))
}
