//! Protocol probes
//!
//! [`RpcProbe`] issues a JSON-RPC `tools/list`, [`RestProbe`] a plain HTTP
//! GET against the health endpoint. Both return a result value; probe
//! failures never escape as `Err`.

pub mod rest;
pub mod retry;
pub mod rpc;

pub use rest::RestProbe;
pub use retry::{RetryOutcome, RetryPolicy, run_with_retry};
pub use rpc::RpcProbe;

use crate::config::PathConfig;
use crate::error::ProbeError;
use crate::transport::ProbeResponse;
use mcp_health_auth::AuthManager;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Longest response excerpt carried into an error message
const BODY_EXCERPT_CHARS: usize = 200;

/// Per-invocation probe settings
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub cancel: CancellationToken,
}

impl ProbeOptions {
    pub fn new(timeout: Duration, retry_attempts: u32) -> Self {
        Self {
            timeout,
            retry_attempts,
            cancel: CancellationToken::new(),
        }
    }

    pub fn for_path(config: &PathConfig, cancel: CancellationToken) -> Self {
        Self {
            timeout: config.timeout(),
            retry_attempts: config.retry_attempts,
            cancel,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Map a non-2xx answer to a probe error
///
/// 401 and 403 drop the cached credential so the next probe refreshes it.
pub(crate) fn check_status(
    response: &ProbeResponse,
    auth: &AuthManager,
    server: &str,
) -> Result<(), ProbeError> {
    match response.status {
        200..=299 => Ok(()),
        401 | 403 => {
            auth.invalidate(server);
            Err(ProbeError::auth(format!(
                "server rejected credentials with HTTP {}",
                response.status
            )))
        }
        status => Err(ProbeError::http_status(
            status,
            format!("HTTP {status}: {}", excerpt(&response.body)),
        )),
    }
}

pub(crate) fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= BODY_EXCERPT_CHARS {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
        format!("{cut}...")
    }
}
