//! Scripted transport and fixtures shared by the unit tests

use crate::error::{ProbeError, TransportErrorKind};
use crate::optimizer::{ResourceUsage, UsageSampler};
use crate::transport::{ProbeRequest, ProbeResponse, ProbeTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What a scripted endpoint does with one request
pub enum Reply {
    Respond(ProbeResponse),
    Fail(ProbeError),
    /// Answer after a delay
    Delayed(Duration, ProbeResponse),
    /// Never answer
    Hang,
}

type Handler = Arc<dyn Fn(&ProbeRequest, usize) -> Reply + Send + Sync>;

/// Transport answering from per-URL handlers; unknown URLs refuse connections
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<ProbeRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install a handler; it receives the request and the 0-based call count
    pub fn route<F>(&self, url: &str, handler: F)
    where
        F: Fn(&ProbeRequest, usize) -> Reply + Send + Sync + 'static,
    {
        self.routes.lock().insert(url.to_string(), Arc::new(handler));
    }

    /// RPC endpoint listing the given tools
    pub fn tools(&self, url: &str, names: &[&str]) {
        let tools: Vec<Value> = names.iter().map(|n| tool(n)).collect();
        self.route(url, move |request, _| {
            Reply::Respond(rpc_result(request, json!({ "tools": tools })))
        });
    }

    /// REST endpoint answering with a fixed status and JSON body
    pub fn health(&self, url: &str, status: u16, body: Value) {
        self.route(url, move |_, _| Reply::Respond(ProbeResponse::json(status, &body)));
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|r| r.url == url).count()
    }

    pub fn requests_to(&self, url: &str) -> Vec<ProbeRequest> {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProbeTransport for ScriptedTransport {
    async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse, ProbeError> {
        let (handler, count) = {
            let mut calls = self.calls.lock();
            let count = calls.iter().filter(|r| r.url == request.url).count();
            calls.push(request.clone());
            (self.routes.lock().get(&request.url).cloned(), count)
        };
        let Some(handler) = handler else {
            return Err(ProbeError::transport(
                TransportErrorKind::ConnectionRefused,
                "connection refused",
            ));
        };
        match handler(&request, count) {
            Reply::Respond(response) => Ok(response),
            Reply::Fail(error) => Err(error),
            Reply::Delayed(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// Well-formed tool entry
pub fn tool(name: &str) -> Value {
    json!({
        "name": name,
        "description": format!("{name} tool"),
        "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}
    })
}

/// JSON-RPC success answer echoing the request id
pub fn rpc_result(request: &ProbeRequest, result: Value) -> ProbeResponse {
    let id = request
        .body
        .as_ref()
        .and_then(|b| b.get("id"))
        .cloned()
        .unwrap_or(Value::Null);
    ProbeResponse::json(200, &json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

/// JSON-RPC error answer echoing the request id
pub fn rpc_error(request: &ProbeRequest, code: i64, message: &str) -> ProbeResponse {
    let id = request
        .body
        .as_ref()
        .and_then(|b| b.get("id"))
        .cloned()
        .unwrap_or(Value::Null);
    ProbeResponse::json(
        200,
        &json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}),
    )
}

/// Sampler reporting an idle process
pub struct IdleSampler;

impl UsageSampler for IdleSampler {
    fn sample(&self) -> ResourceUsage {
        ResourceUsage::default()
    }
}
