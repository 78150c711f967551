//! Integration tests for the MCP health monitor
//!
//! These tests drive the monitor end to end, either through a scripted
//! transport or against real HTTP servers started with `mockito`.

#![allow(unused_imports)] // Allow unused imports in integration tests
#![allow(clippy::uninlined_format_args)] // Allow traditional format strings in tests

pub mod auth_integration;
pub mod end_to_end_scenarios;
pub mod monitoring_integration;

/// Common test utilities for integration tests
pub mod test_utils {
    use async_trait::async_trait;
    use mcp_health_monitor::{
        HealthMonitor, MonitoringConfig, ProbeError, ProbeRequest, ProbeResponse,
        ProbeTransport, ResourceUsage, ServerConfig, TransportErrorKind, UsageSampler,
    };
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Behaviour of one scripted endpoint for one request
    pub enum Scripted {
        Reply(ProbeResponse),
        Error(ProbeError),
        After(Duration, ProbeResponse),
        Hang,
    }

    type Endpoint = Arc<dyn Fn(&ProbeRequest, usize) -> Scripted + Send + Sync>;

    /// In-process fleet: every URL is answered by a closure
    #[derive(Default)]
    pub struct ScriptedFleet {
        endpoints: Mutex<HashMap<String, Endpoint>>,
        log: Mutex<Vec<ProbeRequest>>,
    }

    impl ScriptedFleet {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn on<F>(&self, url: &str, endpoint: F)
        where
            F: Fn(&ProbeRequest, usize) -> Scripted + Send + Sync + 'static,
        {
            self.endpoints
                .lock()
                .insert(url.to_string(), Arc::new(endpoint));
        }

        /// Serve a `tools/list` answer with the given tool names
        pub fn serve_tools(&self, url: &str, names: &[&str]) {
            let tools: Vec<Value> = names.iter().map(|n| tool(n)).collect();
            self.on(url, move |request, _| {
                Scripted::Reply(rpc_reply(request, json!({ "tools": tools })))
            });
        }

        pub fn serve_health(&self, url: &str, status: u16, body: Value) {
            self.on(url, move |_, _| {
                Scripted::Reply(ProbeResponse::json(status, &body))
            });
        }

        pub fn hits(&self, url: &str) -> usize {
            self.log.lock().iter().filter(|r| r.url == url).count()
        }
    }

    #[async_trait]
    impl ProbeTransport for ScriptedFleet {
        async fn send(&self, request: ProbeRequest) -> Result<ProbeResponse, ProbeError> {
            let (endpoint, index) = {
                let mut log = self.log.lock();
                let index = log.iter().filter(|r| r.url == request.url).count();
                log.push(request.clone());
                (self.endpoints.lock().get(&request.url).cloned(), index)
            };
            let Some(endpoint) = endpoint else {
                return Err(ProbeError::transport(
                    TransportErrorKind::ConnectionRefused,
                    format!("nothing listening at {}", request.url),
                ));
            };
            match endpoint(&request, index) {
                Scripted::Reply(response) => Ok(response),
                Scripted::Error(error) => Err(error),
                Scripted::After(delay, response) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Scripted::Hang => std::future::pending().await,
            }
        }
    }

    /// Sampler for a process that is never under pressure
    pub struct QuietSampler;

    impl UsageSampler for QuietSampler {
        fn sample(&self) -> ResourceUsage {
            ResourceUsage::default()
        }
    }

    pub fn rpc_url(name: &str) -> String {
        format!("http://{name}.fleet.test/mcp")
    }

    pub fn rest_url(name: &str) -> String {
        format!("http://{name}.fleet.test/health")
    }

    /// Server with both paths on the scripted fleet
    pub fn fleet_server(name: &str, expected_tools: &[&str]) -> ServerConfig {
        ServerConfig::new(name, rpc_url(name), rest_url(name))
            .with_expected_tools(expected_tools.iter().copied())
    }

    /// Monitoring config with short backoff for tests
    pub fn test_monitoring_config() -> MonitoringConfig {
        let mut config = MonitoringConfig::default();
        config.interval_secs = 1;
        config.retry.base_delay_ms = 10;
        config.retry.max_delay_ms = 100;
        config
    }

    pub fn scripted_monitor(
        fleet: &Arc<ScriptedFleet>,
        servers: Vec<ServerConfig>,
    ) -> HealthMonitor {
        HealthMonitor::builder(test_monitoring_config())
            .servers(servers)
            .transport(fleet.clone())
            .sampler(Arc::new(QuietSampler))
            .build()
            .expect("valid test monitor")
    }

    pub fn tool(name: &str) -> Value {
        json!({
            "name": name,
            "description": format!("The {name} tool"),
            "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}
        })
    }

    /// JSON-RPC result answering `request`
    pub fn rpc_reply(request: &ProbeRequest, result: Value) -> ProbeResponse {
        let id = request
            .body
            .as_ref()
            .and_then(|body| body.get("id"))
            .cloned()
            .unwrap_or(Value::Null);
        ProbeResponse::json(200, &json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    /// `tools/list` mock on `path` that echoes each request's id
    ///
    /// Returned uncreated so callers can add matchers and expectations.
    pub fn mock_tools(
        server: &mut mockito::ServerGuard,
        path: &str,
        names: &[&str],
    ) -> mockito::Mock {
        let tools: Vec<Value> = names.iter().map(|n| tool(n)).collect();
        server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |request| {
                let id = request
                    .body()
                    .ok()
                    .and_then(|body| serde_json::from_slice::<Value>(body).ok())
                    .and_then(|body| body.get("id").cloned())
                    .unwrap_or(Value::Null);
                json!({"jsonrpc": "2.0", "id": id, "result": {"tools": tools}})
                    .to_string()
                    .into_bytes()
            })
    }

    /// Server pointing both paths at a mockito instance
    pub fn http_server(name: &str, base_url: &str, expected_tools: &[&str]) -> ServerConfig {
        ServerConfig::new(name, format!("{base_url}/mcp"), format!("{base_url}/health"))
            .with_expected_tools(expected_tools.iter().copied())
    }

    /// Monitor using the real HTTP transport
    pub fn http_monitor(servers: Vec<ServerConfig>) -> HealthMonitor {
        HealthMonitor::builder(test_monitoring_config())
            .servers(servers)
            .sampler(Arc::new(QuietSampler))
            .build()
            .expect("valid test monitor")
    }

    /// Wait for a condition with timeout
    pub async fn wait_for_condition<F, Fut>(
        mut condition: F,
        timeout_duration: Duration,
        check_interval: Duration,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = tokio::time::Instant::now();
        while start.elapsed() < timeout_duration {
            if condition().await {
                return Ok(());
            }
            tokio::time::sleep(check_interval).await;
        }
        Err("Condition timeout".into())
    }
}
