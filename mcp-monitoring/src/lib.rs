//! Dual-protocol health monitoring for MCP server fleets
//!
//! Each monitored server is checked over two independent paths:
//! - **RPC**: a JSON-RPC `tools/list` call whose answer is validated
//!   against the tools the server is expected to expose
//! - **REST**: an HTTP health endpoint whose status code and body are
//!   interpreted as healthy, degraded or unhealthy
//!
//! The two views are fused into one [`CombinedHealthRecord`] per server and
//! cycle. Every (server, path) pair has its own circuit breaker, probes run
//! through per-protocol connection pools and a resource monitor, and all
//! outcomes land in a Prometheus registry owned by the monitor.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mcp_health_monitor::{HealthMonitor, MonitoringConfig, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = ServerConfig::new(
//!         "search",
//!         "https://search.example.com/mcp",
//!         "https://search.example.com/health",
//!     )
//!     .with_expected_tools(["search", "recommend"]);
//!
//!     let monitor = HealthMonitor::new(MonitoringConfig::default(), vec![server])?;
//!     let results = monitor.run_configured_cycle().await;
//!
//!     for (name, record) in &results {
//!         println!("{name}: {} (score {:.2})", record.status, record.score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod orchestrator;
pub mod probe;
pub mod result;
pub mod transport;

pub use aggregator::ResultAggregator;
pub use circuit_breaker::{BreakerState, CircuitBreakerRegistry, CircuitState};
pub use config::{
    AggregationConfig, CircuitBreakerConfig, FleetConfig, LoggingConfig, MonitoringConfig,
    PathConfig, ServerConfig,
};
pub use error::{MonitorError, ProbeError, Result, TransportErrorKind};
pub use metrics::{MetricsSnapshot, MonitorMetrics, PathMetrics};
pub use optimizer::{OptimizerStats, ResourceUsage, UsageSampler};
pub use orchestrator::{
    CycleResults, HealthMonitor, HealthMonitorBuilder, ProbeOverrides, StatusTransition,
};
pub use result::{
    AggregatedMetrics, CombinedHealthRecord, HealthStatus, PathState, ProbePath,
    RestProbeResult, RpcProbeResult,
};
pub use transport::{HttpTransport, ProbeRequest, ProbeResponse, ProbeTransport};

/// Default engine configuration
pub fn default_config() -> MonitoringConfig {
    MonitoringConfig::default()
}

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod aggregator_tests;
#[cfg(test)]
mod orchestrator_tests;
