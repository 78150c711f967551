//! Fleet and monitoring configuration

use crate::error::{MonitorError, Result};
use mcp_health_auth::AuthConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the cycle interval
pub const ENV_INTERVAL_SECS: &str = "MCP_HEALTH_INTERVAL_SECS";
/// Environment variable overriding the concurrency ceiling
pub const ENV_MAX_CONCURRENT: &str = "MCP_HEALTH_MAX_CONCURRENT";
/// Environment variable switching JSON log output
pub const ENV_LOG_JSON: &str = "MCP_HEALTH_LOG_JSON";

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub monitoring: MonitoringConfig,
    pub logging: LoggingConfig,
    pub servers: Vec<ServerConfig>,
}

impl FleetConfig {
    /// Load a TOML or YAML file, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file; the format follows the extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            _ => Self::from_toml_str(&content),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MonitorError::config(format!("Invalid TOML: {e}")))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| MonitorError::config(format!("Invalid YAML: {e}")))
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_INTERVAL_SECS) {
            self.monitoring.interval_secs = parse_env(ENV_INTERVAL_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CONCURRENT) {
            self.monitoring.max_concurrent_servers = parse_env(ENV_MAX_CONCURRENT, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_JSON) {
            self.logging.json = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.monitoring.validate()?;
        validate_servers(&self.servers)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MonitorError::config(format!("{key} has an invalid value: {value}")))
}

/// Validate a server set: unique names and every server valid
pub fn validate_servers(servers: &[ServerConfig]) -> Result<()> {
    let mut names = HashSet::new();
    for server in servers {
        if !names.insert(server.name.as_str()) {
            return Err(MonitorError::config(format!(
                "duplicate server name: {}",
                server.name
            )));
        }
        server.validate()?;
    }
    Ok(())
}

/// Logging options read by the binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info".to_string(),
        }
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Seconds between monitoring cycles
    pub interval_secs: u64,
    /// Servers probed concurrently within one batch
    pub max_concurrent_servers: usize,
    /// Let validation failures count towards circuit breakers
    pub count_validation_failures: bool,
    pub retry: RetryConfig,
    pub aggregation: AggregationConfig,
    pub pools: PoolsConfig,
    pub resources: ResourceConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_concurrent_servers: 16,
            count_validation_failures: false,
            retry: RetryConfig::default(),
            aggregation: AggregationConfig::default(),
            pools: PoolsConfig::default(),
            resources: ResourceConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(MonitorError::config("interval_secs must be at least 1"));
        }
        if self.max_concurrent_servers == 0 {
            return Err(MonitorError::config(
                "max_concurrent_servers must be at least 1",
            ));
        }
        if self.retry.base_delay_ms == 0 || self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(MonitorError::config(
                "retry delays must satisfy 0 < base_delay_ms <= max_delay_ms",
            ));
        }
        self.aggregation.validate()?;
        self.pools.rpc.validate("pools.rpc")?;
        self.pools.rest.validate("pools.rest")?;
        self.resources.validate()?;
        self.cache.validate()?;
        if self.batch.batch_size == 0 {
            return Err(MonitorError::config("batch.batch_size must be at least 1"));
        }
        Ok(())
    }
}

/// Backoff between retry attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Weights and thresholds of the result aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub rpc_weight: f64,
    pub rest_weight: f64,
    /// Probes slower than this are logged as slow
    pub slow_probe_threshold_ms: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            rpc_weight: 0.5,
            rest_weight: 0.5,
            slow_probe_threshold_ms: 2_000,
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<()> {
        let finite = self.rpc_weight.is_finite() && self.rest_weight.is_finite();
        if !finite || self.rpc_weight < 0.0 || self.rest_weight < 0.0 {
            return Err(MonitorError::config(
                "aggregation weights must be finite and non-negative",
            ));
        }
        if self.rpc_weight + self.rest_weight <= 0.0 {
            return Err(MonitorError::config(
                "aggregation weights must have a positive sum",
            ));
        }
        Ok(())
    }
}

/// One connection pool per protocol
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
    pub rpc: PoolConfig,
    pub rest: PoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub max_per_host: usize,
    pub idle_timeout_secs: u64,
    pub connect_timeout_ms: u64,
    /// How long a probe waits for a free connection slot
    pub acquire_timeout_ms: u64,
    pub cleanup_interval_secs: u64,
    /// Response bodies longer than this fail the probe
    pub max_body_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_per_host: 8,
            idle_timeout_secs: 90,
            connect_timeout_ms: 3_000,
            acquire_timeout_ms: 5_000,
            cleanup_interval_secs: 60,
            max_body_bytes: 1024 * 1024,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self, section: &str) -> Result<()> {
        if self.max_connections == 0 || self.max_per_host == 0 {
            return Err(MonitorError::config(format!(
                "{section}: connection limits must be at least 1"
            )));
        }
        if self.max_body_bytes == 0 {
            return Err(MonitorError::config(format!(
                "{section}: max_body_bytes must be at least 1"
            )));
        }
        if self.max_per_host > self.max_connections {
            return Err(MonitorError::config(format!(
                "{section}: max_per_host exceeds max_connections"
            )));
        }
        Ok(())
    }
}

/// Ceilings enforced before a probe is scheduled
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub max_in_flight_probes: usize,
    pub max_memory_mb: Option<u64>,
    pub max_cpu_percent: Option<f32>,
    /// How long a probe may queue for a slot before it is declined
    pub queue_timeout_ms: u64,
    pub sample_interval_ms: u64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_in_flight_probes: 64,
            max_memory_mb: None,
            max_cpu_percent: None,
            queue_timeout_ms: 1_000,
            sample_interval_ms: 1_000,
        }
    }
}

impl ResourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight_probes == 0 {
            return Err(MonitorError::config(
                "resources.max_in_flight_probes must be at least 1",
            ));
        }
        if matches!(self.max_cpu_percent, Some(cpu) if cpu <= 0.0) {
            return Err(MonitorError::config(
                "resources.max_cpu_percent must be positive",
            ));
        }
        Ok(())
    }
}

/// Cache namespaces of the performance optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub configs: CacheNamespaceConfig,
    pub auth: CacheNamespaceConfig,
    pub dns: CacheNamespaceConfig,
    pub results: CacheNamespaceConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            configs: CacheNamespaceConfig::new(1_024, 3_600),
            auth: CacheNamespaceConfig::new(1_024, 3_600),
            dns: CacheNamespaceConfig::new(512, 60),
            results: CacheNamespaceConfig::new(1_024, 3_600),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, ns) in [
            ("configs", &self.configs),
            ("auth", &self.auth),
            ("dns", &self.dns),
            ("results", &self.results),
        ] {
            if ns.max_entries == 0 || ns.ttl_secs == 0 {
                return Err(MonitorError::config(format!(
                    "cache.{name}: max_entries and ttl_secs must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheNamespaceConfig {
    pub max_entries: usize,
    pub ttl_secs: u64,
}

impl CacheNamespaceConfig {
    pub fn new(max_entries: usize, ttl_secs: u64) -> Self {
        Self {
            max_entries,
            ttl_secs,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Wave scheduling of a cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_wait_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_wait_ms: 50,
        }
    }
}

/// One monitored server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique key
    pub name: String,
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub rest_url: String,
    #[serde(default)]
    pub expected_tools: BTreeSet<String>,
    #[serde(default)]
    pub rpc: PathConfig,
    #[serde(default)]
    pub rest: PathConfig,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl ServerConfig {
    /// Server with both paths enabled and default tuning
    pub fn new(name: impl Into<String>, rpc_url: impl Into<String>, rest_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpc_url: rpc_url.into(),
            rest_url: rest_url.into(),
            expected_tools: BTreeSet::new(),
            rpc: PathConfig::default(),
            rest: PathConfig::default(),
            auth: None,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    pub fn with_expected_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(MonitorError::config("server name must not be empty"));
        }
        let ctx = |msg: String| MonitorError::config(format!("server {}: {msg}", self.name));

        if self.rpc.enabled {
            validate_http_url(&self.rpc_url).map_err(|e| ctx(format!("rpc_url {e}")))?;
            self.rpc.validate().map_err(|e| ctx(format!("rpc {e}")))?;
        }
        if self.rest.enabled {
            validate_http_url(&self.rest_url).map_err(|e| ctx(format!("rest_url {e}")))?;
            self.rest.validate().map_err(|e| ctx(format!("rest {e}")))?;
        }
        self.circuit_breaker.validate().map_err(ctx)?;
        if let Some(auth) = &self.auth {
            auth.validate().map_err(|e| ctx(e.to_string()))?;
        }
        Ok(())
    }
}

fn validate_http_url(value: &str) -> std::result::Result<(), String> {
    let parsed = url::Url::parse(value).map_err(|e| format!("is not a valid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("must use http or https, got {other}")),
    }
}

/// Per-path probe settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
    /// Retries after the first attempt
    pub retry_attempts: u32,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 5_000,
            retry_attempts: 2,
        }
    }
}

impl PathConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Breaker thresholds for one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_threshold: 2,
            reset_timeout_ms: 30_000,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.failure_threshold == 0 || self.recovery_threshold == 0 {
            return Err("circuit breaker thresholds must be at least 1".to_string());
        }
        if self.reset_timeout_ms == 0 {
            return Err("circuit breaker reset_timeout_ms must be at least 1".to_string());
        }
        Ok(())
    }
}
