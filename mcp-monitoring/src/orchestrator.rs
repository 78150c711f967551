//! Monitoring orchestrator
//!
//! Drives monitoring cycles. Servers are fed through the batch scheduler in
//! waves; inside a wave at most `max_concurrent_servers` servers are checked
//! at once, and the two paths of each server are probed concurrently. Each
//! path passes its circuit breaker and the resource monitor before a probe
//! goes out.

use crate::aggregator::ResultAggregator;
use crate::circuit_breaker::{CircuitBreakerRegistry, CircuitDecision, CircuitOutcome, CircuitState};
use crate::config::{FleetConfig, MonitoringConfig, ServerConfig, validate_servers};
use crate::error::{MonitorError, ProbeError, Result};
use crate::metrics::MonitorMetrics;
use crate::optimizer::{OptimizerStats, PerformanceOptimizer, SysinfoSampler, UsageSampler};
use crate::probe::{ProbeOptions, RestProbe, RpcProbe};
use crate::result::{
    CombinedHealthRecord, HealthStatus, PathState, ProbePath, RestProbeResult, RpcProbeResult,
};
use crate::transport::{HttpTransport, ProbeTransport};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use mcp_health_auth::{AuthManager, AuthManagerConfig, CredentialStore};
use mcp_health_logging::{StructuredContext, StructuredLogger};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the status transition channel
const TRANSITION_CHANNEL_CAPACITY: usize = 256;

/// Change of a server's combined status between two checks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusTransition {
    pub server: String,
    pub from: HealthStatus,
    pub to: HealthStatus,
    pub at: DateTime<Utc>,
}

/// Per-call timeout overrides for manual checks
#[derive(Debug, Clone, Default)]
pub struct ProbeOverrides {
    pub rpc_timeout: Option<Duration>,
    pub rest_timeout: Option<Duration>,
}

/// Records of one cycle, by server name
pub type CycleResults = HashMap<String, Arc<CombinedHealthRecord>>;

struct ServerSet {
    generation: u64,
    servers: Vec<Arc<ServerConfig>>,
}

impl ServerSet {
    fn get(&self, name: &str) -> Option<Arc<ServerConfig>> {
        self.servers.iter().find(|s| s.name == name).cloned()
    }
}

/// Builder for [`HealthMonitor`]
///
/// The transport and usage sampler can be replaced, which is how tests run
/// the full pipeline without a network.
pub struct HealthMonitorBuilder {
    config: MonitoringConfig,
    servers: Vec<ServerConfig>,
    transport: Option<Arc<dyn ProbeTransport>>,
    sampler: Option<Arc<dyn UsageSampler>>,
    auth_config: AuthManagerConfig,
}

impl HealthMonitorBuilder {
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            config,
            servers: Vec::new(),
            transport: None,
            sampler: None,
            auth_config: AuthManagerConfig::default(),
        }
    }

    pub fn servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.servers = servers;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn ProbeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn sampler(mut self, sampler: Arc<dyn UsageSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn auth_config(mut self, config: AuthManagerConfig) -> Self {
        self.auth_config = config;
        self
    }

    pub fn build(self) -> Result<HealthMonitor> {
        self.config.validate()?;
        validate_servers(&self.servers)?;

        let sampler = self
            .sampler
            .unwrap_or_else(|| Arc::new(SysinfoSampler::new()));
        let optimizer = PerformanceOptimizer::new(&self.config, sampler);

        let store: Arc<dyn CredentialStore> = optimizer.cache.auth.clone();
        let auth = Arc::new(AuthManager::new(self.auth_config, store)?);

        let transport: Arc<dyn ProbeTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpTransport::new(
                    optimizer.rpc_pool.clone(),
                    optimizer.rest_pool.clone(),
                    optimizer.cache.dns.clone(),
                )
                .map_err(|e| MonitorError::Http(e.to_string()))?,
            ),
        };

        let servers: Vec<Arc<ServerConfig>> = self.servers.into_iter().map(Arc::new).collect();
        for server in &servers {
            optimizer.cache.configs.insert(server.name.clone(), server.clone());
        }

        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);

        Ok(HealthMonitor {
            rpc_probe: RpcProbe::new(transport.clone(), auth.clone(), self.config.retry.clone()),
            rest_probe: RestProbe::new(transport, auth.clone(), self.config.retry.clone()),
            aggregator: ResultAggregator::new(self.config.aggregation.clone()),
            metrics: MonitorMetrics::new()?,
            servers: RwLock::new(Arc::new(ServerSet {
                generation: 0,
                servers,
            })),
            removed: RwLock::new(HashMap::new()),
            last_status: Mutex::new(HashMap::new()),
            breakers: CircuitBreakerRegistry::new(),
            config: self.config,
            auth,
            optimizer,
            transitions,
        })
    }
}

/// Dual-protocol health monitor for a fleet of servers
pub struct HealthMonitor {
    config: MonitoringConfig,
    servers: RwLock<Arc<ServerSet>>,
    /// Generation at which a server left the configuration
    ///
    /// Per-server state of a cycle is only written under the read lock, and
    /// only for servers still live at the cycle's generation.
    removed: RwLock<HashMap<String, u64>>,
    last_status: Mutex<HashMap<String, HealthStatus>>,
    rpc_probe: RpcProbe,
    rest_probe: RestProbe,
    auth: Arc<AuthManager>,
    breakers: CircuitBreakerRegistry,
    aggregator: ResultAggregator,
    optimizer: PerformanceOptimizer,
    metrics: MonitorMetrics,
    transitions: broadcast::Sender<StatusTransition>,
}

impl HealthMonitor {
    pub fn builder(config: MonitoringConfig) -> HealthMonitorBuilder {
        HealthMonitorBuilder::new(config)
    }

    /// Monitor over HTTP for the given servers
    pub fn new(config: MonitoringConfig, servers: Vec<ServerConfig>) -> Result<Self> {
        Self::builder(config).servers(servers).build()
    }

    pub fn from_fleet(fleet: &FleetConfig) -> Result<Self> {
        Self::new(fleet.monitoring.clone(), fleet.servers.clone())
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Servers of the current configuration
    pub fn servers(&self) -> Vec<Arc<ServerConfig>> {
        self.snapshot().servers.clone()
    }

    fn snapshot(&self) -> Arc<ServerSet> {
        self.servers.read().clone()
    }

    pub fn metrics(&self) -> &MonitorMetrics {
        &self.metrics
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn optimizer_stats(&self) -> OptimizerStats {
        self.optimizer.stats()
    }

    /// Receive status transitions as they are observed
    pub fn subscribe(&self) -> broadcast::Receiver<StatusTransition> {
        self.transitions.subscribe()
    }

    /// Run one full pass over `servers`
    pub async fn run_cycle(&self, servers: &[ServerConfig]) -> CycleResults {
        let generation = self.servers.read().generation;
        let servers = servers.iter().cloned().map(Arc::new).collect();
        self.execute(
            servers,
            generation,
            &ProbeOverrides::default(),
            &CancellationToken::new(),
        )
        .await
    }

    /// Run one full pass over the configured servers
    pub async fn run_configured_cycle(&self) -> CycleResults {
        let set = self.snapshot();
        self.execute(
            set.servers.clone(),
            set.generation,
            &ProbeOverrides::default(),
            &CancellationToken::new(),
        )
        .await
    }

    /// Latest record of a server, without network I/O
    pub fn get_last_result(&self, server: &str) -> Result<Arc<CombinedHealthRecord>> {
        if let Some(record) = self.optimizer.cache.results.get(&server.to_string()) {
            return Ok(record);
        }
        if self.servers.read().get(server).is_some() {
            Err(MonitorError::NoResult(server.to_string()))
        } else {
            Err(MonitorError::ServerNotFound(server.to_string()))
        }
    }

    /// Probe a subset of the configured servers now
    ///
    /// Fails without probing anything if a name is unknown.
    pub async fn trigger_manual_check<S: AsRef<str>>(
        &self,
        servers: &[S],
        overrides: Option<ProbeOverrides>,
    ) -> Result<CycleResults> {
        let set = self.snapshot();
        let selected = servers
            .iter()
            .map(|name| self.resolve(&set, name.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        info!(servers = selected.len(), "Manual check triggered");

        Ok(self
            .execute(
                selected,
                set.generation,
                &overrides.unwrap_or_default(),
                &CancellationToken::new(),
            )
            .await)
    }

    fn resolve(&self, set: &ServerSet, name: &str) -> Result<Arc<ServerConfig>> {
        let server = set
            .get(name)
            .ok_or_else(|| MonitorError::ServerNotFound(name.to_string()))?;
        if let Some(cached) = self.optimizer.cache.configs.get(&name.to_string()) {
            return Ok(cached);
        }
        self.optimizer
            .cache
            .configs
            .insert(name.to_string(), server.clone());
        Ok(server)
    }

    /// Replace the server set atomically
    ///
    /// Probes already running against the old set finish and are reported
    /// to their caller; removed servers drop out of every later cycle along
    /// with their breakers, cached results and credentials.
    pub async fn reload_config(&self, servers: Vec<ServerConfig>) -> Result<()> {
        validate_servers(&servers)?;
        let servers: Vec<Arc<ServerConfig>> = servers.into_iter().map(Arc::new).collect();
        let new_names: HashSet<&str> = servers.iter().map(|s| s.name.as_str()).collect();

        let (generation, removed, changed) = {
            let mut current = self.servers.write();
            let generation = current.generation + 1;
            let removed: Vec<String> = current
                .servers
                .iter()
                .filter(|s| !new_names.contains(s.name.as_str()))
                .map(|s| s.name.clone())
                .collect();
            let changed: Vec<String> = servers
                .iter()
                .filter(|s| current.get(&s.name).is_some_and(|old| old.auth != s.auth))
                .map(|s| s.name.clone())
                .collect();
            *current = Arc::new(ServerSet {
                generation,
                servers: servers.clone(),
            });
            (generation, removed, changed)
        };

        {
            let mut tombstones = self.removed.write();
            for name in &removed {
                tombstones.insert(name.clone(), generation);
            }
            for name in &new_names {
                tombstones.remove(*name);
            }
            for name in &removed {
                self.breakers.remove_server(name);
                self.optimizer.cache.remove_server(name);
                self.metrics.remove_server(name);
                self.last_status.lock().remove(name);
            }
        }

        for name in &removed {
            self.auth.forget_server(name).await;
        }
        for name in &changed {
            self.auth.forget_server(name).await;
        }
        for server in &servers {
            self.optimizer
                .cache
                .configs
                .insert(server.name.clone(), server.clone());
        }

        info!(
            generation,
            servers = servers.len(),
            removed = removed.len(),
            auth_changed = changed.len(),
            "Configuration reloaded"
        );
        Ok(())
    }

    /// Breaker state of one path; CLOSED for a path not probed yet
    pub fn get_circuit_state(&self, server: &str, path: ProbePath) -> Result<CircuitState> {
        if let Some(state) = self.breakers.state(server, path) {
            return Ok(state);
        }
        if self.servers.read().get(server).is_some() {
            Ok(CircuitState::closed())
        } else {
            Err(MonitorError::ServerNotFound(server.to_string()))
        }
    }

    /// Run cycles on the configured interval until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut cycles = tokio::time::interval(self.config.interval());
        cycles.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let cleanup_secs = self
            .config
            .pools
            .rpc
            .cleanup_interval_secs
            .min(self.config.pools.rest.cleanup_interval_secs)
            .max(1);
        let mut cleanup = tokio::time::interval(Duration::from_secs(cleanup_secs));
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.interval_secs,
            servers = self.servers.read().servers.len(),
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = cycles.tick() => {
                    let cancel = shutdown.child_token();
                    let set = self.snapshot();
                    self.execute(
                        set.servers.clone(),
                        set.generation,
                        &ProbeOverrides::default(),
                        &cancel,
                    )
                    .await;
                }
                _ = cleanup.tick() => {
                    self.optimizer.cleanup();
                }
            }
        }

        info!("Health monitor stopped");
    }

    async fn execute(
        &self,
        servers: Vec<Arc<ServerConfig>>,
        generation: u64,
        overrides: &ProbeOverrides,
        cancel: &CancellationToken,
    ) -> CycleResults {
        let cycle_id = uuid::Uuid::new_v4().simple().to_string();
        let started = Instant::now();
        let total = servers.len();

        let (tx, mut rx) = mpsc::channel(total.max(1));
        for server in servers {
            if tx.try_send(server).is_err() {
                warn!(cycle_id = %cycle_id, "Cycle queue full, server dropped");
            }
        }
        drop(tx);

        let mut results = CycleResults::with_capacity(total);
        let concurrency = self.config.max_concurrent_servers.max(1);
        while let Some(batch) = self.optimizer.batcher.next_batch(&mut rx).await {
            debug!(cycle_id = %cycle_id, batch = batch.len(), "Probing batch");
            let records: Vec<Arc<CombinedHealthRecord>> = stream::iter(batch)
                .map(|server| self.check_server(server, overrides, cancel, generation))
                .buffer_unordered(concurrency)
                .collect()
                .await;
            for record in records {
                results.insert(record.server.clone(), record);
            }
        }

        let count = |status: HealthStatus| results.values().filter(|r| r.status == status).count();
        StructuredLogger::log_cycle_summary(
            &cycle_id,
            results.len(),
            count(HealthStatus::Healthy),
            count(HealthStatus::Degraded),
            count(HealthStatus::Unhealthy),
            started.elapsed(),
        );
        self.metrics.record_cycle(started.elapsed());
        self.metrics.record_resources(&self.optimizer.stats());
        results
    }

    async fn check_server(
        &self,
        server: Arc<ServerConfig>,
        overrides: &ProbeOverrides,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Arc<CombinedHealthRecord> {
        let (rpc, rest) = tokio::join!(
            self.run_rpc(&server, overrides, cancel, generation),
            self.run_rest(&server, overrides, cancel, generation),
        );

        let mut record = self.aggregator.combine(&server, rpc, rest);
        if server.rpc.enabled {
            record.metrics.rpc_success_rate = self.metrics.success_rate(&server.name, ProbePath::Rpc);
        }
        if server.rest.enabled {
            record.metrics.rest_success_rate =
                self.metrics.success_rate(&server.name, ProbePath::Rest);
        }
        let record = Arc::new(record);

        let stored = self.while_live(&server.name, generation, || {
            self.metrics.record_health(&record);
            self.publish_transition(&record);
            self.optimizer
                .cache
                .results
                .insert(server.name.clone(), record.clone());
        });
        if stored.is_none() {
            debug!(server = %server.name, "Server removed during cycle, result not kept");
        }
        record
    }

    async fn run_rpc(
        &self,
        server: &ServerConfig,
        overrides: &ProbeOverrides,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Option<RpcProbeResult> {
        if !server.rpc.enabled {
            return None;
        }
        let ctx = StructuredContext::new(&server.name, ProbePath::Rpc.as_str());
        let decision = self
            .while_live(&server.name, generation, || {
                self.breakers
                    .check(&server.name, ProbePath::Rpc, &server.circuit_breaker)
            })
            .unwrap_or(CircuitDecision::Allow);
        if let CircuitDecision::Reject { retry_after } = decision {
            let state = PathState::Skipped {
                retry_after_ms: retry_after.as_millis() as u64,
            };
            self.while_live(&server.name, generation, || {
                self.metrics.record_probe(&server.name, ProbePath::Rpc, state, 0)
            });
            return Some(RpcProbeResult::skipped(retry_after));
        }
        let _slot = match self.optimizer.resources.try_schedule().await {
            Ok(slot) => slot,
            Err(e) => {
                self.while_live(&server.name, generation, || {
                    self.metrics
                        .record_probe(&server.name, ProbePath::Rpc, PathState::Deferred, 0)
                });
                return Some(RpcProbeResult::failed(e, 0, Duration::ZERO));
            }
        };

        let mut options = ProbeOptions::for_path(&server.rpc, cancel.child_token());
        if let Some(timeout) = overrides.rpc_timeout {
            options = options.with_timeout(timeout);
        }
        let result = self.rpc_probe.probe(server, &options).await;
        self.while_live(&server.name, generation, || {
            self.finish_path(
                server,
                ProbePath::Rpc,
                result.success,
                result.error.as_ref(),
                result.latency_ms,
                &ctx,
            )
        });
        Some(result)
    }

    async fn run_rest(
        &self,
        server: &ServerConfig,
        overrides: &ProbeOverrides,
        cancel: &CancellationToken,
        generation: u64,
    ) -> Option<RestProbeResult> {
        if !server.rest.enabled {
            return None;
        }
        let ctx = StructuredContext::new(&server.name, ProbePath::Rest.as_str());
        let decision = self
            .while_live(&server.name, generation, || {
                self.breakers
                    .check(&server.name, ProbePath::Rest, &server.circuit_breaker)
            })
            .unwrap_or(CircuitDecision::Allow);
        if let CircuitDecision::Reject { retry_after } = decision {
            let state = PathState::Skipped {
                retry_after_ms: retry_after.as_millis() as u64,
            };
            self.while_live(&server.name, generation, || {
                self.metrics.record_probe(&server.name, ProbePath::Rest, state, 0)
            });
            return Some(RestProbeResult::skipped(retry_after));
        }
        let _slot = match self.optimizer.resources.try_schedule().await {
            Ok(slot) => slot,
            Err(e) => {
                self.while_live(&server.name, generation, || {
                    self.metrics
                        .record_probe(&server.name, ProbePath::Rest, PathState::Deferred, 0)
                });
                return Some(RestProbeResult::failed(e, None, 0, Duration::ZERO));
            }
        };

        let mut options = ProbeOptions::for_path(&server.rest, cancel.child_token());
        if let Some(timeout) = overrides.rest_timeout {
            options = options.with_timeout(timeout);
        }
        let result = self.rest_probe.probe(server, &options).await;
        self.while_live(&server.name, generation, || {
            self.finish_path(
                server,
                ProbePath::Rest,
                result.success,
                result.error.as_ref(),
                result.latency_ms,
                &ctx,
            )
        });
        Some(result)
    }

    /// Feed a finished probe to its breaker and the metrics
    fn finish_path(
        &self,
        server: &ServerConfig,
        path: ProbePath,
        success: bool,
        error: Option<&ProbeError>,
        latency_ms: u64,
        ctx: &StructuredContext,
    ) {
        let outcome = match error {
            _ if success => CircuitOutcome::Success,
            Some(e) if e.counts_as_failure(self.config.count_validation_failures) => {
                CircuitOutcome::Failure
            }
            _ => CircuitOutcome::Neutral,
        };
        self.breakers
            .record(&server.name, path, &server.circuit_breaker, outcome);
        self.metrics.record_probe(
            &server.name,
            path,
            PathState::from_outcome(success, error),
            latency_ms,
        );
        StructuredLogger::log_slow_probe(ctx, self.config.aggregation.slow_probe_threshold_ms);
    }

    /// Run `f` unless `server` left the configuration after `generation`
    fn while_live<T>(&self, server: &str, generation: u64, f: impl FnOnce() -> T) -> Option<T> {
        let removed = self.removed.read();
        if removed
            .get(server)
            .is_some_and(|removed_at| *removed_at > generation)
        {
            return None;
        }
        Some(f())
    }

    fn publish_transition(&self, record: &CombinedHealthRecord) {
        let previous = self
            .last_status
            .lock()
            .insert(record.server.clone(), record.status);
        let Some(from) = previous.filter(|from| *from != record.status) else {
            return;
        };
        info!(
            server = %record.server,
            from = %from,
            to = %record.status,
            "Server status changed"
        );
        // no subscribers is not an error
        let _ = self.transitions.send(StatusTransition {
            server: record.server.clone(),
            from,
            to: record.status,
            at: record.checked_at,
        });
    }
}
