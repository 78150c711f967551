//! Performance optimizer
//!
//! Connection pools per protocol, the resource monitor, the cache namespaces
//! and the batch scheduler, owned together by the health monitor.

pub mod batch;
pub mod cache;
pub mod pool;
pub mod resource;

pub use batch::BatchScheduler;
pub use cache::{CacheManager, CacheManagerStats, CacheStats, TtlLruCache};
pub use pool::{ConnectionPool, PoolLease, PoolStats};
pub use resource::{
    ProbeSlot, ResourceMonitor, ResourceStats, ResourceUsage, SysinfoSampler, UsageSampler,
};

use crate::config::MonitoringConfig;
use crate::result::ProbePath;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Optimizer statistics for reports and metrics
#[derive(Debug, Clone, Serialize)]
pub struct OptimizerStats {
    pub rpc_pool: PoolStats,
    pub rest_pool: PoolStats,
    pub resources: ResourceStats,
    pub cache: CacheManagerStats,
}

pub struct PerformanceOptimizer {
    pub rpc_pool: Arc<ConnectionPool>,
    pub rest_pool: Arc<ConnectionPool>,
    pub resources: ResourceMonitor,
    pub cache: CacheManager,
    pub batcher: BatchScheduler,
}

impl PerformanceOptimizer {
    pub fn new(config: &MonitoringConfig, sampler: Arc<dyn UsageSampler>) -> Self {
        Self {
            rpc_pool: Arc::new(ConnectionPool::new(ProbePath::Rpc, config.pools.rpc.clone())),
            rest_pool: Arc::new(ConnectionPool::new(ProbePath::Rest, config.pools.rest.clone())),
            resources: ResourceMonitor::new(config.resources.clone(), sampler),
            cache: CacheManager::new(&config.cache),
            batcher: BatchScheduler::new(&config.batch),
        }
    }

    pub fn pool(&self, path: ProbePath) -> &Arc<ConnectionPool> {
        match path {
            ProbePath::Rpc => &self.rpc_pool,
            ProbePath::Rest => &self.rest_pool,
        }
    }

    /// Prune idle pool bookkeeping and expired cache entries
    pub fn cleanup(&self) -> usize {
        let pruned = self.rpc_pool.cleanup() + self.rest_pool.cleanup();
        let purged = self.cache.purge_expired();
        debug!(pruned, purged, "Optimizer cleanup");
        pruned + purged
    }

    pub fn stats(&self) -> OptimizerStats {
        OptimizerStats {
            rpc_pool: self.rpc_pool.stats(),
            rest_pool: self.rest_pool.stats(),
            resources: self.resources.stats(),
            cache: self.cache.stats(),
        }
    }
}
