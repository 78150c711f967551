//! Connection pools
//!
//! One pool per protocol. The pool caps concurrent connections globally and
//! per host with semaphores; idle keep-alive and reuse are delegated to the
//! pool's own `reqwest::Client`.

use crate::config::PoolConfig;
use crate::error::ProbeError;
use crate::result::ProbePath;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

struct HostSlots {
    semaphore: Arc<Semaphore>,
    last_used: Instant,
}

/// Connection slot held for the duration of one request
///
/// Dropping the lease returns both the host and the global slot.
#[derive(Debug)]
pub struct PoolLease {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub path: ProbePath,
    pub max_connections: usize,
    pub in_use: usize,
    pub hosts: usize,
    pub acquired_total: u64,
    pub rejected_total: u64,
}

pub struct ConnectionPool {
    path: ProbePath,
    config: PoolConfig,
    global: Arc<Semaphore>,
    hosts: Mutex<HashMap<String, HostSlots>>,
    acquired: AtomicU64,
    rejected: AtomicU64,
}

impl ConnectionPool {
    pub fn new(path: ProbePath, config: PoolConfig) -> Self {
        Self {
            path,
            global: Arc::new(Semaphore::new(config.max_connections)),
            config,
            hosts: Mutex::new(HashMap::new()),
            acquired: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> ProbePath {
        self.path
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// HTTP client builder carrying this pool's keep-alive settings
    pub fn client_builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .pool_max_idle_per_host(self.config.max_per_host)
            .pool_idle_timeout(Duration::from_secs(self.config.idle_timeout_secs))
            .connect_timeout(Duration::from_millis(self.config.connect_timeout_ms))
            .tcp_keepalive(Duration::from_secs(self.config.idle_timeout_secs))
    }

    /// Reserve a connection slot for `host`
    ///
    /// Waits at most `acquire_timeout_ms`, then declines with a resource
    /// limit error instead of blocking the probe indefinitely.
    pub async fn acquire(&self, host: &str) -> Result<PoolLease, ProbeError> {
        let host_semaphore = {
            let mut hosts = self.hosts.lock();
            let slots = hosts.entry(host.to_string()).or_insert_with(|| HostSlots {
                semaphore: Arc::new(Semaphore::new(self.config.max_per_host)),
                last_used: Instant::now(),
            });
            slots.last_used = Instant::now();
            slots.semaphore.clone()
        };

        let wait = Duration::from_millis(self.config.acquire_timeout_ms);
        let global = self.global.clone();
        let acquired = tokio::time::timeout(wait, async move {
            let host = host_semaphore.acquire_owned().await.ok()?;
            let global = global.acquire_owned().await.ok()?;
            Some((host, global))
        })
        .await;

        match acquired {
            Ok(Some((host_permit, global_permit))) => {
                self.acquired.fetch_add(1, Ordering::Relaxed);
                Ok(PoolLease {
                    _host: host_permit,
                    _global: global_permit,
                })
            }
            _ => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(ProbeError::resource_limit(format!(
                    "{} connection pool exhausted for {host} after {} ms",
                    self.path,
                    wait.as_millis()
                )))
            }
        }
    }

    /// Drop slot bookkeeping for hosts idle longer than the idle timeout
    pub fn cleanup(&self) -> usize {
        let idle = Duration::from_secs(self.config.idle_timeout_secs);
        let max_per_host = self.config.max_per_host;
        let mut hosts = self.hosts.lock();
        let before = hosts.len();
        hosts.retain(|_, slots| {
            let busy = slots.semaphore.available_permits() < max_per_host;
            busy || slots.last_used.elapsed() < idle
        });
        let removed = before - hosts.len();
        if removed > 0 {
            debug!(path = %self.path, removed, "Pruned idle connection slots");
        }
        removed
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            path: self.path,
            max_connections: self.config.max_connections,
            in_use: self.config.max_connections - self.global.available_permits(),
            hosts: self.hosts.lock().len(),
            acquired_total: self.acquired.load(Ordering::Relaxed),
            rejected_total: self.rejected.load(Ordering::Relaxed),
        }
    }
}
