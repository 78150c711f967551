//! Resource monitor
//!
//! Bounds in-flight probes and refuses new work while the process is over
//! its memory or CPU ceiling.

use crate::config::ResourceConfig;
use crate::error::ProbeError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::warn;

/// Process usage at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

/// Source of process usage samples
pub trait UsageSampler: Send + Sync {
    fn sample(&self) -> ResourceUsage;
}

/// Samples the current process through `sysinfo`
pub struct SysinfoSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageSampler for SysinfoSampler {
    fn sample(&self) -> ResourceUsage {
        let Some(pid) = self.pid else {
            return ResourceUsage::default();
        };
        let mut system = self.system.lock();
        system.refresh_process(pid);
        system
            .process(pid)
            .map(|process| ResourceUsage {
                memory_bytes: process.memory(),
                cpu_percent: process.cpu_usage(),
            })
            .unwrap_or_default()
    }
}

/// Slot for one in-flight probe, released on drop
#[derive(Debug)]
pub struct ProbeSlot {
    _permit: OwnedSemaphorePermit,
}

/// Snapshot for metrics and reports
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceStats {
    pub in_flight: usize,
    pub max_in_flight: usize,
    pub usage: ResourceUsage,
    pub rejected_total: u64,
}

pub struct ResourceMonitor {
    config: ResourceConfig,
    slots: Arc<Semaphore>,
    sampler: Arc<dyn UsageSampler>,
    last_sample: Mutex<Option<(Instant, ResourceUsage)>>,
    rejected: AtomicU64,
}

impl ResourceMonitor {
    pub fn new(config: ResourceConfig, sampler: Arc<dyn UsageSampler>) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.max_in_flight_probes)),
            config,
            sampler,
            last_sample: Mutex::new(None),
            rejected: AtomicU64::new(0),
        }
    }

    /// Current usage, resampled at most once per sample interval
    pub fn usage(&self) -> ResourceUsage {
        let interval = Duration::from_millis(self.config.sample_interval_ms);
        let mut last = self.last_sample.lock();
        if let Some((at, usage)) = *last {
            if at.elapsed() < interval {
                return usage;
            }
        }
        let usage = self.sampler.sample();
        *last = Some((Instant::now(), usage));
        usage
    }

    /// Admit one probe or decline it with a resource limit error
    ///
    /// Queues for at most `queue_timeout_ms` when every slot is taken.
    pub async fn try_schedule(&self) -> Result<ProbeSlot, ProbeError> {
        if let Some(reason) = self.over_ceiling() {
            return Err(self.reject(reason));
        }

        let wait = Duration::from_millis(self.config.queue_timeout_ms);
        match tokio::time::timeout(wait, self.slots.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(ProbeSlot { _permit: permit }),
            _ => Err(self.reject(format!(
                "{} probes in flight, no slot freed within {} ms",
                self.in_flight(),
                wait.as_millis()
            ))),
        }
    }

    fn over_ceiling(&self) -> Option<String> {
        if self.config.max_memory_mb.is_none() && self.config.max_cpu_percent.is_none() {
            return None;
        }
        let usage = self.usage();

        if let Some(max_mb) = self.config.max_memory_mb {
            let used_mb = usage.memory_bytes / (1024 * 1024);
            if used_mb >= max_mb {
                return Some(format!("memory {used_mb} MB at or above ceiling {max_mb} MB"));
            }
        }
        if let Some(max_cpu) = self.config.max_cpu_percent {
            if usage.cpu_percent >= max_cpu {
                return Some(format!(
                    "cpu {:.1}% at or above ceiling {max_cpu:.1}%",
                    usage.cpu_percent
                ));
            }
        }
        None
    }

    fn reject(&self, reason: String) -> ProbeError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(reason = %reason, "Probe declined by resource monitor");
        ProbeError::resource_limit(reason)
    }

    pub fn in_flight(&self) -> usize {
        self.config.max_in_flight_probes - self.slots.available_permits()
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            in_flight: self.in_flight(),
            max_in_flight: self.config.max_in_flight_probes,
            usage: self
                .last_sample
                .lock()
                .map(|(_, usage)| usage)
                .unwrap_or_default(),
            rejected_total: self.rejected.load(Ordering::Relaxed),
        }
    }
}
