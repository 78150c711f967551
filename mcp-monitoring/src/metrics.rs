//! Probe and cycle metrics
//!
//! Every monitor owns its own Prometheus registry, so several monitors can
//! live in one process. Success rates and latency percentiles are computed
//! over a rolling window of recent probes per (server, path).

use crate::error::Result;
use crate::optimizer::OptimizerStats;
use crate::result::{CombinedHealthRecord, PathState, ProbePath};
use parking_lot::Mutex;
use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Probes kept per (server, path) for rates and percentiles
pub const WINDOW_SIZE: usize = 100;

const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const OUTCOMES: [&str; 4] = ["succeeded", "failed", "skipped", "deferred"];

#[derive(Debug, Default)]
struct PathStats {
    probes: u64,
    successes: u64,
    failures: u64,
    skipped: u64,
    deferred: u64,
    /// Recent authoritative outcomes, newest last
    outcomes: VecDeque<bool>,
    /// Recent latencies in ms, newest last
    latencies: VecDeque<u64>,
}

impl PathStats {
    fn push(&mut self, success: bool, latency_ms: u64) {
        if self.outcomes.len() == WINDOW_SIZE {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(success);
        if self.latencies.len() == WINDOW_SIZE {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency_ms);
    }

    fn success_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        let ok = self.outcomes.iter().filter(|s| **s).count();
        Some(ok as f64 / self.outcomes.len() as f64)
    }

    fn average_latency(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            return None;
        }
        Some(self.latencies.iter().sum::<u64>() as f64 / self.latencies.len() as f64)
    }

    fn p95_latency(&self) -> Option<u64> {
        if self.latencies.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = self.latencies.iter().copied().collect();
        sorted.sort_unstable();
        let rank = ((sorted.len() as f64) * 0.95).ceil() as usize;
        sorted.get(rank.saturating_sub(1)).copied()
    }
}

/// Figures for one (server, path)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathMetrics {
    pub server: String,
    pub path: ProbePath,
    pub probes: u64,
    pub successes: u64,
    pub failures: u64,
    pub skipped: u64,
    pub deferred: u64,
    pub success_rate: Option<f64>,
    pub average_latency_ms: Option<f64>,
    pub p95_latency_ms: Option<u64>,
}

/// Serializable view of every metric the monitor keeps
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub paths: Vec<PathMetrics>,
}

impl MetricsSnapshot {
    pub fn path(&self, server: &str, path: ProbePath) -> Option<&PathMetrics> {
        self.paths.iter().find(|p| p.server == server && p.path == path)
    }
}

pub struct MonitorMetrics {
    registry: Registry,
    probes_total: IntCounterVec,
    probe_latency: HistogramVec,
    health_score: GaugeVec,
    health_status: IntGaugeVec,
    cycles_total: IntCounter,
    cycle_duration: Histogram,
    in_flight_probes: IntGauge,
    process_memory: IntGauge,
    stats: Mutex<HashMap<(String, ProbePath), PathStats>>,
}

impl MonitorMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("mcp_health".to_string()), None)?;

        let probes_total = IntCounterVec::new(
            Opts::new("probes_total", "Probes by server, path and outcome"),
            &["server", "path", "outcome"],
        )?;
        let probe_latency = HistogramVec::new(
            HistogramOpts::new("probe_latency_seconds", "Latency of the last probe attempt")
                .buckets(LATENCY_BUCKETS.to_vec()),
            &["server", "path"],
        )?;
        let health_score = GaugeVec::new(
            Opts::new("health_score", "Combined health score in [0, 1]"),
            &["server"],
        )?;
        let health_status = IntGaugeVec::new(
            Opts::new(
                "health_status",
                "Combined status: 2 healthy, 1 degraded, 0 unhealthy, -1 unknown",
            ),
            &["server"],
        )?;
        let cycles_total = IntCounter::new("cycles_total", "Completed monitoring cycles")?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new("cycle_duration_seconds", "Duration of monitoring cycles")
                .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        let in_flight_probes = IntGauge::new("in_flight_probes", "Probes currently in flight")?;
        let process_memory =
            IntGauge::new("process_memory_bytes", "Resident memory of the monitor process")?;

        registry.register(Box::new(probes_total.clone()))?;
        registry.register(Box::new(probe_latency.clone()))?;
        registry.register(Box::new(health_score.clone()))?;
        registry.register(Box::new(health_status.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(in_flight_probes.clone()))?;
        registry.register(Box::new(process_memory.clone()))?;

        Ok(Self {
            registry,
            probes_total,
            probe_latency,
            health_score,
            health_status,
            cycles_total,
            cycle_duration,
            in_flight_probes,
            process_memory,
            stats: Mutex::new(HashMap::new()),
        })
    }

    /// Record the final outcome of one path probe
    pub fn record_probe(&self, server: &str, path: ProbePath, state: PathState, latency_ms: u64) {
        let outcome = match state {
            PathState::Disabled => return,
            PathState::Succeeded => OUTCOMES[0],
            PathState::Failed => OUTCOMES[1],
            PathState::Skipped { .. } => OUTCOMES[2],
            PathState::Deferred => OUTCOMES[3],
        };
        self.probes_total
            .with_label_values(&[server, path.as_str(), outcome])
            .inc();

        let mut stats = self.stats.lock();
        let entry = stats.entry((server.to_string(), path)).or_default();
        entry.probes += 1;
        match state {
            PathState::Succeeded | PathState::Failed => {
                let success = state == PathState::Succeeded;
                if success {
                    entry.successes += 1;
                } else {
                    entry.failures += 1;
                }
                entry.push(success, latency_ms);
                self.probe_latency
                    .with_label_values(&[server, path.as_str()])
                    .observe(latency_ms as f64 / 1000.0);
            }
            PathState::Skipped { .. } => entry.skipped += 1,
            PathState::Deferred => entry.deferred += 1,
            PathState::Disabled => {}
        }
    }

    /// Publish the verdict gauges of a record
    pub fn record_health(&self, record: &CombinedHealthRecord) {
        self.health_score
            .with_label_values(&[record.server.as_str()])
            .set(record.score);
        self.health_status
            .with_label_values(&[record.server.as_str()])
            .set(record.status.as_gauge());
    }

    pub fn record_cycle(&self, duration: Duration) {
        self.cycles_total.inc();
        self.cycle_duration.observe(duration.as_secs_f64());
    }

    pub fn record_resources(&self, stats: &OptimizerStats) {
        self.in_flight_probes.set(stats.resources.in_flight as i64);
        self.process_memory
            .set(stats.resources.usage.memory_bytes.min(i64::MAX as u64) as i64);
    }

    /// Success rate over the rolling window, `None` before any probe
    pub fn success_rate(&self, server: &str, path: ProbePath) -> Option<f64> {
        self.stats
            .lock()
            .get(&(server.to_string(), path))
            .and_then(PathStats::success_rate)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let stats = self.stats.lock();
        let mut paths: Vec<PathMetrics> = stats
            .iter()
            .map(|((server, path), s)| PathMetrics {
                server: server.clone(),
                path: *path,
                probes: s.probes,
                successes: s.successes,
                failures: s.failures,
                skipped: s.skipped,
                deferred: s.deferred,
                success_rate: s.success_rate(),
                average_latency_ms: s.average_latency(),
                p95_latency_ms: s.p95_latency(),
            })
            .collect();
        paths.sort_by(|a, b| (&a.server, a.path).cmp(&(&b.server, b.path)));

        MetricsSnapshot {
            cycles: self.cycles_total.get(),
            paths,
        }
    }

    /// Prometheus text exposition of the registry
    pub fn render_prometheus(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::MonitorError::Metrics(e.to_string()))
    }

    /// Forget every series of a removed server
    pub fn remove_server(&self, server: &str) {
        self.stats.lock().retain(|(name, _), _| name != server);
        for path in [ProbePath::Rpc, ProbePath::Rest] {
            for outcome in OUTCOMES {
                let _ = self
                    .probes_total
                    .remove_label_values(&[server, path.as_str(), outcome]);
            }
            let _ = self.probe_latency.remove_label_values(&[server, path.as_str()]);
        }
        let _ = self.health_score.remove_label_values(&[server]);
        let _ = self.health_status.remove_label_values(&[server]);
    }
}
