//! Performance Monitor
//!
//! Counts logical connections, messages, errors and latency samples reported
//! by transport code, and derives a [`PerformanceMetrics`] snapshot on two
//! cadences:
//!
//! - every `monitoring_interval`: message rate, error rate, mean latency over
//!   the latency window, CPU heuristic; the snapshot is published
//! - every `memory_sample_interval`: process memory only
//!
//! Connections live in an id-keyed map with no expiry. A caller that never
//! calls `untrack_connection` leaves a phantom connection behind.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, trace};

use crate::config::PerformanceMonitorConfig;
use crate::listeners::{Listener, Listeners, Subscription};

/// Base load assumed by the CPU heuristic
const CPU_BASE_PERCENT: f64 = 5.0;
const CPU_PER_CONNECTION: f64 = 2.0;
const CPU_PER_MESSAGE_RATE: f64 = 0.5;

/// Derived application performance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub active_connections: u64,
    /// Messages per second since start or last reset
    pub message_rate: f64,
    pub memory_usage_mb: f64,
    /// Mean over the most recent latency window
    pub average_latency_ms: f64,
    /// errors / (messages + errors) * 100
    pub error_rate: f64,
    /// Heuristic estimate, not a measurement
    pub cpu_usage: f64,
    pub timestamp: DateTime<Utc>,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            active_connections: 0,
            message_rate: 0.0,
            memory_usage_mb: 0.0,
            average_latency_ms: 0.0,
            error_rate: 0.0,
            cpu_usage: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Source of process memory readings
pub trait MemorySampler: Send + Sync {
    /// Current usage in MB, or `None` when the platform cannot tell
    fn sample_mb(&self) -> Option<f64>;
}

/// Resident memory of the current process via `sysinfo`
pub struct ProcessMemorySampler {
    system: Mutex<System>,
    pid: Pid,
}

impl ProcessMemorySampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl Default for ProcessMemorySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySampler for ProcessMemorySampler {
    fn sample_mb(&self) -> Option<f64> {
        let mut system = self.system.lock();
        if !system.refresh_process(self.pid) {
            return None;
        }
        system
            .process(self.pid)
            .map(|process| process.memory() as f64 / (1024.0 * 1024.0))
    }
}

struct Counters {
    connections: HashMap<String, String>,
    message_count: u64,
    error_count: u64,
    latencies: VecDeque<f64>,
    started: Instant,
}

impl Counters {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            message_count: 0,
            error_count: 0,
            latencies: VecDeque::new(),
            started: Instant::now(),
        }
    }
}

pub struct PerformanceMonitor {
    config: PerformanceMonitorConfig,
    sampler: Option<Arc<dyn MemorySampler>>,
    counters: Mutex<Counters>,
    metrics: RwLock<PerformanceMetrics>,
    listeners: Listeners<PerformanceMetrics>,
    disposed: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PerformanceMonitor {
    pub fn new(
        config: PerformanceMonitorConfig,
        sampler: Option<Arc<dyn MemorySampler>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            sampler,
            counters: Mutex::new(Counters::new()),
            metrics: RwLock::new(PerformanceMetrics::default()),
            listeners: Listeners::new(),
            disposed: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Spawn the metrics and memory timers. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }

        tasks.push(spawn_periodic(
            Arc::downgrade(self),
            self.config.monitoring_interval(),
            |monitor| {
                monitor.tick();
            },
        ));

        if self.sampler.is_some() {
            tasks.push(spawn_periodic(
                Arc::downgrade(self),
                self.config.memory_sample_interval(),
                |monitor| monitor.sample_memory(),
            ));
        }

        info!(
            "Performance monitor started (metrics every {}ms, memory every {}ms)",
            self.config.monitoring_interval_ms, self.config.memory_sample_interval_ms
        );
    }

    pub fn track_connection(&self, id: &str, connection_type: &str) {
        if self.is_disposed() {
            return;
        }
        let count = {
            let mut counters = self.counters.lock();
            counters
                .connections
                .insert(id.to_string(), connection_type.to_string());
            counters.connections.len() as u64
        };
        self.metrics.write().active_connections = count;
        trace!("Tracking connection {} ({}), active={}", id, connection_type, count);
    }

    pub fn untrack_connection(&self, id: &str) {
        if self.is_disposed() {
            return;
        }
        let count = {
            let mut counters = self.counters.lock();
            counters.connections.remove(id);
            counters.connections.len() as u64
        };
        self.metrics.write().active_connections = count;
        trace!("Untracked connection {}, active={}", id, count);
    }

    pub fn record_message(&self) {
        if self.is_disposed() {
            return;
        }
        self.counters.lock().message_count += 1;
    }

    pub fn record_error(&self) {
        if self.is_disposed() {
            return;
        }
        self.counters.lock().error_count += 1;
    }

    pub fn record_latency(&self, latency_ms: f64) {
        if self.is_disposed() {
            return;
        }
        let window = self.config.latency_window.max(1);
        let mut counters = self.counters.lock();
        counters.latencies.push_back(latency_ms);
        while counters.latencies.len() > window {
            counters.latencies.pop_front();
        }
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics.read().clone()
    }

    /// Tracked connections grouped by transport type label
    pub fn connections_by_type(&self) -> HashMap<String, usize> {
        let counters = self.counters.lock();
        let mut by_type = HashMap::new();
        for connection_type in counters.connections.values() {
            *by_type.entry(connection_type.clone()).or_insert(0) += 1;
        }
        by_type
    }

    pub fn subscribe(&self, listener: Listener<PerformanceMetrics>) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Recompute the derived metrics and publish the snapshot
    pub fn tick(&self) -> PerformanceMetrics {
        let snapshot = {
            let counters = self.counters.lock();
            let mut metrics = self.metrics.write();

            let elapsed = counters.started.elapsed().as_secs_f64();
            metrics.active_connections = counters.connections.len() as u64;
            metrics.message_rate = if elapsed > 0.0 {
                counters.message_count as f64 / elapsed
            } else {
                0.0
            };

            let traffic = counters.message_count + counters.error_count;
            metrics.error_rate = if traffic > 0 {
                counters.error_count as f64 / traffic as f64 * 100.0
            } else {
                0.0
            };

            metrics.average_latency_ms = if counters.latencies.is_empty() {
                0.0
            } else {
                counters.latencies.iter().sum::<f64>() / counters.latencies.len() as f64
            };

            metrics.cpu_usage = estimate_cpu(metrics.active_connections, metrics.message_rate);
            metrics.timestamp = Utc::now();
            metrics.clone()
        };

        debug!(
            "Performance tick: connections={} rate={:.1}/s errors={:.1}% latency={:.0}ms memory={:.1}MB",
            snapshot.active_connections,
            snapshot.message_rate,
            snapshot.error_rate,
            snapshot.average_latency_ms,
            snapshot.memory_usage_mb
        );

        self.listeners.publish(&snapshot);
        snapshot
    }

    /// Refresh only the memory field
    pub fn sample_memory(&self) {
        if let Some(memory_mb) = self.sampler.as_ref().and_then(|s| s.sample_mb()) {
            self.metrics.write().memory_usage_mb = memory_mb;
        }
    }

    /// Zero every counter and restart the rate clock. Connections are kept.
    pub fn reset(&self) {
        {
            let mut counters = self.counters.lock();
            counters.message_count = 0;
            counters.error_count = 0;
            counters.latencies.clear();
            counters.started = Instant::now();
        }
        let mut metrics = self.metrics.write();
        metrics.message_rate = 0.0;
        metrics.error_rate = 0.0;
        metrics.average_latency_ms = 0.0;
        debug!("Performance counters reset");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.listeners.clear();
        self.counters.lock().connections.clear();
        self.metrics.write().active_connections = 0;
        info!("Performance monitor disposed");
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// 5 + connections*2 + rate*0.5, capped at 100
pub fn estimate_cpu(active_connections: u64, message_rate: f64) -> f64 {
    (CPU_BASE_PERCENT
        + active_connections as f64 * CPU_PER_CONNECTION
        + message_rate * CPU_PER_MESSAGE_RATE)
        .min(100.0)
}

fn spawn_periodic<F>(monitor: Weak<PerformanceMonitor>, period: Duration, work: F) -> JoinHandle<()>
where
    F: Fn(&PerformanceMonitor) + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match monitor.upgrade() {
                Some(monitor) if !monitor.is_disposed() => work(&monitor),
                _ => break,
            }
        }
    })
}
