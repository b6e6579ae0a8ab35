//! Network Quality Monitor
//!
//! Runs one probe cycle immediately on start and then every
//! `check_interval`. Subscribers hear about quality only when it changes.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::{classify, ConnectionTelemetry, HealthProbe, NetworkMetrics, LATENCY_SENTINEL_MS};
use crate::config::NetworkMonitorConfig;
use crate::listeners::{Listener, Listeners, Subscription};
use crate::strategy::NetworkQuality;

struct NetworkState {
    metrics: NetworkMetrics,
    quality: NetworkQuality,
}

pub struct NetworkMonitor {
    config: NetworkMonitorConfig,
    probe: Arc<dyn HealthProbe>,
    telemetry: Option<Arc<dyn ConnectionTelemetry>>,
    state: RwLock<NetworkState>,
    listeners: Listeners<NetworkQuality>,
    /// Bumped on dispose; probe cycles started under an older epoch are dropped
    epoch: AtomicU64,
    disposed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl NetworkMonitor {
    pub fn new(
        config: NetworkMonitorConfig,
        probe: Arc<dyn HealthProbe>,
        telemetry: Option<Arc<dyn ConnectionTelemetry>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            probe,
            telemetry,
            state: RwLock::new(NetworkState {
                metrics: NetworkMetrics::default(),
                quality: NetworkQuality::Good,
            }),
            listeners: Listeners::new(),
            epoch: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Spawn the probing timer. Must be called inside a tokio runtime.
    pub fn start(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let period = self.config.check_interval();
        let weak: Weak<Self> = Arc::downgrade(self);
        *task = Some(tokio::spawn(async move {
            if let Some(monitor) = weak.upgrade() {
                monitor.check_quality().await;
            }

            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(monitor) => {
                        monitor.check_quality().await;
                    }
                    None => break,
                }
            }
        }));

        info!(
            "Network monitor started (interval {}ms, endpoint {})",
            self.config.check_interval_ms, self.config.probe_url
        );
    }

    pub fn current_quality(&self) -> NetworkQuality {
        self.state.read().quality
    }

    pub fn metrics(&self) -> NetworkMetrics {
        self.state.read().metrics.clone()
    }

    pub fn subscribe(&self, listener: Listener<NetworkQuality>) -> Subscription {
        self.listeners.subscribe(listener)
    }

    /// Entry point for platform connection-change events
    pub async fn notify_connection_change(&self) -> Option<NetworkQuality> {
        debug!("Connection change reported, re-checking network quality");
        self.check_quality().await
    }

    /// Run one full probe cycle and publish if quality changed.
    ///
    /// Returns `None` when the result was discarded because the monitor was
    /// disposed while the probes were in flight.
    pub async fn check_quality(&self) -> Option<NetworkQuality> {
        if self.disposed.load(Ordering::Acquire) {
            return None;
        }
        let epoch = self.epoch.load(Ordering::Acquire);

        let rtt_ms = self.measure_latency().await;
        let packet_loss = self.measure_packet_loss().await;

        let mut metrics = self.metrics();
        metrics.rtt_ms = rtt_ms;
        metrics.packet_loss = packet_loss;
        metrics.timestamp = Utc::now();

        if let Some(telemetry) = self.telemetry.as_ref().filter(|t| t.available()) {
            metrics.online = telemetry.is_online();
            if let Some(sample) = telemetry.read() {
                metrics.merge_telemetry(&sample);
            }
        }

        if self.disposed.load(Ordering::Acquire) || self.epoch.load(Ordering::Acquire) != epoch {
            debug!("Discarding probe result from a stale monitor epoch");
            return None;
        }

        let quality = classify(&metrics);
        debug!(
            "Network check: rtt={:.0}ms loss={:.0}% downlink={:.1}Mbps -> {}",
            metrics.rtt_ms, metrics.packet_loss, metrics.downlink_mbps, quality
        );

        let previous = {
            let mut state = self.state.write();
            let previous = state.quality;
            state.metrics = metrics;
            state.quality = quality;
            previous
        };

        if previous != quality {
            if quality.is_degraded() {
                warn!("Network quality degraded: {} -> {}", previous, quality);
            } else {
                info!("Network quality changed: {} -> {}", previous, quality);
            }
            self.listeners.publish(&quality);
        }

        Some(quality)
    }

    /// Time a single round trip; failures count as the latency sentinel
    async fn measure_latency(&self) -> f64 {
        let limit = self.config.probe_timeout();
        let started = Instant::now();
        match timeout(limit, self.probe.probe(limit)).await {
            Ok(Ok(())) => started.elapsed().as_secs_f64() * 1000.0,
            Ok(Err(e)) => {
                trace!("Latency probe failed: {}", e);
                LATENCY_SENTINEL_MS
            }
            Err(_) => {
                trace!("Latency probe timed out after {:?}", limit);
                LATENCY_SENTINEL_MS
            }
        }
    }

    /// Sequential attempts; loss = failed / attempts * 100
    async fn measure_packet_loss(&self) -> f64 {
        let attempts = self.config.probe_attempts.max(1);
        let limit = self.config.probe_timeout();
        let mut failed = 0u32;

        for attempt in 0..attempts {
            let ok = matches!(timeout(limit, self.probe.probe(limit)).await, Ok(Ok(())));
            trace!("Loss probe {}/{}: {}", attempt + 1, attempts, if ok { "ok" } else { "failed" });
            if !ok {
                failed += 1;
            }
        }

        failed as f64 / attempts as f64 * 100.0
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop the timer, drop subscribers, invalidate in-flight probes
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.epoch.fetch_add(1, Ordering::AcqRel);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.listeners.clear();
        info!("Network monitor disposed");
    }
}

impl Drop for NetworkMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RealtimeError, Result};
    use crate::network::{ConnectionClass, StaticTelemetry, TelemetrySample};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Replays scripted outcomes, then succeeds
    struct ScriptedProbe {
        outcomes: Mutex<VecDeque<bool>>,
    }

    impl ScriptedProbe {
        fn new(outcomes: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
            })
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, _timeout: Duration) -> Result<()> {
            match self.outcomes.lock().pop_front() {
                Some(false) => Err(RealtimeError::probe("scripted failure")),
                _ => Ok(()),
            }
        }
    }

    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        async fn probe(&self, _timeout: Duration) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn fast_link() -> Option<Arc<dyn ConnectionTelemetry>> {
        Some(Arc::new(StaticTelemetry::new(TelemetrySample {
            rtt_ms: Some(20.0),
            downlink_mbps: Some(50.0),
            effective_type: Some(ConnectionClass::FourG),
        })))
    }

    fn config() -> NetworkMonitorConfig {
        NetworkMonitorConfig {
            probe_timeout_ms: 50,
            ..NetworkMonitorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_eighty_percent_loss_is_poor_despite_fast_link() {
        // latency probe ok, then 1 success and 4 failures
        let probe = ScriptedProbe::new(&[true, true, false, false, false, false]);
        let monitor = NetworkMonitor::new(config(), probe, fast_link());

        let quality = monitor.check_quality().await;

        assert_eq!(quality, Some(NetworkQuality::Poor));
        assert_eq!(monitor.metrics().packet_loss, 80.0);
        assert_eq!(monitor.metrics().downlink_mbps, 50.0);
    }

    #[tokio::test]
    async fn test_failed_latency_probe_uses_sentinel() {
        let probe = ScriptedProbe::new(&[false]);
        let monitor = NetworkMonitor::new(config(), probe, None);

        let quality = monitor.check_quality().await;

        assert_eq!(monitor.metrics().rtt_ms, LATENCY_SENTINEL_MS);
        assert_eq!(monitor.metrics().packet_loss, 0.0);
        assert_eq!(quality, Some(NetworkQuality::Poor));
    }

    #[tokio::test]
    async fn test_hanging_probe_times_out_without_blocking() {
        let monitor = NetworkMonitor::new(config(), Arc::new(HangingProbe), None);

        let quality = monitor.check_quality().await;

        assert_eq!(quality, Some(NetworkQuality::Poor));
        assert_eq!(monitor.metrics().rtt_ms, LATENCY_SENTINEL_MS);
        assert_eq!(monitor.metrics().packet_loss, 100.0);
    }

    #[tokio::test]
    async fn test_notifies_only_on_change() {
        let monitor = NetworkMonitor::new(config(), ScriptedProbe::new(&[]), fast_link());
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&notified);
        let _subscription = monitor.subscribe(Arc::new(move |_: &NetworkQuality| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(monitor.check_quality().await, Some(NetworkQuality::Excellent));
        assert_eq!(monitor.check_quality().await, Some(NetworkQuality::Excellent));
        assert_eq!(monitor.check_quality().await, Some(NetworkQuality::Excellent));

        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_offline_telemetry() {
        let monitor = NetworkMonitor::new(
            config(),
            ScriptedProbe::new(&[]),
            Some(Arc::new(StaticTelemetry::offline())),
        );
        assert_eq!(monitor.check_quality().await, Some(NetworkQuality::Offline));
    }

    #[tokio::test]
    async fn test_dispose_discards_results_and_listeners() {
        let monitor = NetworkMonitor::new(config(), ScriptedProbe::new(&[]), fast_link());
        let _subscription = monitor.subscribe(Arc::new(|_: &NetworkQuality| {}));
        monitor.start();

        monitor.dispose();
        monitor.dispose();

        assert!(monitor.is_disposed());
        assert!(monitor.listeners.is_empty());
        assert_eq!(monitor.check_quality().await, None);
        assert!(monitor.task.lock().is_none());
    }

    #[tokio::test]
    async fn test_probe_in_flight_during_dispose_is_dropped() {
        struct SlowProbe;

        #[async_trait]
        impl HealthProbe for SlowProbe {
            async fn probe(&self, _timeout: Duration) -> Result<()> {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(())
            }
        }

        let monitor = NetworkMonitor::new(config(), Arc::new(SlowProbe), fast_link());
        let in_flight = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.check_quality().await })
        };

        tokio::time::sleep(Duration::from_millis(1)).await;
        monitor.dispose();

        assert_eq!(in_flight.await.unwrap(), None);
        assert_eq!(monitor.current_quality(), NetworkQuality::Good);
    }
}
