//! Strategy Manager
//!
//! Owns one strategy per registered feature. Both monitors publish into a
//! single evaluator task through an unbounded channel; the evaluator
//! re-checks every `auto_switch` feature and performs a transition when the
//! recommendation differs from the current strategy.
//!
//! ```text
//!  NetworkMonitor ──quality change──┐
//!                                   ├──> mpsc ──> evaluator ──> transitions
//!  PerformanceMonitor ──tick────────┘                 │
//!                                                     └──> history (last 100)
//! ```
//!
//! Manual `switch_strategy` calls bypass the `auto_switch` gate and write
//! directly. An automatic evaluation that runs afterwards does not defer to a
//! manual override: last write wins.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, FeatureConfig};
use crate::error::{RealtimeError, Result};
use crate::listeners::Subscription;
use crate::network::{ConnectionTelemetry, HealthProbe, HttpHealthProbe, NetworkMonitor};
use crate::performance::{MemorySampler, PerformanceMetrics, PerformanceMonitor, ProcessMemorySampler};
use crate::strategy::{NetworkQuality, RealtimeStrategy, StrategyTransition, TransitionReason};

/// Transitions retained in history
pub const HISTORY_CAPACITY: usize = 100;

// Global thresholds used only to label a performance-triggered transition.
// They are independent of each feature's switch conditions.
pub const REASON_MEMORY_MB: f64 = 100.0;
pub const REASON_ERROR_RATE_PERCENT: f64 = 5.0;
pub const REASON_LATENCY_MS: f64 = 1_000.0;
pub const REASON_CONNECTIONS: u64 = 50;

pub type TransitionHook = Arc<dyn Fn(&StrategyTransition) + Send + Sync>;
pub type MetricsHook = Arc<dyn Fn(&PerformanceMetrics) + Send + Sync>;

/// Gate consulted before a transition is committed. An error marks the
/// transition failed and lands the feature on its fallback strategy.
#[async_trait]
pub trait StrategyApplier: Send + Sync {
    async fn apply(
        &self,
        feature: &str,
        from: RealtimeStrategy,
        to: RealtimeStrategy,
    ) -> Result<()>;
}

/// Applier that accepts every transition
pub struct AcceptAll;

#[async_trait]
impl StrategyApplier for AcceptAll {
    async fn apply(&self, _: &str, _: RealtimeStrategy, _: RealtimeStrategy) -> Result<()> {
        Ok(())
    }
}

/// Configuration plus injected capabilities and observability hooks
#[derive(Clone)]
pub struct EngineOptions {
    pub config: EngineConfig,
    pub probe: Option<Arc<dyn HealthProbe>>,
    pub telemetry: Option<Arc<dyn ConnectionTelemetry>>,
    pub memory_sampler: Option<Arc<dyn MemorySampler>>,
    pub applier: Arc<dyn StrategyApplier>,
    pub on_transition: Option<TransitionHook>,
    pub on_metrics_update: Option<MetricsHook>,
}

impl EngineOptions {
    /// Defaults: HTTP probe against `config.network.probe_url`, no telemetry,
    /// process memory sampling, accept-all applier
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            probe: None,
            telemetry: None,
            memory_sampler: Some(Arc::new(ProcessMemorySampler::new())),
            applier: Arc::new(AcceptAll),
            on_transition: None,
            on_metrics_update: None,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn ConnectionTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_memory_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.memory_sampler = Some(sampler);
        self
    }

    pub fn without_memory_sampling(mut self) -> Self {
        self.memory_sampler = None;
        self
    }

    pub fn with_applier(mut self, applier: Arc<dyn StrategyApplier>) -> Self {
        self.applier = applier;
        self
    }

    pub fn on_transition<F>(mut self, hook: F) -> Self
    where
        F: Fn(&StrategyTransition) + Send + Sync + 'static,
    {
        self.on_transition = Some(Arc::new(hook));
        self
    }

    pub fn on_metrics_update<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PerformanceMetrics) + Send + Sync + 'static,
    {
        self.on_metrics_update = Some(Arc::new(hook));
        self
    }
}

/// What caused an evaluation pass
#[derive(Debug, Clone)]
pub enum EvaluationTrigger {
    Quality(NetworkQuality),
    Performance(PerformanceMetrics),
}

/// Best-effort label for an automatic transition.
///
/// Uses the fixed global thresholds, so the label can disagree with the
/// per-feature condition that actually drove the recommendation.
pub fn classify_reason(trigger: &EvaluationTrigger) -> TransitionReason {
    match trigger {
        EvaluationTrigger::Quality(quality) if quality.is_degraded() => {
            TransitionReason::NetworkQualityDegraded
        }
        EvaluationTrigger::Quality(_) => TransitionReason::NetworkQualityImproved,
        EvaluationTrigger::Performance(metrics) => {
            if metrics.memory_usage_mb > REASON_MEMORY_MB {
                TransitionReason::HighMemoryUsage
            } else if metrics.error_rate > REASON_ERROR_RATE_PERCENT {
                TransitionReason::HighErrorRate
            } else if metrics.average_latency_ms > REASON_LATENCY_MS {
                TransitionReason::HighLatency
            } else if metrics.active_connections > REASON_CONNECTIONS {
                TransitionReason::UserCountExceeded
            } else {
                TransitionReason::ManualOverride
            }
        }
    }
}

/// Recommended strategy for one feature. The first violated switch
/// condition decides; the rest are not checked.
pub fn recommend(
    feature: &FeatureConfig,
    quality: NetworkQuality,
    metrics: &PerformanceMetrics,
) -> RealtimeStrategy {
    let policy = &feature.strategy;
    let conditions = &feature.switch_conditions;

    if quality == NetworkQuality::Offline {
        return RealtimeStrategy::None;
    }
    if conditions
        .max_memory_usage_mb
        .is_some_and(|max| metrics.memory_usage_mb > max)
    {
        return policy.primary.downgrade();
    }
    if conditions
        .error_rate_threshold
        .is_some_and(|max| metrics.error_rate > max)
    {
        return policy.fallback;
    }
    if conditions
        .max_latency_ms
        .is_some_and(|max| metrics.average_latency_ms > max)
    {
        return policy.primary.downgrade();
    }
    if conditions
        .max_concurrent_users
        .is_some_and(|max| metrics.active_connections > max)
    {
        return policy.primary.downgrade();
    }

    match quality {
        NetworkQuality::Excellent | NetworkQuality::Good => policy.primary,
        NetworkQuality::Fair if policy.primary == RealtimeStrategy::WebSocket => {
            RealtimeStrategy::Sse
        }
        NetworkQuality::Fair => policy.primary,
        NetworkQuality::Poor => RealtimeStrategy::Polling,
        NetworkQuality::Offline => RealtimeStrategy::None,
    }
}

enum EngineEvent {
    Quality {
        quality: NetworkQuality,
        ack: Option<oneshot::Sender<()>>,
    },
    Metrics {
        metrics: PerformanceMetrics,
        ack: Option<oneshot::Sender<()>>,
    },
}

struct ManagerState {
    current: HashMap<String, RealtimeStrategy>,
    history: VecDeque<StrategyTransition>,
    quality: NetworkQuality,
    metrics: PerformanceMetrics,
}

impl ManagerState {
    fn record(&mut self, transition: StrategyTransition) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(transition);
    }
}

/// State shared between the public handle and the evaluator task
struct Evaluator {
    features: HashMap<String, FeatureConfig>,
    state: RwLock<ManagerState>,
    applier: Arc<dyn StrategyApplier>,
    on_transition: Option<TransitionHook>,
    disposed: AtomicBool,
}

impl Evaluator {
    async fn handle(&self, event: EngineEvent) {
        match event {
            EngineEvent::Quality { quality, ack } => {
                self.state.write().quality = quality;
                self.evaluate(EvaluationTrigger::Quality(quality)).await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
            EngineEvent::Metrics { metrics, ack } => {
                self.state.write().metrics = metrics.clone();
                self.evaluate(EvaluationTrigger::Performance(metrics)).await;
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        }
    }

    async fn evaluate(&self, trigger: EvaluationTrigger) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }

        let (quality, metrics) = {
            let state = self.state.read();
            (state.quality, state.metrics.clone())
        };

        let mut candidates: Vec<&FeatureConfig> = self
            .features
            .values()
            .filter(|feature| feature.strategy.auto_switch)
            .collect();
        candidates.sort_by(|a, b| a.feature.cmp(&b.feature));

        for feature in candidates {
            let recommended = recommend(feature, quality, &metrics);
            let current = self.current(&feature.feature);
            if recommended != current {
                debug!(
                    "Feature '{}': {} recommended over {} ({})",
                    feature.feature, recommended, current, quality
                );
                self.transition(feature, recommended, classify_reason(&trigger))
                    .await;
            }
        }
    }

    fn current(&self, feature: &str) -> RealtimeStrategy {
        self.state
            .read()
            .current
            .get(feature)
            .copied()
            .unwrap_or(RealtimeStrategy::None)
    }

    async fn transition(
        &self,
        feature: &FeatureConfig,
        to: RealtimeStrategy,
        reason: TransitionReason,
    ) -> Option<StrategyTransition> {
        let start_time = Utc::now();
        let from = self.current(&feature.feature);

        let outcome = self.applier.apply(&feature.feature, from, to).await;
        if self.disposed.load(Ordering::Acquire) {
            return None;
        }

        let (landed, error) = match outcome {
            Ok(()) => (to, None),
            Err(e) => (feature.strategy.fallback, Some(e.to_string())),
        };

        let transition = StrategyTransition {
            feature: feature.feature.clone(),
            from,
            to,
            reason,
            start_time,
            end_time: Utc::now(),
            success: error.is_none(),
            error,
        };

        {
            let mut state = self.state.write();
            state.current.insert(feature.feature.clone(), landed);
            state.record(transition.clone());
        }

        match &transition.error {
            None => info!(
                "Feature '{}' switched {} -> {} ({})",
                transition.feature, from, to, reason
            ),
            Some(error) => warn!(
                "Feature '{}' failed to switch {} -> {}: {}; using fallback {}",
                transition.feature, from, to, error, landed
            ),
        }

        if let Some(hook) = &self.on_transition {
            hook(&transition);
        }

        Some(transition)
    }
}

pub struct StrategyManager {
    core: Arc<Evaluator>,
    network: Arc<NetworkMonitor>,
    performance: Arc<PerformanceMonitor>,
    events: mpsc::UnboundedSender<EngineEvent>,
    evaluator: Mutex<Option<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl StrategyManager {
    /// Register features, record their initial strategies and start both
    /// monitors. Outside a tokio runtime this returns a configuration error.
    pub fn new(options: EngineOptions) -> Result<Self> {
        let EngineOptions {
            config,
            probe,
            telemetry,
            memory_sampler,
            applier,
            on_transition,
            on_metrics_update,
        } = options;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(RealtimeError::configuration(
                "strategy manager must be created inside a tokio runtime",
                None,
            ));
        }
        config.validate()?;

        let probe: Arc<dyn HealthProbe> = match probe {
            Some(probe) => probe,
            None => Arc::new(HttpHealthProbe::new(config.network.probe_url.clone())?),
        };
        let network = NetworkMonitor::new(config.network.clone(), probe, telemetry);
        let performance = PerformanceMonitor::new(config.performance.clone(), memory_sampler);

        let mut features = HashMap::new();
        for feature in config.features {
            features.insert(feature.feature.clone(), feature);
        }

        let mut state = ManagerState {
            current: HashMap::new(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            quality: network.current_quality(),
            metrics: performance.metrics(),
        };

        let mut names: Vec<&String> = features.keys().collect();
        names.sort();
        let mut initial = Vec::with_capacity(names.len());
        for name in names {
            let primary = features[name].strategy.primary;
            let now = Utc::now();
            let transition = StrategyTransition {
                feature: name.clone(),
                from: RealtimeStrategy::None,
                to: primary,
                reason: TransitionReason::InitialSetup,
                start_time: now,
                end_time: now,
                success: true,
                error: None,
            };
            state.current.insert(name.clone(), primary);
            state.record(transition.clone());
            initial.push(transition);
        }

        let core = Arc::new(Evaluator {
            features,
            state: RwLock::new(state),
            applier,
            on_transition,
            disposed: AtomicBool::new(false),
        });

        if let Some(hook) = &core.on_transition {
            for transition in &initial {
                hook(transition);
            }
        }

        let (events, mut receiver) = mpsc::unbounded_channel::<EngineEvent>();

        let evaluator = {
            let core = Arc::clone(&core);
            tokio::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    core.handle(event).await;
                }
                debug!("Strategy evaluator stopped");
            })
        };

        let quality_events = events.clone();
        let quality_subscription = network.subscribe(Arc::new(move |quality: &NetworkQuality| {
            let _ = quality_events.send(EngineEvent::Quality {
                quality: *quality,
                ack: None,
            });
        }));

        let metrics_events = events.clone();
        let metrics_subscription =
            performance.subscribe(Arc::new(move |metrics: &PerformanceMetrics| {
                if let Some(hook) = &on_metrics_update {
                    hook(metrics);
                }
                let _ = metrics_events.send(EngineEvent::Metrics {
                    metrics: metrics.clone(),
                    ack: None,
                });
            }));

        network.start();
        performance.start();

        info!(
            "Strategy manager started with {} feature(s)",
            core.features.len()
        );

        Ok(Self {
            core,
            network,
            performance,
            events,
            evaluator: Mutex::new(Some(evaluator)),
            subscriptions: Mutex::new(vec![quality_subscription, metrics_subscription]),
        })
    }

    /// Current strategy, or `none` for an unknown feature
    pub fn current_strategy(&self, feature: &str) -> RealtimeStrategy {
        self.core.current(feature)
    }

    pub fn current_strategies(&self) -> HashMap<String, RealtimeStrategy> {
        self.core.state.read().current.clone()
    }

    /// Manually move a feature to `strategy`, regardless of `auto_switch`.
    ///
    /// Returns `Ok(None)` without recording anything when the feature is
    /// already on `strategy`.
    pub async fn switch_strategy(
        &self,
        feature: &str,
        strategy: RealtimeStrategy,
        reason: TransitionReason,
    ) -> Result<Option<StrategyTransition>> {
        if self.is_disposed() {
            return Err(RealtimeError::disposed("switch_strategy"));
        }
        let config = self
            .core
            .features
            .get(feature)
            .ok_or_else(|| RealtimeError::unknown_feature(feature))?;

        if self.core.current(feature) == strategy {
            return Ok(None);
        }

        match self.core.transition(config, strategy, reason).await {
            Some(transition) => Ok(Some(transition)),
            None => Err(RealtimeError::disposed("switch_strategy")),
        }
    }

    /// Evaluate against `metrics` now instead of waiting for the next tick
    pub async fn update_metrics(&self, metrics: PerformanceMetrics) {
        let (ack, done) = oneshot::channel();
        if self
            .events
            .send(EngineEvent::Metrics {
                metrics,
                ack: Some(ack),
            })
            .is_ok()
        {
            let _ = done.await;
        }
    }

    /// Evaluate against `quality` now instead of waiting for the next probe
    pub async fn update_network_quality(&self, quality: NetworkQuality) {
        let (ack, done) = oneshot::channel();
        if self
            .events
            .send(EngineEvent::Quality {
                quality,
                ack: Some(ack),
            })
            .is_ok()
        {
            let _ = done.await;
        }
    }

    /// Retained transitions, oldest first
    pub fn transition_history(&self) -> Vec<StrategyTransition> {
        self.core.state.read().history.iter().cloned().collect()
    }

    pub fn features(&self) -> Vec<FeatureConfig> {
        let mut features: Vec<FeatureConfig> = self.core.features.values().cloned().collect();
        features.sort_by(|a, b| a.feature.cmp(&b.feature));
        features
    }

    pub fn network_monitor(&self) -> &Arc<NetworkMonitor> {
        &self.network
    }

    pub fn performance_monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.performance
    }

    pub fn is_disposed(&self) -> bool {
        self.core.disposed.load(Ordering::Acquire)
    }

    /// Stop both monitors and the evaluator, clear all in-memory state
    pub fn dispose(&self) {
        if self.core.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
        self.network.dispose();
        self.performance.dispose();
        if let Some(evaluator) = self.evaluator.lock().take() {
            evaluator.abort();
        }

        {
            let mut state = self.core.state.write();
            state.current.clear();
            state.history.clear();
        }

        info!("Strategy manager disposed");
    }
}

impl Drop for StrategyManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
