//! Adaptive Realtime Facade
//!
//! [`AdaptiveRealtime`] is the control surface transport code talks to:
//! connection/message/error/latency reporting plus strategy reads and
//! overrides. It is a cheap-to-clone handle; pass it to collaborators
//! explicitly, or use the process-wide slot via [`initialize`],
//! [`instance`] and [`dispose`].
//!
//! The first `initialize` wins. Later calls return the existing handle and
//! silently ignore their own options; nothing is merged.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{EngineConfig, FeatureConfig};
use crate::error::{RealtimeError, Result};
use crate::manager::{EngineOptions, StrategyManager};
use crate::network::NetworkMetrics;
use crate::performance::PerformanceMetrics;
use crate::strategy::{NetworkQuality, RealtimeStrategy, StrategyTransition, TransitionReason};

struct Engine {
    config: EngineConfig,
    manager: StrategyManager,
}

/// Handle to a running engine
#[derive(Clone)]
pub struct AdaptiveRealtime {
    engine: Arc<Engine>,
}

impl AdaptiveRealtime {
    /// Start an engine that is not registered in the process-wide slot.
    /// Fails with a configuration error outside a tokio runtime.
    pub fn create(options: EngineOptions) -> Result<Self> {
        let config = options.config.clone();
        let manager = StrategyManager::new(options)?;
        Ok(Self {
            engine: Arc::new(Engine { config, manager }),
        })
    }

    /// Recommended strategy for `feature`; `none` when unknown or closed
    pub fn get_strategy(&self, feature: &str) -> RealtimeStrategy {
        self.engine.manager.current_strategy(feature)
    }

    pub async fn switch_strategy(
        &self,
        feature: &str,
        strategy: RealtimeStrategy,
    ) -> Result<Option<StrategyTransition>> {
        self.switch_strategy_with_reason(feature, strategy, TransitionReason::ManualOverride)
            .await
    }

    pub async fn switch_strategy_with_reason(
        &self,
        feature: &str,
        strategy: RealtimeStrategy,
        reason: TransitionReason,
    ) -> Result<Option<StrategyTransition>> {
        self.engine
            .manager
            .switch_strategy(feature, strategy, reason)
            .await
    }

    pub fn track_connection(&self, id: &str, connection_type: &str) {
        self.engine
            .manager
            .performance_monitor()
            .track_connection(id, connection_type);
    }

    pub fn untrack_connection(&self, id: &str) {
        self.engine.manager.performance_monitor().untrack_connection(id);
    }

    pub fn track_message(&self) {
        self.engine.manager.performance_monitor().record_message();
    }

    pub fn track_error(&self) {
        self.engine.manager.performance_monitor().record_error();
    }

    pub fn track_latency(&self, latency_ms: f64) {
        self.engine
            .manager
            .performance_monitor()
            .record_latency(latency_ms);
    }

    pub fn network_quality(&self) -> NetworkQuality {
        self.engine.manager.network_monitor().current_quality()
    }

    pub fn network_metrics(&self) -> NetworkMetrics {
        self.engine.manager.network_monitor().metrics()
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.engine.manager.performance_monitor().metrics()
    }

    pub fn current_strategies(&self) -> HashMap<String, RealtimeStrategy> {
        self.engine.manager.current_strategies()
    }

    pub fn transition_history(&self) -> Vec<StrategyTransition> {
        self.engine.manager.transition_history()
    }

    pub fn features(&self) -> Vec<FeatureConfig> {
        self.engine.manager.features()
    }

    /// Configuration this engine was created with
    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    pub fn manager(&self) -> &StrategyManager {
        &self.engine.manager
    }

    pub fn is_closed(&self) -> bool {
        self.engine.manager.is_disposed()
    }

    /// Tear down timers and state. Tracking calls afterwards are no-ops.
    pub fn close(&self) {
        self.engine.manager.dispose();
    }
}

impl std::fmt::Debug for AdaptiveRealtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRealtime")
            .field("features", &self.engine.config.features.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

static INSTANCE: Lazy<Mutex<Option<AdaptiveRealtime>>> = Lazy::new(|| Mutex::new(None));

/// Create the process-wide engine, or return the existing one unchanged
pub fn initialize(options: EngineOptions) -> Result<AdaptiveRealtime> {
    let mut slot = INSTANCE.lock();
    if let Some(existing) = slot.as_ref() {
        debug!("Adaptive realtime already initialized, ignoring new options");
        return Ok(existing.clone());
    }

    let engine = AdaptiveRealtime::create(options)?;
    *slot = Some(engine.clone());
    info!("Adaptive realtime initialized");
    Ok(engine)
}

/// The process-wide engine. Calling this before [`initialize`] is a
/// programmer error and returns [`RealtimeError::NotInitialized`].
pub fn instance() -> Result<AdaptiveRealtime> {
    INSTANCE
        .lock()
        .clone()
        .ok_or_else(|| RealtimeError::not_initialized("instance"))
}

pub fn is_initialized() -> bool {
    INSTANCE.lock().is_some()
}

/// Close the process-wide engine and reset to uninitialized
pub fn dispose() {
    let engine = INSTANCE.lock().take();
    if let Some(engine) = engine {
        engine.close();
        info!("Adaptive realtime disposed");
    }
}
