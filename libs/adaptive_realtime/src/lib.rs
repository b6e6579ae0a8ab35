//! # Adaptive Realtime Strategy Engine
//!
//! Continuously measures network quality and application performance and
//! decides, per feature, which realtime transport tier should be in effect:
//! websocket, server-sent events, polling, or none. Transport code reads the
//! decision and reports its traffic back; it never needs to know why a tier
//! was chosen.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  quality change  ┌──────────────────┐
//! │ NetworkMonitor   │ ───────────────> │                  │
//! │ (probe, 10s)     │                  │ StrategyManager  │ ──> transition history
//! └──────────────────┘                  │ (evaluator task) │ ──> on_transition hook
//! ┌──────────────────┐  metrics tick    │                  │
//! │ PerformanceMon.  │ ───────────────> │                  │
//! │ (5s, memory 2s)  │                  └──────────────────┘
//! └──────────────────┘                           ▲
//!          ▲                                     │ get_strategy / switch_strategy
//!          └──── track_* ──── AdaptiveRealtime ──┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use adaptive_realtime::{
//!     AdaptiveRealtime, EngineConfig, EngineOptions, FeatureConfig, RealtimeStrategy,
//!     StrategyPolicy,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::new(vec![FeatureConfig::new(
//!     "interview-chat",
//!     StrategyPolicy::new(RealtimeStrategy::WebSocket, RealtimeStrategy::Sse),
//! )]);
//!
//! let engine = AdaptiveRealtime::create(EngineOptions::new(config))?;
//! engine.track_connection("socket-1", "websocket");
//! let tier = engine.get_strategy("interview-chat");
//! # let _ = tier;
//! engine.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod facade;
pub mod listeners;
pub mod manager;
pub mod network;
pub mod performance;
pub mod strategy;

pub use crate::config::{
    EngineConfig, FeatureConfig, FeaturePriority, NetworkMonitorConfig,
    PerformanceMonitorConfig, StrategyPolicy, SwitchConditions,
};
pub use error::{RealtimeError, Result};
pub use facade::{dispose, initialize, instance, is_initialized, AdaptiveRealtime};
pub use listeners::{Listener, Subscription};
pub use manager::{
    classify_reason, recommend, AcceptAll, EngineOptions, EvaluationTrigger, StrategyApplier,
    StrategyManager, HISTORY_CAPACITY,
};
pub use network::{
    classify, ConnectionClass, ConnectionTelemetry, HealthProbe, HttpHealthProbe,
    NetworkMetrics, NetworkMonitor, StaticTelemetry, TelemetrySample,
};
pub use performance::{MemorySampler, PerformanceMetrics, PerformanceMonitor, ProcessMemorySampler};
pub use strategy::{NetworkQuality, RealtimeStrategy, StrategyTransition, TransitionReason};
