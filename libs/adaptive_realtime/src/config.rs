//! Engine Configuration
//!
//! Per-feature strategy policy plus monitor tuning. Supports loading from TOML
//! files with `REALTIME__`-prefixed environment overrides.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{RealtimeError, Result};
use crate::strategy::{NetworkQuality, RealtimeStrategy};

pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 5;
pub const DEFAULT_PROBE_URL: &str = "http://127.0.0.1:8080/health";
pub const DEFAULT_MONITORING_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MEMORY_SAMPLE_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_LATENCY_WINDOW: usize = 100;

/// Advisory feature priority. Not consulted by strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeaturePriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

/// How a feature wants to receive updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPolicy {
    pub primary: RealtimeStrategy,
    pub fallback: RealtimeStrategy,
    #[serde(default)]
    pub polling_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_auto_switch")]
    pub auto_switch: bool,
}

fn default_auto_switch() -> bool {
    true
}

impl StrategyPolicy {
    pub fn new(primary: RealtimeStrategy, fallback: RealtimeStrategy) -> Self {
        Self {
            primary,
            fallback,
            polling_interval_ms: None,
            max_retries: 0,
            reconnect_delay_ms: 0,
            auto_switch: true,
        }
    }

    pub fn with_auto_switch(mut self, auto_switch: bool) -> Self {
        self.auto_switch = auto_switch;
        self
    }
}

/// Per-feature thresholds; the first violated one decides the recommendation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConditions {
    /// Carried for transport code; recommendation does not consult it
    pub min_network_quality: Option<NetworkQuality>,
    pub max_concurrent_users: Option<u64>,
    pub max_memory_usage_mb: Option<f64>,
    pub max_latency_ms: Option<f64>,
    pub error_rate_threshold: Option<f64>,
}

/// One registered consumer of the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub feature: String,
    #[serde(default)]
    pub priority: FeaturePriority,
    pub strategy: StrategyPolicy,
    #[serde(default)]
    pub switch_conditions: SwitchConditions,
}

impl FeatureConfig {
    pub fn new(feature: impl Into<String>, strategy: StrategyPolicy) -> Self {
        Self {
            feature: feature.into(),
            priority: FeaturePriority::default(),
            strategy,
            switch_conditions: SwitchConditions::default(),
        }
    }

    pub fn with_priority(mut self, priority: FeaturePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_conditions(mut self, conditions: SwitchConditions) -> Self {
        self.switch_conditions = conditions;
        self
    }
}

/// Network quality monitor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkMonitorConfig {
    pub check_interval_ms: u64,
    pub probe_url: String,
    pub probe_timeout_ms: u64,
    pub probe_attempts: u32,
}

impl Default for NetworkMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            probe_attempts: DEFAULT_PROBE_ATTEMPTS,
        }
    }
}

impl NetworkMonitorConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Performance monitor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceMonitorConfig {
    pub monitoring_interval_ms: u64,
    pub memory_sample_interval_ms: u64,
    pub latency_window: usize,
}

impl Default for PerformanceMonitorConfig {
    fn default() -> Self {
        Self {
            monitoring_interval_ms: DEFAULT_MONITORING_INTERVAL_MS,
            memory_sample_interval_ms: DEFAULT_MEMORY_SAMPLE_INTERVAL_MS,
            latency_window: DEFAULT_LATENCY_WINDOW,
        }
    }
}

impl PerformanceMonitorConfig {
    pub fn monitoring_interval(&self) -> Duration {
        Duration::from_millis(self.monitoring_interval_ms)
    }

    pub fn memory_sample_interval(&self) -> Duration {
        Duration::from_millis(self.memory_sample_interval_ms)
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub features: Vec<FeatureConfig>,
    pub network: NetworkMonitorConfig,
    pub performance: PerformanceMonitorConfig,
}

impl EngineConfig {
    pub fn new(features: Vec<FeatureConfig>) -> Self {
        Self {
            features,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading engine config: {:?}", path);

        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix("REALTIME")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let engine: EngineConfig = config.try_deserialize()?;
        engine.validate()?;
        Ok(engine)
    }

    /// Reject configurations the monitors cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.network.check_interval_ms == 0 {
            return Err(RealtimeError::configuration(
                "check interval must be positive",
                Some("network.check_interval_ms"),
            ));
        }
        if self.network.probe_attempts == 0 {
            return Err(RealtimeError::configuration(
                "at least one probe attempt is required",
                Some("network.probe_attempts"),
            ));
        }
        if self.performance.monitoring_interval_ms == 0
            || self.performance.memory_sample_interval_ms == 0
        {
            return Err(RealtimeError::configuration(
                "monitoring intervals must be positive",
                Some("performance"),
            ));
        }
        if self.performance.latency_window == 0 {
            return Err(RealtimeError::configuration(
                "latency window must hold at least one sample",
                Some("performance.latency_window"),
            ));
        }

        let mut seen = HashSet::new();
        for feature in &self.features {
            if feature.feature.trim().is_empty() {
                return Err(RealtimeError::configuration(
                    "feature name must not be empty",
                    Some("features.feature"),
                ));
            }
            if !seen.insert(feature.feature.as_str()) {
                warn!(
                    "Duplicate feature '{}' in configuration, last entry wins",
                    feature.feature
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[network]
check_interval_ms = 15000
probe_url = "http://localhost:9000/ping"

[[features]]
feature = "interview-chat"
priority = "critical"

[features.strategy]
primary = "websocket"
fallback = "sse"
reconnect_delay_ms = 1000

[features.switch_conditions]
max_memory_usage_mb = 100.0
min_network_quality = "fair"

[[features]]
feature = "insights-dashboard"

[features.strategy]
primary = "sse"
fallback = "polling"
polling_interval_ms = 30000
auto_switch = false
"#;

    #[test]
    fn test_load_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();

        assert_eq!(config.network.check_interval_ms, 15_000);
        assert_eq!(config.network.probe_attempts, DEFAULT_PROBE_ATTEMPTS);
        assert_eq!(
            config.performance.monitoring_interval_ms,
            DEFAULT_MONITORING_INTERVAL_MS
        );
        assert_eq!(config.features.len(), 2);

        let chat = &config.features[0];
        assert_eq!(chat.priority, FeaturePriority::Critical);
        assert_eq!(chat.strategy.primary, RealtimeStrategy::WebSocket);
        assert!(chat.strategy.auto_switch);
        assert_eq!(chat.switch_conditions.max_memory_usage_mb, Some(100.0));
        assert_eq!(
            chat.switch_conditions.min_network_quality,
            Some(NetworkQuality::Fair)
        );

        let dashboard = &config.features[1];
        assert_eq!(dashboard.priority, FeaturePriority::Medium);
        assert!(!dashboard.strategy.auto_switch);
        assert_eq!(dashboard.strategy.polling_interval_ms, Some(30_000));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = EngineConfig::load(Path::new("/nonexistent/realtime.toml"));
        assert!(matches!(result, Err(RealtimeError::Configuration { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = EngineConfig::default();
        config.network.check_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_feature_name() {
        let config = EngineConfig::new(vec![FeatureConfig::new(
            " ",
            StrategyPolicy::new(RealtimeStrategy::Sse, RealtimeStrategy::Polling),
        )]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_features_are_accepted() {
        let policy = StrategyPolicy::new(RealtimeStrategy::Sse, RealtimeStrategy::Polling);
        let config = EngineConfig::new(vec![
            FeatureConfig::new("feed", policy.clone()),
            FeatureConfig::new("feed", policy),
        ]);
        assert!(config.validate().is_ok());
    }
}
