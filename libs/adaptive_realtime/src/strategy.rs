//! Strategy Definitions
//!
//! The strategy ladder (`websocket > sse > polling > none`), network quality
//! levels, and the transition records produced whenever a feature changes tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RealtimeError;

/// Realtime transport tier, ranked richest to weakest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeStrategy {
    /// Persistent bidirectional connection
    WebSocket,
    /// Server-push stream
    Sse,
    /// Periodic polling
    Polling,
    /// No realtime updates
    None,
}

impl RealtimeStrategy {
    /// All strategies, richest first
    pub const LADDER: [RealtimeStrategy; 4] = [
        RealtimeStrategy::WebSocket,
        RealtimeStrategy::Sse,
        RealtimeStrategy::Polling,
        RealtimeStrategy::None,
    ];

    /// Position on the ladder; 0 is the richest tier
    pub const fn rank(self) -> u8 {
        match self {
            RealtimeStrategy::WebSocket => 0,
            RealtimeStrategy::Sse => 1,
            RealtimeStrategy::Polling => 2,
            RealtimeStrategy::None => 3,
        }
    }

    /// Next weaker tier. `None` is the floor and maps to itself.
    pub const fn downgrade(self) -> Self {
        match self {
            RealtimeStrategy::WebSocket => RealtimeStrategy::Sse,
            RealtimeStrategy::Sse => RealtimeStrategy::Polling,
            RealtimeStrategy::Polling => RealtimeStrategy::None,
            RealtimeStrategy::None => RealtimeStrategy::None,
        }
    }

    /// Whether the tier delivers updates at all
    pub fn is_realtime(self) -> bool {
        self != RealtimeStrategy::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RealtimeStrategy::WebSocket => "websocket",
            RealtimeStrategy::Sse => "sse",
            RealtimeStrategy::Polling => "polling",
            RealtimeStrategy::None => "none",
        }
    }
}

impl PartialOrd for RealtimeStrategy {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Richer tiers compare greater: `WebSocket > Sse > Polling > None`
impl Ord for RealtimeStrategy {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.rank().cmp(&self.rank())
    }
}

impl fmt::Display for RealtimeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RealtimeStrategy {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "websocket" => Ok(RealtimeStrategy::WebSocket),
            "sse" => Ok(RealtimeStrategy::Sse),
            "polling" => Ok(RealtimeStrategy::Polling),
            "none" => Ok(RealtimeStrategy::None),
            other => Err(RealtimeError::configuration(
                format!("unknown realtime strategy '{}'", other),
                Some("strategy"),
            )),
        }
    }
}

/// Discrete network quality level, richest to weakest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Offline,
}

impl NetworkQuality {
    /// Position from best to worst; 0 is excellent
    pub const fn rank(self) -> u8 {
        match self {
            NetworkQuality::Excellent => 0,
            NetworkQuality::Good => 1,
            NetworkQuality::Fair => 2,
            NetworkQuality::Poor => 3,
            NetworkQuality::Offline => 4,
        }
    }

    /// Poor or offline
    pub fn is_degraded(self) -> bool {
        matches!(self, NetworkQuality::Poor | NetworkQuality::Offline)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NetworkQuality::Excellent => "excellent",
            NetworkQuality::Good => "good",
            NetworkQuality::Fair => "fair",
            NetworkQuality::Poor => "poor",
            NetworkQuality::Offline => "offline",
        }
    }
}

impl PartialOrd for NetworkQuality {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Better links compare greater: `Excellent > Good > Fair > Poor > Offline`
impl Ord for NetworkQuality {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.rank().cmp(&self.rank())
    }
}

impl fmt::Display for NetworkQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a feature changed strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    InitialSetup,
    NetworkQualityDegraded,
    NetworkQualityImproved,
    HighMemoryUsage,
    HighErrorRate,
    HighLatency,
    UserCountExceeded,
    ManualOverride,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransitionReason::InitialSetup => "initial_setup",
            TransitionReason::NetworkQualityDegraded => "network_quality_degraded",
            TransitionReason::NetworkQualityImproved => "network_quality_improved",
            TransitionReason::HighMemoryUsage => "high_memory_usage",
            TransitionReason::HighErrorRate => "high_error_rate",
            TransitionReason::HighLatency => "high_latency",
            TransitionReason::UserCountExceeded => "user_count_exceeded",
            TransitionReason::ManualOverride => "manual_override",
        };
        f.write_str(label)
    }
}

/// Completed record of one attempted strategy change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTransition {
    pub feature: String,
    pub from: RealtimeStrategy,
    pub to: RealtimeStrategy,
    pub reason: TransitionReason,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StrategyTransition {
    /// Wall-clock time spent applying the transition
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgrade_walks_the_ladder() {
        assert_eq!(RealtimeStrategy::WebSocket.downgrade(), RealtimeStrategy::Sse);
        assert_eq!(RealtimeStrategy::Sse.downgrade(), RealtimeStrategy::Polling);
        assert_eq!(RealtimeStrategy::Polling.downgrade(), RealtimeStrategy::None);
        assert_eq!(RealtimeStrategy::None.downgrade(), RealtimeStrategy::None);
    }

    #[test]
    fn test_downgrade_reaches_floor_in_three_steps() {
        for strategy in RealtimeStrategy::LADDER {
            let floor = strategy.downgrade().downgrade().downgrade();
            assert_eq!(floor, RealtimeStrategy::None, "from {}", strategy);
        }
    }

    #[test]
    fn test_ordering_richest_first() {
        assert!(RealtimeStrategy::WebSocket > RealtimeStrategy::Sse);
        assert!(RealtimeStrategy::Sse > RealtimeStrategy::Polling);
        assert!(RealtimeStrategy::Polling > RealtimeStrategy::None);
        assert!(!RealtimeStrategy::None.is_realtime());
    }

    #[test]
    fn test_strategy_parse_and_serde_names() {
        assert_eq!("SSE".parse::<RealtimeStrategy>().unwrap(), RealtimeStrategy::Sse);
        assert!("carrier-pigeon".parse::<RealtimeStrategy>().is_err());

        let json = serde_json::to_string(&RealtimeStrategy::WebSocket).unwrap();
        assert_eq!(json, "\"websocket\"");
        let reason = serde_json::to_string(&TransitionReason::NetworkQualityDegraded).unwrap();
        assert_eq!(reason, "\"network_quality_degraded\"");
        assert_eq!(
            TransitionReason::NetworkQualityDegraded.to_string(),
            "network_quality_degraded"
        );
    }

    #[test]
    fn test_quality_degraded_levels() {
        assert!(NetworkQuality::Poor.is_degraded());
        assert!(NetworkQuality::Offline.is_degraded());
        assert!(!NetworkQuality::Fair.is_degraded());
    }

    #[test]
    fn test_quality_ordering_best_first() {
        assert!(NetworkQuality::Excellent > NetworkQuality::Good);
        assert!(NetworkQuality::Good > NetworkQuality::Fair);
        assert!(NetworkQuality::Fair > NetworkQuality::Poor);
        assert!(NetworkQuality::Poor > NetworkQuality::Offline);

        let mut levels = vec![
            NetworkQuality::Poor,
            NetworkQuality::Excellent,
            NetworkQuality::Offline,
            NetworkQuality::Fair,
        ];
        levels.sort();
        assert_eq!(levels.first(), Some(&NetworkQuality::Offline));
        assert_eq!(levels.last(), Some(&NetworkQuality::Excellent));
    }

    #[test]
    fn test_transition_serializes_snake_case_fields() {
        let now = Utc::now();
        let transition = StrategyTransition {
            feature: "chat".to_string(),
            from: RealtimeStrategy::WebSocket,
            to: RealtimeStrategy::Sse,
            reason: TransitionReason::HighMemoryUsage,
            start_time: now,
            end_time: now,
            success: true,
            error: None,
        };

        let value = serde_json::to_value(&transition).unwrap();
        assert!(value.get("start_time").is_some());
        assert!(value.get("end_time").is_some());
        assert!(value.get("startTime").is_none());
        assert_eq!(value["reason"], "high_memory_usage");
        assert!(value.get("error").is_none());
    }
}
