//! Network Quality Monitoring
//!
//! Samples latency and loss against a health-check endpoint, merges optional
//! platform telemetry, and classifies the link into a [`NetworkQuality`].
//!
//! Classification rules, first match wins:
//!
//! | Condition                                         | Quality     |
//! |---------------------------------------------------|-------------|
//! | not connected                                     | `offline`   |
//! | packet loss > 10%                                 | `poor`      |
//! | `4g`, rtt < 100 ms, downlink > 10 Mbps            | `excellent` |
//! | `4g`, rtt < 200 ms, downlink > 5 Mbps             | `good`      |
//! | `4g` or `3g`, rtt < 400 ms                        | `fair`      |
//! | anything else                                     | `poor`      |

pub mod monitor;
pub mod probe;
pub mod telemetry;

pub use monitor::NetworkMonitor;
pub use probe::{HealthProbe, HttpHealthProbe};
pub use telemetry::{ConnectionTelemetry, StaticTelemetry, TelemetrySample};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strategy::NetworkQuality;

/// Round-trip time recorded when a probe fails or times out
pub const LATENCY_SENTINEL_MS: f64 = 999_999.0;

/// Loss ratio above which the link is poor regardless of speed
pub const POOR_PACKET_LOSS_PERCENT: f64 = 10.0;

/// Downlink assumed until telemetry reports otherwise
pub const DEFAULT_DOWNLINK_MBPS: f64 = 10.0;

/// Effective connection generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionClass {
    #[default]
    #[serde(rename = "4g")]
    FourG,
    #[serde(rename = "3g")]
    ThreeG,
    #[serde(rename = "2g")]
    TwoG,
    #[serde(rename = "slow-2g")]
    Slow2G,
}

impl ConnectionClass {
    pub fn is_top_tier(self) -> bool {
        self == ConnectionClass::FourG
    }

    pub fn is_mid_or_top_tier(self) -> bool {
        matches!(self, ConnectionClass::FourG | ConnectionClass::ThreeG)
    }
}

/// Latest raw measurements. Written only by the network monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub online: bool,
    pub rtt_ms: f64,
    pub downlink_mbps: f64,
    pub packet_loss: f64,
    pub connection_type: ConnectionClass,
    pub timestamp: DateTime<Utc>,
}

impl Default for NetworkMetrics {
    fn default() -> Self {
        Self {
            online: true,
            rtt_ms: 0.0,
            downlink_mbps: DEFAULT_DOWNLINK_MBPS,
            packet_loss: 0.0,
            connection_type: ConnectionClass::FourG,
            timestamp: Utc::now(),
        }
    }
}

impl NetworkMetrics {
    /// Overlay whatever the platform reported
    pub fn merge_telemetry(&mut self, sample: &TelemetrySample) {
        if let Some(rtt) = sample.rtt_ms {
            self.rtt_ms = rtt;
        }
        if let Some(downlink) = sample.downlink_mbps {
            self.downlink_mbps = downlink;
        }
        if let Some(class) = sample.effective_type {
            self.connection_type = class;
        }
    }
}

/// Pure classification of a metrics snapshot
pub fn classify(metrics: &NetworkMetrics) -> NetworkQuality {
    let class = metrics.connection_type;

    if !metrics.online {
        NetworkQuality::Offline
    } else if metrics.packet_loss > POOR_PACKET_LOSS_PERCENT {
        NetworkQuality::Poor
    } else if class.is_top_tier() && metrics.rtt_ms < 100.0 && metrics.downlink_mbps > 10.0 {
        NetworkQuality::Excellent
    } else if class.is_top_tier() && metrics.rtt_ms < 200.0 && metrics.downlink_mbps > 5.0 {
        NetworkQuality::Good
    } else if class.is_mid_or_top_tier() && metrics.rtt_ms < 400.0 {
        NetworkQuality::Fair
    } else {
        NetworkQuality::Poor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(rtt_ms: f64, downlink_mbps: f64, class: ConnectionClass) -> NetworkMetrics {
        NetworkMetrics {
            rtt_ms,
            downlink_mbps,
            connection_type: class,
            ..NetworkMetrics::default()
        }
    }

    #[test]
    fn test_classification_ladder() {
        assert_eq!(classify(&metrics(50.0, 20.0, ConnectionClass::FourG)), NetworkQuality::Excellent);
        assert_eq!(classify(&metrics(150.0, 8.0, ConnectionClass::FourG)), NetworkQuality::Good);
        assert_eq!(classify(&metrics(300.0, 1.0, ConnectionClass::ThreeG)), NetworkQuality::Fair);
        assert_eq!(classify(&metrics(300.0, 1.0, ConnectionClass::TwoG)), NetworkQuality::Poor);
        assert_eq!(classify(&metrics(500.0, 50.0, ConnectionClass::FourG)), NetworkQuality::Poor);
    }

    #[test]
    fn test_exact_boundaries_fall_through() {
        // rtt must be strictly below and downlink strictly above
        assert_eq!(classify(&metrics(100.0, 20.0, ConnectionClass::FourG)), NetworkQuality::Good);
        assert_eq!(classify(&metrics(50.0, 10.0, ConnectionClass::FourG)), NetworkQuality::Good);
        assert_eq!(classify(&metrics(400.0, 20.0, ConnectionClass::ThreeG)), NetworkQuality::Poor);
    }

    #[test]
    fn test_offline_wins_over_everything() {
        let mut snapshot = metrics(10.0, 100.0, ConnectionClass::FourG);
        snapshot.online = false;
        assert_eq!(classify(&snapshot), NetworkQuality::Offline);
    }

    #[test]
    fn test_packet_loss_overrides_fast_link() {
        let mut snapshot = metrics(10.0, 100.0, ConnectionClass::FourG);
        snapshot.packet_loss = 80.0;
        assert_eq!(classify(&snapshot), NetworkQuality::Poor);

        snapshot.packet_loss = 10.0;
        assert_eq!(classify(&snapshot), NetworkQuality::Excellent);
    }

    #[test]
    fn test_merge_telemetry_keeps_missing_fields() {
        let mut snapshot = metrics(120.0, DEFAULT_DOWNLINK_MBPS, ConnectionClass::FourG);
        snapshot.merge_telemetry(&TelemetrySample {
            rtt_ms: None,
            downlink_mbps: Some(1.5),
            effective_type: Some(ConnectionClass::ThreeG),
        });
        assert_eq!(snapshot.rtt_ms, 120.0);
        assert_eq!(snapshot.downlink_mbps, 1.5);
        assert_eq!(snapshot.connection_type, ConnectionClass::ThreeG);
    }

    #[test]
    fn test_connection_class_serde_labels() {
        let json = serde_json::to_string(&ConnectionClass::Slow2G).unwrap();
        assert_eq!(json, "\"slow-2g\"");
        let parsed: ConnectionClass = serde_json::from_str("\"3g\"").unwrap();
        assert_eq!(parsed, ConnectionClass::ThreeG);
    }
}
