//! Connection Telemetry
//!
//! Optional platform-provided view of the current link. The monitor merges it
//! opportunistically and classifies without it when absent.

use serde::{Deserialize, Serialize};

use super::ConnectionClass;

/// One reading from the platform
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub rtt_ms: Option<f64>,
    pub downlink_mbps: Option<f64>,
    pub effective_type: Option<ConnectionClass>,
}

pub trait ConnectionTelemetry: Send + Sync {
    /// Whether the platform exposes telemetry at all
    fn available(&self) -> bool;

    fn read(&self) -> Option<TelemetrySample>;

    /// Whether the host is attached to any network
    fn is_online(&self) -> bool {
        true
    }
}

/// Telemetry fixed at construction. Useful for hosts that learn link
/// characteristics from configuration, and for tests.
#[derive(Debug, Clone)]
pub struct StaticTelemetry {
    sample: TelemetrySample,
    online: bool,
}

impl StaticTelemetry {
    pub fn new(sample: TelemetrySample) -> Self {
        Self {
            sample,
            online: true,
        }
    }

    pub fn offline() -> Self {
        Self {
            sample: TelemetrySample::default(),
            online: false,
        }
    }
}

impl ConnectionTelemetry for StaticTelemetry {
    fn available(&self) -> bool {
        true
    }

    fn read(&self) -> Option<TelemetrySample> {
        Some(self.sample.clone())
    }

    fn is_online(&self) -> bool {
        self.online
    }
}
