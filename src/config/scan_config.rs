use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::{DEFAULT_SCAN_PERIOD_MS, MIN_RSSI_THRESHOLD};

/// Device discovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// A scan stops by itself after this long.
    pub scan_period_ms: u64,
    /// Devices with a weaker signal are ignored.
    pub min_rssi: i16,
    /// Only report devices advertising one of the health services.
    pub health_devices_only: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            scan_period_ms: DEFAULT_SCAN_PERIOD_MS,
            min_rssi: MIN_RSSI_THRESHOLD,
            health_devices_only: true,
        }
    }
}

impl ScanConfig {
    pub fn scan_period(&self) -> Duration {
        Duration::from_millis(self.scan_period_ms)
    }
}
