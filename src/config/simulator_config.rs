use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::SIMULATION_INTERVAL_MS;

/// Settings of the simulated health peripheral
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Time between two frames of one subscribed characteristic.
    pub interval_ms: u64,
    /// Fake link-up latency.
    pub connect_delay_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            interval_ms: SIMULATION_INTERVAL_MS,
            connect_delay_ms: 500,
        }
    }
}

impl SimulatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }
}
