use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::{
    BASE_RECONNECT_DELAY_MS, CONNECTION_TIMEOUT_MS, MAX_RECONNECT_ATTEMPTS, SERVICE_DISCOVERY_DELAY_MS,
};

/// Timing and retry policy of the connection manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long a single connection attempt may stay in CONNECTING.
    pub connect_timeout_ms: u64,
    /// Backoff base. Attempt `n` waits `base * 2^(n-1)`.
    pub reconnect_base_delay_ms: u64,
    /// Automatic reconnection attempts after an unexpected drop.
    pub max_reconnect_attempts: u32,
    /// Settle time between link-up and service discovery.
    pub service_discovery_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            connect_timeout_ms: CONNECTION_TIMEOUT_MS,
            reconnect_base_delay_ms: BASE_RECONNECT_DELAY_MS,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            service_discovery_delay_ms: SERVICE_DISCOVERY_DELAY_MS,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn service_discovery_delay(&self) -> Duration {
        Duration::from_millis(self.service_discovery_delay_ms)
    }

    /// Backoff delay before reconnection attempt `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.reconnect_base_delay_ms.saturating_mul(1u64 << shift))
    }
}
