pub mod connection_config;
pub mod scan_config;
pub mod simulator_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::utils::ensure_directory_exists;

pub use connection_config::ConnectionConfig;
pub use scan_config::ScanConfig;
pub use simulator_config::SimulatorConfig;

const CONFIG_FILE_NAME: &str = "ble_config.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    pub connection: ConnectionConfig,
    pub scan: ScanConfig,
    pub simulator: SimulatorConfig,
}

impl BleConfig {
    /// Loads the config from `config_dir`, falling back to defaults when no file exists.
    pub async fn load_config(config_dir: &Path) -> Result<Self> {
        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let file_path_str = file_path.to_string_lossy().into_owned();

        if !file_path.exists() {
            warn!("BLE config file not found at {:?}, using default.", file_path_str);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(&file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("BLE config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the current config into `config_dir`.
    pub async fn save_config(&self, config_dir: &Path) -> Result<()> {
        ensure_directory_exists(config_dir).await?;

        let file_path = config_dir.join(CONFIG_FILE_NAME);
        let file_path_str = file_path.to_string_lossy().into_owned();

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize BLE config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(&file_path, config_json).await?;
        info!("BLE config saved to {:?}", file_path_str);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "healthedge-config-{}-{}-{}",
            tag,
            std::process::id(),
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ))
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = scratch_dir("missing");
        let config = BleConfig::load_config(&dir).await.unwrap();
        assert_eq!(config, BleConfig::default());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = scratch_dir("save");
        let mut config = BleConfig::default();
        config.connection.max_reconnect_attempts = 5;
        config.scan.min_rssi = -70;
        config.save_config(&dir).await.unwrap();

        let loaded = BleConfig::load_config(&dir).await.unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = scratch_dir("partial");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(CONFIG_FILE_NAME), r#"{ "connection": { "connect_timeout_ms": 5000 } }"#).unwrap();

        let loaded = BleConfig::load_config(&dir).await.unwrap();
        assert_eq!(loaded.connection.connect_timeout_ms, 5000);
        assert_eq!(loaded.connection.reconnect_base_delay_ms, 1000);
        assert_eq!(loaded.scan, ScanConfig::default());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
