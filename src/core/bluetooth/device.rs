//! Bluetooth device representation and related functionality

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use crate::core::bluetooth::constants::HEALTH_SERVICE_UUIDS;
use crate::utils::ensure_directory_exists;

const KNOWN_DEVICE_FILE_NAME: &str = "last_device.json";
const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Identity of a peripheral as handed to the connection manager
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Platform identifier used to open a session (MAC address on Android/Linux,
    /// an opaque id on macOS and Windows)
    pub address: String,
    /// Display name, `None` if the peripheral did not advertise one
    pub name: Option<String>,
}

impl DeviceIdentity {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self { address: address.into(), name }
    }

    pub fn is_valid(&self) -> bool {
        !self.address.trim().is_empty()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_DEVICE_NAME)
    }
}

/// Represents a discovered Bluetooth device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredDevice {
    pub identity: DeviceIdentity,
    /// The signal strength (RSSI) of the device
    pub rssi: Option<i16>,
    /// MAC address pulled out of the platform id, if it contains one
    pub mac: Option<String>,
    /// Advertised service UUIDs
    pub services: Vec<Uuid>,
}

impl DiscoveredDevice {
    pub fn new(identity: DeviceIdentity, rssi: Option<i16>, services: Vec<Uuid>) -> Self {
        let mac = extract_mac_address(&identity.address);
        Self { identity, rssi, mac, services }
    }

    /// Returns true if the device advertises one of the supported health services
    pub fn is_health_device(&self) -> bool {
        self.services.iter().any(|uuid| HEALTH_SERVICE_UUIDS.contains(uuid))
    }
}

/// Extracts the last MAC-looking substring of a platform device id
pub fn extract_mac_address(device_id: &str) -> Option<String> {
    static MAC_RE: OnceLock<Regex> = OnceLock::new();
    let re = MAC_RE.get_or_init(|| {
        Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").expect("valid MAC pattern")
    });
    re.find_iter(device_id).last().map(|m| m.as_str().to_uppercase())
}

/// Remembers the last connected device between runs
pub struct KnownDeviceStore {
    file_path: PathBuf,
}

impl KnownDeviceStore {
    pub fn new(config_dir: &Path) -> Self {
        Self { file_path: config_dir.join(KNOWN_DEVICE_FILE_NAME) }
    }

    /// Saves the device as the last connected one.
    pub async fn remember(&self, device: &DeviceIdentity) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            ensure_directory_exists(parent).await?;
        }
        let remembered = DeviceIdentity {
            address: device.address.clone(),
            name: Some(device.display_name().to_string()),
        };
        let json = serde_json::to_string_pretty(&remembered)?;
        fs::write(&self.file_path, json).await?;
        info!("Remembered device {} ({})", remembered.display_name(), remembered.address);
        Ok(())
    }

    /// Returns the last connected device, if one was saved.
    pub async fn last_connected(&self) -> Result<Option<DeviceIdentity>> {
        if !self.file_path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&self.file_path).await?;
        match serde_json::from_str::<DeviceIdentity>(&json) {
            Ok(device) if device.is_valid() => Ok(Some(device)),
            Ok(_) => Ok(None),
            Err(e) => {
                warn!("Ignoring unreadable known-device file {:?}: {}", self.file_path, e);
                Ok(None)
            }
        }
    }
}
