//! Bluetooth functionality for health peripherals
//! This module handles scanning, the GATT connection lifecycle and
//! notification bookkeeping for the supported health-profile devices.

mod bluest_transport;
mod connection;
mod constants;
mod device;
mod events;
mod notification;
mod scanner;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use bluest_transport::{BluestTransport, DeviceRegistry};
pub use connection::ConnectionManager;
pub use constants::*; // Re-export all constants
pub use device::{extract_mac_address, DeviceIdentity, DiscoveredDevice, KnownDeviceStore};
pub use events::{ChannelCallback, ConnectionCallback, ConnectionEvent};
pub use notification::{ReplayReport, SubscriptionRegistry};
pub use scanner::{BluestScanBackend, DeviceScanner, ScanBackend, ScanEvent};
pub use transport::{GattSession, GattTransport, TransportEvent, TransportEvents};
pub use types::{
    CharacteristicProperties, ConnectionState, GattCharacteristic, GattService, GattStatus, ServiceTable,
    SubscriptionMode,
};
