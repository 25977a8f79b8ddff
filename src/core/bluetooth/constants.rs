//! Constants used throughout the BLE layer
//! This module contains the standard Bluetooth SIG health-profile UUIDs,
//! descriptor values and the default timing values of the connection manager.

use uuid::Uuid;

/// Standard Bluetooth Health Service UUIDs
pub const UUID_HEART_RATE_SERVICE: Uuid = Uuid::from_u128(0x0000180d_0000_1000_8000_00805f9b34fb);
pub const UUID_BLOOD_PRESSURE_SERVICE: Uuid = Uuid::from_u128(0x00001810_0000_1000_8000_00805f9b34fb);
pub const UUID_HEALTH_THERMOMETER_SERVICE: Uuid = Uuid::from_u128(0x00001809_0000_1000_8000_00805f9b34fb);
pub const UUID_GLUCOSE_SERVICE: Uuid = Uuid::from_u128(0x00001808_0000_1000_8000_00805f9b34fb);
pub const UUID_PULSE_OXIMETER_SERVICE: Uuid = Uuid::from_u128(0x00001822_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Health Measurement Characteristic UUIDs
pub const UUID_HEART_RATE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a37_0000_1000_8000_00805f9b34fb);
pub const UUID_BLOOD_PRESSURE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a35_0000_1000_8000_00805f9b34fb);
pub const UUID_TEMPERATURE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a1c_0000_1000_8000_00805f9b34fb);
pub const UUID_GLUCOSE_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a18_0000_1000_8000_00805f9b34fb);
pub const UUID_PLX_CONTINUOUS_MEASUREMENT: Uuid = Uuid::from_u128(0x00002a5e_0000_1000_8000_00805f9b34fb);

/// Client Characteristic Configuration Descriptor
pub const UUID_CLIENT_CHARACTERISTIC_CONFIG: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Service UUIDs the scanner filters on
pub const HEALTH_SERVICE_UUIDS: [Uuid; 5] = [
    UUID_HEART_RATE_SERVICE,
    UUID_BLOOD_PRESSURE_SERVICE,
    UUID_HEALTH_THERMOMETER_SERVICE,
    UUID_GLUCOSE_SERVICE,
    UUID_PULSE_OXIMETER_SERVICE,
];

/// (service, measurement characteristic) pairs of the five supported health profiles
pub const HEALTH_MEASUREMENTS: [(Uuid, Uuid); 5] = [
    (UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT),
    (UUID_BLOOD_PRESSURE_SERVICE, UUID_BLOOD_PRESSURE_MEASUREMENT),
    (UUID_HEALTH_THERMOMETER_SERVICE, UUID_TEMPERATURE_MEASUREMENT),
    (UUID_GLUCOSE_SERVICE, UUID_GLUCOSE_MEASUREMENT),
    (UUID_PULSE_OXIMETER_SERVICE, UUID_PLX_CONTINUOUS_MEASUREMENT),
];

/// CCCD values
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
pub const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// Maximum number of automatic reconnection attempts after an unexpected drop
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Base delay of the reconnection backoff in milliseconds
pub const BASE_RECONNECT_DELAY_MS: u64 = 1000;

/// Timeout for a single connection attempt in milliseconds
pub const CONNECTION_TIMEOUT_MS: u64 = 10_000;

/// Settle delay between link-up and service discovery in milliseconds
pub const SERVICE_DISCOVERY_DELAY_MS: u64 = 600;

/// Scan duration in milliseconds
pub const DEFAULT_SCAN_PERIOD_MS: u64 = 10_000;

/// Devices weaker than this are dropped from scan results
pub const MIN_RSSI_THRESHOLD: i16 = -100;

/// Interval between simulated measurement frames in milliseconds
pub const SIMULATION_INTERVAL_MS: u64 = 3000;
