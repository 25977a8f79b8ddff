//! HealthEdge BLE library
//! Connection management and health-profile decoding for Bluetooth Low Energy
//! medical peripherals.

// Module declarations
pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod utils;
