//! Core functionality of the health device layer
//! Bluetooth connection management, health-profile decoding and a simulated
//! peripheral for running without hardware.

pub mod bluetooth;
pub mod health_data;
pub mod simulator;

// Re-export commonly used types
pub use bluetooth::ConnectionManager;
pub use health_data::{HealthDataType, VitalSign};
pub use simulator::{HealthDataSimulator, SimulatedTransport};
