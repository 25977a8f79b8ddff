//! Simulated health peripheral
//! Produces measurement frames in the standard characteristic layouts and serves
//! them through a [`GattTransport`], so the full pipeline runs without hardware.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SimulatorConfig;
use crate::core::bluetooth::{
    CharacteristicProperties, DeviceIdentity, GattCharacteristic, GattService, GattSession, GattStatus,
    GattTransport, ServiceTable, TransportEvent, TransportEvents, DISABLE_NOTIFICATION_VALUE,
    HEALTH_MEASUREMENTS, UUID_CLIENT_CHARACTERISTIC_CONFIG,
};
use crate::core::health_data::{encode_sfloat, identify_data_type, HealthDataType, SFLOAT_MANTISSA_MAX};
use crate::error::TransportError;

pub const SIMULATED_DEVICE_ADDRESS: &str = "00:11:22:33:44:55";
pub const SIMULATED_DEVICE_NAME: &str = "HealthEdge Simulator";

/// Heart Rate Measurement with a UINT8 value
pub fn heart_rate_payload(bpm: u8) -> Vec<u8> {
    vec![0x00, bpm]
}

/// Blood Pressure Measurement in mmHg without timestamp. The diastolic value is
/// capped 20 below systolic and the mean arterial pressure is derived. Values
/// above the SFLOAT mantissa range are clamped.
pub fn blood_pressure_payload(systolic: u16, diastolic: u16) -> Vec<u8> {
    let systolic = clamp_mantissa(systolic);
    let diastolic = diastolic.min(systolic.saturating_sub(20));
    let mean_arterial = ((2 * u32::from(diastolic) + u32::from(systolic)) / 3) as u16;

    let mut data = Vec::with_capacity(7);
    data.push(0x00);
    for value in [systolic, diastolic, mean_arterial] {
        data.extend_from_slice(&encode_sfloat(value as i16, 0).to_le_bytes());
    }
    data
}

fn clamp_mantissa(value: u16) -> u16 {
    value.min(SFLOAT_MANTISSA_MAX as u16)
}

/// Temperature Measurement in Celsius, value in hundredths of a degree
pub fn temperature_payload(hundredths: i32) -> Vec<u8> {
    let mut data = Vec::with_capacity(5);
    data.push(0x00);
    data.extend_from_slice(&hundredths.to_le_bytes());
    data
}

/// Glucose Measurement with a zeroed sequence number and base time
pub fn glucose_payload(mg_dl: u16) -> Vec<u8> {
    let mut data = vec![0u8; 10];
    data[8..10].copy_from_slice(&encode_sfloat(clamp_mantissa(mg_dl) as i16, 0).to_le_bytes());
    data
}

pub fn spo2_payload(percent: u8, pulse: u8) -> Vec<u8> {
    vec![0x00, percent, pulse, 0x00, 0x00]
}

/// Draws measurements from normal adult ranges
pub struct HealthDataSimulator {
    rng: StdRng,
}

impl Default for HealthDataSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthDataSimulator {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Deterministic sequence, for tests
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// A fresh frame of `kind`, `None` for [`HealthDataType::Unknown`].
    pub fn frame(&mut self, kind: HealthDataType) -> Option<Vec<u8>> {
        let frame = match kind {
            HealthDataType::HeartRate => {
                let bpm = self.rng.gen_range(60..90);
                debug!("Simulating heart rate: {} bpm", bpm);
                heart_rate_payload(bpm)
            }
            HealthDataType::BloodPressure => {
                let systolic = self.rng.gen_range(110..140);
                let diastolic = self.rng.gen_range(70..85);
                debug!("Simulating blood pressure: {}/{} mmHg", systolic, diastolic);
                blood_pressure_payload(systolic, diastolic)
            }
            HealthDataType::Temperature => {
                let hundredths = self.rng.gen_range(3650..3750);
                debug!("Simulating temperature: {:.2} °C", hundredths as f32 / 100.0);
                temperature_payload(hundredths)
            }
            HealthDataType::Glucose => {
                let mg_dl = self.rng.gen_range(80..120);
                debug!("Simulating glucose: {} mg/dL", mg_dl);
                glucose_payload(mg_dl)
            }
            HealthDataType::SpO2 => {
                let percent = self.rng.gen_range(95..100);
                let pulse = self.rng.gen_range(60..90);
                debug!("Simulating SpO2: {}%, Pulse: {} bpm", percent, pulse);
                spo2_payload(percent, pulse)
            }
            HealthDataType::Unknown => return None,
        };
        Some(frame)
    }

    /// A frame for a randomly picked health characteristic
    pub fn random_measurement(&mut self) -> (Uuid, Uuid, Vec<u8>) {
        let (service, characteristic) = HEALTH_MEASUREMENTS[self.rng.gen_range(0..HEALTH_MEASUREMENTS.len())];
        let kind = identify_data_type(service, characteristic);
        let frame = self.frame(kind).unwrap_or_default();
        (service, characteristic, frame)
    }
}

/// GATT layout of the simulated peripheral
pub fn simulated_service_table() -> ServiceTable {
    let services = HEALTH_MEASUREMENTS
        .iter()
        .map(|&(service, characteristic)| {
            // blood pressure and temperature are indicated per their profiles
            let properties = match identify_data_type(service, characteristic) {
                HealthDataType::BloodPressure | HealthDataType::Temperature => {
                    CharacteristicProperties::indicate()
                }
                _ => CharacteristicProperties { read: true, ..CharacteristicProperties::notify() },
            };
            GattService::new(
                service,
                vec![GattCharacteristic::new(
                    characteristic,
                    properties,
                    vec![UUID_CLIENT_CHARACTERISTIC_CONFIG],
                )],
            )
        })
        .collect();
    ServiceTable::new(services)
}

/// Transport serving the simulated peripheral under any address
pub struct SimulatedTransport {
    config: SimulatorConfig,
    runtime: Handle,
    current: Mutex<Weak<SimulatedSession>>,
}

impl SimulatedTransport {
    pub fn new(config: SimulatorConfig) -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        Ok(Self { config, runtime, current: Mutex::new(Weak::new()) })
    }

    pub fn device() -> DeviceIdentity {
        DeviceIdentity::new(SIMULATED_DEVICE_ADDRESS, Some(SIMULATED_DEVICE_NAME.to_string()))
    }

    /// Drops the link of the open session as if the peripheral walked out of
    /// range. Returns false when no session is open.
    pub fn drop_link(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner).upgrade();
        match current {
            Some(session) if !session.cancel.is_cancelled() => {
                info!("Simulating link loss");
                session.stop_streams();
                session.events.send(TransportEvent::Disconnected);
                true
            }
            _ => false,
        }
    }
}

impl GattTransport for SimulatedTransport {
    fn open_session(
        &self,
        device: &DeviceIdentity,
        events: TransportEvents,
    ) -> Result<Arc<dyn GattSession>, TransportError> {
        info!("Opening simulated session to {}", device.address);
        let session = Arc::new(SimulatedSession {
            identity: device.clone(),
            events,
            config: self.config.clone(),
            runtime: self.runtime.clone(),
            cancel: CancellationToken::new(),
            services: simulated_service_table(),
            streams: Mutex::new(HashMap::new()),
        });

        let events = session.events.clone();
        let cancel = session.cancel.clone();
        let delay = self.config.connect_delay();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => events.send(TransportEvent::Connected),
            }
        });

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(&session);
        Ok(session)
    }
}

struct SimulatedSession {
    identity: DeviceIdentity,
    events: TransportEvents,
    config: SimulatorConfig,
    runtime: Handle,
    cancel: CancellationToken,
    services: ServiceTable,
    streams: Mutex<HashMap<(Uuid, Uuid), CancellationToken>>,
}

impl SimulatedSession {
    fn stop_streams(&self) {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, token) in streams.drain() {
            token.cancel();
        }
    }

    fn stop_stream(&self, key: (Uuid, Uuid)) {
        if let Some(token) = self.streams.lock().unwrap_or_else(PoisonError::into_inner).remove(&key) {
            token.cancel();
        }
    }

    /// Sends one frame right away and then one per interval until cancelled.
    fn start_stream(&self, service: Uuid, characteristic: Uuid) {
        self.stop_stream((service, characteristic));
        let token = self.cancel.child_token();
        self.streams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((service, characteristic), token.clone());

        let events = self.events.clone();
        let interval = self.config.interval();
        let kind = identify_data_type(service, characteristic);
        self.runtime.spawn(async move {
            let mut simulator = HealthDataSimulator::new();
            loop {
                if let Some(value) = simulator.frame(kind) {
                    events.send(TransportEvent::CharacteristicChanged { service, characteristic, value });
                }
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });
    }
}

impl GattSession for SimulatedSession {
    fn device(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn discover_services(&self) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::SessionClosed);
        }
        self.events.send(TransportEvent::ServicesDiscovered {
            status: GattStatus::SUCCESS,
            services: self.services.clone(),
        });
        Ok(())
    }

    fn set_notification(&self, service: Uuid, characteristic: Uuid, enabled: bool) -> bool {
        if self.services.characteristic(service, characteristic).is_none() {
            return false;
        }
        if !enabled {
            self.stop_stream((service, characteristic));
        }
        true
    }

    fn write_descriptor(&self, service: Uuid, characteristic: Uuid, descriptor: Uuid, value: &[u8]) -> bool {
        if descriptor != UUID_CLIENT_CHARACTERISTIC_CONFIG
            || self.services.characteristic(service, characteristic).is_none()
        {
            return false;
        }

        if value == DISABLE_NOTIFICATION_VALUE {
            self.stop_stream((service, characteristic));
        } else {
            self.start_stream(service, characteristic);
        }
        self.events.send(TransportEvent::DescriptorWritten {
            service,
            characteristic,
            descriptor,
            status: GattStatus::SUCCESS,
        });
        true
    }

    fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        let readable = self
            .services
            .characteristic(service, characteristic)
            .is_some_and(|c| c.properties.read);
        if !readable {
            return false;
        }
        let value = HealthDataSimulator::new()
            .frame(identify_data_type(service, characteristic))
            .unwrap_or_default();
        self.events.send(TransportEvent::CharacteristicRead {
            service,
            characteristic,
            status: GattStatus::SUCCESS,
            value,
        });
        true
    }

    fn disconnect(&self) {
        self.stop_streams();
        self.events.send(TransportEvent::Disconnected);
    }

    fn close(&self) {
        self.cancel.cancel();
        self.stop_streams();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::*;
    use crate::core::health_data::*;

    #[test]
    fn blood_pressure_caps_diastolic() {
        let data = blood_pressure_payload(115, 100);
        assert_eq!(data.len(), 7);
        assert_eq!(parse_blood_pressure(&data), Some((115.0, 95.0)));
        // mean arterial pressure: (2 * 95 + 115) / 3
        assert_eq!(u16::from_le_bytes([data[5], data[6]]), 101);
    }

    #[test]
    fn oversized_values_are_clamped_to_sfloat_range() {
        let data = blood_pressure_payload(u16::MAX, u16::MAX);
        assert_eq!(parse_blood_pressure(&data), Some((2047.0, 2027.0)));
        // mean arterial pressure: (2 * 2027 + 2047) / 3
        assert_eq!(u16::from_le_bytes([data[5], data[6]]), 2033);

        assert_eq!(parse_glucose(&glucose_payload(5000)), Some(2047.0));
    }

    #[test]
    fn payloads_follow_standard_layouts() {
        assert_eq!(parse_heart_rate(&heart_rate_payload(72)), Some(72));
        assert_eq!(parse_temperature(&temperature_payload(3712)), Some(37.12));
        assert_eq!(parse_glucose(&glucose_payload(98)), Some(98.0));
        assert_eq!(parse_spo2(&spo2_payload(97, 64)), Some((97.0, 64)));
    }

    #[test]
    fn sampled_values_stay_in_range() {
        let mut simulator = HealthDataSimulator::with_seed(7);
        for _ in 0..200 {
            let hr = parse_heart_rate(&simulator.frame(HealthDataType::HeartRate).unwrap()).unwrap();
            assert!((60..90).contains(&hr));

            let (sys, dia) = parse_blood_pressure(&simulator.frame(HealthDataType::BloodPressure).unwrap()).unwrap();
            assert!((110.0..140.0).contains(&sys));
            assert!(dia >= 70.0 && dia <= sys - 20.0);

            let temp = parse_temperature(&simulator.frame(HealthDataType::Temperature).unwrap()).unwrap();
            assert!((36.5..37.5).contains(&temp));

            let glucose = parse_glucose(&simulator.frame(HealthDataType::Glucose).unwrap()).unwrap();
            assert!((80.0..120.0).contains(&glucose));

            let (spo2, pulse) = parse_spo2(&simulator.frame(HealthDataType::SpO2).unwrap()).unwrap();
            assert!((95.0..100.0).contains(&spo2));
            assert!((60..90).contains(&pulse));
        }
        assert_eq!(simulator.frame(HealthDataType::Unknown), None);
    }

    #[test]
    fn random_measurement_is_decodable() {
        let mut simulator = HealthDataSimulator::with_seed(42);
        for _ in 0..20 {
            let (service, characteristic, data) = simulator.random_measurement();
            assert!(VitalSign::decode(service, characteristic, &data).is_some());
        }
    }

    #[test]
    fn service_table_prefers_indications_for_bp_and_temperature() {
        let table = simulated_service_table();
        let bp = table
            .characteristic(UUID_BLOOD_PRESSURE_SERVICE, UUID_BLOOD_PRESSURE_MEASUREMENT)
            .unwrap();
        assert!(bp.properties.indicate);
        let hr = table
            .characteristic(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT)
            .unwrap();
        assert!(hr.properties.notify && hr.has_descriptor(UUID_CLIENT_CHARACTERISTIC_CONFIG));
    }
}
