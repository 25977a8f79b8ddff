//! Health measurement decoding
//! Pure decoders for the Bluetooth SIG health-profile characteristics. Every
//! decoder returns `None` on a payload too short for its layout.

use serde::Serialize;
use uuid::Uuid;

use crate::core::bluetooth::*;

/// Logical kind of a characteristic payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthDataType {
    HeartRate,
    BloodPressure,
    Temperature,
    Glucose,
    #[serde(rename = "SPO2")]
    SpO2,
    Unknown,
}

/// Maps a (service, characteristic) pair to the measurement it carries.
pub fn identify_data_type(service: Uuid, characteristic: Uuid) -> HealthDataType {
    match (service, characteristic) {
        (UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT) => HealthDataType::HeartRate,
        (UUID_BLOOD_PRESSURE_SERVICE, UUID_BLOOD_PRESSURE_MEASUREMENT) => HealthDataType::BloodPressure,
        (UUID_HEALTH_THERMOMETER_SERVICE, UUID_TEMPERATURE_MEASUREMENT) => HealthDataType::Temperature,
        (UUID_GLUCOSE_SERVICE, UUID_GLUCOSE_MEASUREMENT) => HealthDataType::Glucose,
        (UUID_PULSE_OXIMETER_SERVICE, UUID_PLX_CONTINUOUS_MEASUREMENT) => HealthDataType::SpO2,
        _ => HealthDataType::Unknown,
    }
}

/// A decoded measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VitalSign {
    HeartRate { bpm: u16 },
    BloodPressure { systolic: f32, diastolic: f32 },
    Temperature { celsius: f32 },
    Glucose { mg_dl: f32 },
    #[serde(rename = "spo2")]
    SpO2 { percent: f32, pulse: u8 },
}

impl VitalSign {
    /// Classifies the payload by its origin and decodes it.
    pub fn decode(service: Uuid, characteristic: Uuid, data: &[u8]) -> Option<Self> {
        match identify_data_type(service, characteristic) {
            HealthDataType::HeartRate => parse_heart_rate(data).map(|bpm| VitalSign::HeartRate { bpm }),
            HealthDataType::BloodPressure => parse_blood_pressure(data)
                .map(|(systolic, diastolic)| VitalSign::BloodPressure { systolic, diastolic }),
            HealthDataType::Temperature => parse_temperature(data).map(|celsius| VitalSign::Temperature { celsius }),
            HealthDataType::Glucose => parse_glucose(data).map(|mg_dl| VitalSign::Glucose { mg_dl }),
            HealthDataType::SpO2 => parse_spo2(data).map(|(percent, pulse)| VitalSign::SpO2 { percent, pulse }),
            HealthDataType::Unknown => None,
        }
    }

    pub fn data_type(&self) -> HealthDataType {
        match self {
            VitalSign::HeartRate { .. } => HealthDataType::HeartRate,
            VitalSign::BloodPressure { .. } => HealthDataType::BloodPressure,
            VitalSign::Temperature { .. } => HealthDataType::Temperature,
            VitalSign::Glucose { .. } => HealthDataType::Glucose,
            VitalSign::SpO2 { .. } => HealthDataType::SpO2,
        }
    }
}

fn read_u16_le(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Heart Rate Measurement. Bit 0 of the flags selects a UINT8 or UINT16 value.
pub fn parse_heart_rate(data: &[u8]) -> Option<u16> {
    let flags = *data.first()?;
    if flags & 0x01 == 0 {
        data.get(1).map(|&bpm| u16::from(bpm))
    } else {
        read_u16_le(data, 1)
    }
}

/// Blood Pressure Measurement, returns (systolic, diastolic) in mmHg.
pub fn parse_blood_pressure(data: &[u8]) -> Option<(f32, f32)> {
    if data.len() < 7 {
        return None;
    }
    let systolic = sfloat_to_f32(read_u16_le(data, 1)?);
    let diastolic = sfloat_to_f32(read_u16_le(data, 3)?);
    Some((systolic, diastolic))
}

/// Temperature Measurement stored as a signed integer in hundredths of a degree.
pub fn parse_temperature(data: &[u8]) -> Option<f32> {
    let bytes = data.get(1..5)?;
    let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Some(raw as f32 / 100.0)
}

/// Glucose Measurement concentration, SFLOAT at bytes 8..10.
pub fn parse_glucose(data: &[u8]) -> Option<f32> {
    if data.len() < 10 {
        return None;
    }
    read_u16_le(data, 8).map(sfloat_to_f32)
}

/// Pulse oximeter reading, returns (SpO2 percent, pulse bpm).
/// Percentages above 100 are clamped.
pub fn parse_spo2(data: &[u8]) -> Option<(f32, u8)> {
    if data.len() < 5 {
        return None;
    }
    let percent = data[1].min(100);
    Some((f32::from(percent), data[2]))
}

/// Decodes an IEEE-11073 16-bit SFLOAT.
///
/// The high nibble is a signed base-10 exponent, the low 12 bits a two's
/// complement mantissa.
pub fn sfloat_to_f32(raw: u16) -> f32 {
    let mut mantissa = i32::from(raw & 0x0FFF);
    if mantissa & 0x0800 != 0 {
        mantissa -= 0x1000;
    }
    let mut exponent = i32::from(raw >> 12);
    if exponent & 0x08 != 0 {
        exponent -= 0x10;
    }
    mantissa as f32 * 10f32.powi(exponent)
}

/// Largest positive SFLOAT mantissa
pub const SFLOAT_MANTISSA_MAX: i16 = 0x07FF;

/// Packs a mantissa (-2048..=2047) and exponent (-8..=7) into an SFLOAT.
/// Out-of-range inputs are truncated to their field width.
pub fn encode_sfloat(mantissa: i16, exponent: i8) -> u16 {
    let exponent_bits = (exponent as u16 & 0x0F) << 12;
    let mantissa_bits = mantissa as u16 & 0x0FFF;
    exponent_bits | mantissa_bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heart_rate_uint8_and_uint16() {
        assert_eq!(parse_heart_rate(&[0x00, 0x4B]), Some(75));
        assert_eq!(parse_heart_rate(&[0x01, 0x4B, 0x00]), Some(75));
        assert_eq!(parse_heart_rate(&[0x01, 0x2C, 0x01]), Some(300));
        // extra flag bits do not change the format
        assert_eq!(parse_heart_rate(&[0x16, 0x48, 0xFF]), Some(72));
    }

    #[test]
    fn heart_rate_truncated() {
        assert_eq!(parse_heart_rate(&[]), None);
        assert_eq!(parse_heart_rate(&[0x00]), None);
        assert_eq!(parse_heart_rate(&[0x01, 0x4B]), None);
    }

    #[test]
    fn sfloat_known_values() {
        assert_eq!(sfloat_to_f32(u16::from_le_bytes([0x78, 0x00])), 120.0);
        assert_eq!(sfloat_to_f32(0x0FFF), -1.0);
        assert_eq!(sfloat_to_f32(0x0800), -2048.0);
        assert_eq!(sfloat_to_f32(0x1005), 50.0);
        assert!((sfloat_to_f32(0xF16D) - 36.5).abs() < 1e-4);
    }

    #[test]
    fn sfloat_encode_matches_decode() {
        let cases: [(i16, i8, f32); 4] = [(120, 0, 120.0), (-45, 0, -45.0), (365, -1, 36.5), (7, 2, 700.0)];
        for (mantissa, exponent, expected) in cases {
            let decoded = sfloat_to_f32(encode_sfloat(mantissa, exponent));
            assert!((decoded - expected).abs() < 1e-3, "{mantissa}e{exponent} -> {decoded}");
        }
    }

    #[test]
    fn blood_pressure_layout() {
        let data = [0x00, 0x78, 0x00, 0x50, 0x00, 0x5D, 0x00];
        assert_eq!(parse_blood_pressure(&data), Some((120.0, 80.0)));
        assert_eq!(parse_blood_pressure(&data[..6]), None);
    }

    #[test]
    fn temperature_hundredths() {
        let raw = 3700i32.to_le_bytes();
        let data = [0x00, raw[0], raw[1], raw[2], raw[3]];
        assert_eq!(parse_temperature(&data), Some(37.0));

        let below_zero = (-250i32).to_le_bytes();
        let data = [0x00, below_zero[0], below_zero[1], below_zero[2], below_zero[3]];
        assert_eq!(parse_temperature(&data), Some(-2.5));

        assert_eq!(parse_temperature(&[0x00, 0x74, 0x0E, 0x00]), None);
    }

    #[test]
    fn glucose_reads_trailing_sfloat() {
        let mut data = [0u8; 10];
        data[8] = 95;
        assert_eq!(parse_glucose(&data), Some(95.0));
        assert_eq!(parse_glucose(&data[..9]), None);
    }

    #[test]
    fn spo2_clamps_percentage() {
        assert_eq!(parse_spo2(&[0x00, 97, 72, 0, 0]), Some((97.0, 72)));
        assert_eq!(parse_spo2(&[0x00, 0xFF, 60, 0, 0]), Some((100.0, 60)));
        assert_eq!(parse_spo2(&[0x00, 97, 72, 0]), None);
    }

    #[test]
    fn classification_requires_exact_pair() {
        assert_eq!(
            identify_data_type(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT),
            HealthDataType::HeartRate
        );
        assert_eq!(
            identify_data_type(UUID_PULSE_OXIMETER_SERVICE, UUID_PLX_CONTINUOUS_MEASUREMENT),
            HealthDataType::SpO2
        );
        // right characteristic under the wrong service
        assert_eq!(
            identify_data_type(UUID_GLUCOSE_SERVICE, UUID_HEART_RATE_MEASUREMENT),
            HealthDataType::Unknown
        );
    }

    #[test]
    fn decode_unknown_or_malformed_is_none() {
        assert_eq!(VitalSign::decode(Uuid::nil(), Uuid::nil(), &[0x00, 0x4B]), None);
        assert_eq!(
            VitalSign::decode(UUID_BLOOD_PRESSURE_SERVICE, UUID_BLOOD_PRESSURE_MEASUREMENT, &[0x00, 0x78]),
            None
        );
        assert_eq!(
            VitalSign::decode(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT, &[0x00, 0x4B]),
            Some(VitalSign::HeartRate { bpm: 75 })
        );
    }

    #[test]
    fn vital_sign_serializes_with_tag() {
        let json = serde_json::to_value(VitalSign::SpO2 { percent: 98.0, pulse: 70 }).unwrap();
        assert_eq!(json["type"], "spo2");
        assert_eq!(json["pulse"], 70);
    }
}
