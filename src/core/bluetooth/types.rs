//! Defines shared data structures for the Bluetooth module.

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::core::bluetooth::constants::{ENABLE_INDICATION_VALUE, ENABLE_NOTIFICATION_VALUE};

/// Connection state of a [`ConnectionManager`](crate::core::bluetooth::ConnectionManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnecting => "DISCONNECTING",
        };
        f.write_str(name)
    }
}

/// Raw GATT status code reported by the transport. `0` is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GattStatus(pub u8);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0x00);
    /// Generic failure (`GATT_ERROR` on most stacks)
    pub const FAILURE: GattStatus = GattStatus(0x85);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Capability flags of a characteristic that the manager cares about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    pub fn notify() -> Self {
        Self { notify: true, ..Self::default() }
    }

    pub fn indicate() -> Self {
        Self { indicate: true, ..Self::default() }
    }

    /// Picks exactly one subscription mode, indicate wins when both are advertised.
    pub fn subscription_mode(&self) -> Option<SubscriptionMode> {
        if self.indicate {
            Some(SubscriptionMode::Indicate)
        } else if self.notify {
            Some(SubscriptionMode::Notify)
        } else {
            None
        }
    }
}

/// How a characteristic pushes value changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubscriptionMode {
    Notify,
    Indicate,
}

impl SubscriptionMode {
    /// Value written to the Client Characteristic Configuration descriptor
    pub fn descriptor_value(&self) -> [u8; 2] {
        match self {
            Self::Notify => ENABLE_NOTIFICATION_VALUE,
            Self::Indicate => ENABLE_INDICATION_VALUE,
        }
    }
}

/// A discovered characteristic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    /// UUIDs of the descriptors attached to this characteristic
    pub descriptors: Vec<Uuid>,
}

impl GattCharacteristic {
    pub fn new(uuid: Uuid, properties: CharacteristicProperties, descriptors: Vec<Uuid>) -> Self {
        Self { uuid, properties, descriptors }
    }

    pub fn has_descriptor(&self, uuid: Uuid) -> bool {
        self.descriptors.contains(&uuid)
    }
}

/// A discovered primary service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn new(uuid: Uuid, characteristics: Vec<GattCharacteristic>) -> Self {
        Self { uuid, characteristics }
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&GattCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// Service table of one session, as produced by service discovery
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceTable {
    services: Vec<GattService>,
}

impl ServiceTable {
    pub fn new(services: Vec<GattService>) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &[GattService] {
        &self.services
    }

    pub fn service(&self, uuid: Uuid) -> Option<&GattService> {
        self.services.iter().find(|s| s.uuid == uuid)
    }

    pub fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Option<&GattCharacteristic> {
        self.service(service)?.characteristic(characteristic)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::*;

    #[test]
    fn indicate_is_preferred_over_notify() {
        let both = CharacteristicProperties { notify: true, indicate: true, ..Default::default() };
        assert_eq!(both.subscription_mode(), Some(SubscriptionMode::Indicate));
        assert_eq!(CharacteristicProperties::notify().subscription_mode(), Some(SubscriptionMode::Notify));
        assert_eq!(CharacteristicProperties::default().subscription_mode(), None);
        assert_eq!(SubscriptionMode::Indicate.descriptor_value(), [0x02, 0x00]);
    }

    #[test]
    fn service_table_lookup() {
        let table = ServiceTable::new(vec![GattService::new(
            UUID_HEART_RATE_SERVICE,
            vec![GattCharacteristic::new(
                UUID_HEART_RATE_MEASUREMENT,
                CharacteristicProperties::notify(),
                vec![UUID_CLIENT_CHARACTERISTIC_CONFIG],
            )],
        )]);

        let characteristic = table
            .characteristic(UUID_HEART_RATE_SERVICE, UUID_HEART_RATE_MEASUREMENT)
            .unwrap();
        assert!(characteristic.has_descriptor(UUID_CLIENT_CHARACTERISTIC_CONFIG));
        assert!(table.characteristic(UUID_GLUCOSE_SERVICE, UUID_HEART_RATE_MEASUREMENT).is_none());
        assert!(table.characteristic(UUID_HEART_RATE_SERVICE, UUID_GLUCOSE_MEASUREMENT).is_none());
    }
}
