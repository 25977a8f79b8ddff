//! GATT transport abstraction
//! The connection manager drives a platform stack through these traits. Every
//! operation only *initiates* work and returns immediately; outcomes come back
//! as [`TransportEvent`]s on the sink handed to [`GattTransport::open_session`].

use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::core::bluetooth::device::DeviceIdentity;
use crate::core::bluetooth::types::{GattStatus, ServiceTable};
use crate::error::TransportError;

/// Asynchronous results reported by a session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Link established
    Connected,
    /// Link could not be established
    ConnectFailed { status: GattStatus },
    /// Link lost or closed
    Disconnected,
    ServicesDiscovered { status: GattStatus, services: ServiceTable },
    /// Notification or indication received
    CharacteristicChanged { service: Uuid, characteristic: Uuid, value: Vec<u8> },
    CharacteristicRead { service: Uuid, characteristic: Uuid, status: GattStatus, value: Vec<u8> },
    DescriptorWritten { service: Uuid, characteristic: Uuid, descriptor: Uuid, status: GattStatus },
}

/// Work items processed by the manager's event loop
#[derive(Debug)]
pub(crate) enum ManagerEvent {
    Transport { session: u64, event: TransportEvent },
    ConnectTimeout { session: u64 },
    DisconnectTimeout { session: u64 },
    DiscoverServices { session: u64 },
    Reconnect { generation: u64 },
}

/// Event sink bound to one session
#[derive(Clone)]
pub struct TransportEvents {
    session: u64,
    tx: UnboundedSender<ManagerEvent>,
}

impl TransportEvents {
    pub(crate) fn new(session: u64, tx: UnboundedSender<ManagerEvent>) -> Self {
        Self { session, tx }
    }

    /// Id of the session this sink belongs to
    pub fn session_id(&self) -> u64 {
        self.session
    }

    /// Reports an event. Events sent after the manager is gone are dropped.
    pub fn send(&self, event: TransportEvent) {
        if self.tx.send(ManagerEvent::Transport { session: self.session, event }).is_err() {
            debug!("Session {} event dropped, manager is gone", self.session);
        }
    }
}

/// Opens sessions to peripherals
pub trait GattTransport: Send + Sync {
    /// Starts opening a session. `Err` means the attempt could not even be started;
    /// otherwise the outcome is reported as `Connected` or `ConnectFailed`.
    fn open_session(
        &self,
        device: &DeviceIdentity,
        events: TransportEvents,
    ) -> Result<Arc<dyn GattSession>, TransportError>;
}

/// One open GATT client session. Implementations must not block and must not
/// call back into the manager synchronously.
pub trait GattSession: Send + Sync {
    fn device(&self) -> &DeviceIdentity;

    /// Starts service discovery, answered by `ServicesDiscovered`.
    fn discover_services(&self) -> Result<(), TransportError>;

    /// Enables or disables local delivery of value changes.
    fn set_notification(&self, service: Uuid, characteristic: Uuid, enabled: bool) -> bool;

    /// Starts a descriptor write, answered by `DescriptorWritten`.
    fn write_descriptor(&self, service: Uuid, characteristic: Uuid, descriptor: Uuid, value: &[u8]) -> bool;

    /// Starts a read, answered by `CharacteristicRead`.
    fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool;

    /// Graceful disconnect, answered by `Disconnected`.
    fn disconnect(&self);

    /// Releases the session. No events are expected afterwards.
    fn close(&self);
}
