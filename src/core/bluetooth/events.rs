//! Caller-facing connection callbacks

use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::core::bluetooth::device::DeviceIdentity;
use crate::core::bluetooth::types::{ConnectionState, GattStatus, ServiceTable};

/// Receives everything the connection manager reports.
///
/// State changes are delivered in transition order, data in transport order.
/// Methods are called without any manager lock held, so implementations may
/// call back into the manager.
pub trait ConnectionCallback: Send + Sync {
    fn on_connection_state_change(&self, device: &DeviceIdentity, state: ConnectionState);

    /// Called after every discovery round, `status` tells whether it succeeded.
    fn on_services_discovered(&self, device: &DeviceIdentity, status: GattStatus, services: &ServiceTable);

    fn on_data_received(&self, service: Uuid, characteristic: Uuid, data: &[u8]);

    /// Called once the automatic reconnection budget is spent, right before the
    /// manager closes itself.
    fn on_reconnect_exhausted(&self, _device: &DeviceIdentity) {}
}

/// Everything a [`ConnectionCallback`] can observe, as a value
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged { device: DeviceIdentity, state: ConnectionState },
    ServicesDiscovered { device: DeviceIdentity, status: GattStatus, services: ServiceTable },
    DataReceived { service: Uuid, characteristic: Uuid, data: Vec<u8> },
    ReconnectExhausted { device: DeviceIdentity },
}

/// Forwards callbacks into an unbounded channel
pub struct ChannelCallback {
    tx: UnboundedSender<ConnectionEvent>,
}

impl ChannelCallback {
    /// Creates the callback together with the receiving end of its channel
    pub fn channel() -> (Arc<Self>, UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    fn forward(&self, event: ConnectionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Connection event receiver dropped");
        }
    }
}

impl ConnectionCallback for ChannelCallback {
    fn on_connection_state_change(&self, device: &DeviceIdentity, state: ConnectionState) {
        self.forward(ConnectionEvent::StateChanged { device: device.clone(), state });
    }

    fn on_services_discovered(&self, device: &DeviceIdentity, status: GattStatus, services: &ServiceTable) {
        self.forward(ConnectionEvent::ServicesDiscovered {
            device: device.clone(),
            status,
            services: services.clone(),
        });
    }

    fn on_data_received(&self, service: Uuid, characteristic: Uuid, data: &[u8]) {
        self.forward(ConnectionEvent::DataReceived { service, characteristic, data: data.to_vec() });
    }

    fn on_reconnect_exhausted(&self, device: &DeviceIdentity) {
        self.forward(ConnectionEvent::ReconnectExhausted { device: device.clone() });
    }
}
