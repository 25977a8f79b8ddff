//! GATT transport over the host adapter
//! Maps the initiate-then-report session model onto `bluest`'s async API: each
//! operation spawns a task whose outcome is posted back as a [`TransportEvent`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use bluest::{Adapter, Characteristic, ConnectionEvent as LinkEvent, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::bluetooth::constants::UUID_CLIENT_CHARACTERISTIC_CONFIG;
use crate::core::bluetooth::device::DeviceIdentity;
use crate::core::bluetooth::transport::{GattSession, GattTransport, TransportEvent, TransportEvents};
use crate::core::bluetooth::types::{
    CharacteristicProperties, GattCharacteristic, GattService, GattStatus, ServiceTable,
};
use crate::error::TransportError;

/// Peripherals found by a scan, keyed by platform device id
pub type DeviceRegistry = Arc<Mutex<HashMap<String, Device>>>;

type CharacteristicKey = (Uuid, Uuid);

pub struct BluestTransport {
    adapter: Adapter,
    devices: DeviceRegistry,
    runtime: Handle,
}

impl BluestTransport {
    /// Opens the default adapter and waits until it is powered on.
    pub async fn new() -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            runtime: Handle::current(),
        })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Registry shared with the scan backend
    pub fn devices(&self) -> DeviceRegistry {
        self.devices.clone()
    }
}

impl GattTransport for BluestTransport {
    fn open_session(
        &self,
        device: &DeviceIdentity,
        events: TransportEvents,
    ) -> Result<Arc<dyn GattSession>, TransportError> {
        let handle = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device.address)
            .cloned()
            .ok_or_else(|| TransportError::DeviceNotFound(device.address.clone()))?;

        let session = Arc::new(BluestSession {
            identity: device.clone(),
            adapter: self.adapter.clone(),
            device: handle,
            events,
            runtime: self.runtime.clone(),
            cancel: CancellationToken::new(),
            characteristics: Arc::new(Mutex::new(HashMap::new())),
            subscriptions: Mutex::new(HashMap::new()),
        });
        session.start_connect();
        Ok(session)
    }
}

struct BluestSession {
    identity: DeviceIdentity,
    adapter: Adapter,
    device: Device,
    events: TransportEvents,
    runtime: Handle,
    cancel: CancellationToken,
    characteristics: Arc<Mutex<HashMap<CharacteristicKey, Characteristic>>>,
    subscriptions: Mutex<HashMap<CharacteristicKey, CancellationToken>>,
}

impl BluestSession {
    fn start_connect(&self) {
        let adapter = self.adapter.clone();
        let device = self.device.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();

        self.runtime.spawn(async move {
            if !device.is_connected().await {
                info!("Initiating connection to {}...", device.id());
                let result = tokio::select! {
                    _ = cancel.cancelled() => return,
                    result = adapter.connect_device(&device) => result,
                };
                if let Err(e) = result {
                    error!("Failed to connect to {}: {}", device.id(), e);
                    events.send(TransportEvent::ConnectFailed { status: GattStatus::FAILURE });
                    return;
                }
            }
            events.send(TransportEvent::Connected);

            let mut link_events = match adapter.device_connection_events(&device).await {
                Ok(stream) => Box::pin(stream),
                Err(e) => {
                    warn!("Link loss will go unnoticed, cannot watch connection events: {}", e);
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = link_events.next() => match event {
                        Some(LinkEvent::Disconnected) => {
                            info!("Device {} disconnected", device.id());
                            events.send(TransportEvent::Disconnected);
                            break;
                        }
                        Some(LinkEvent::Connected) => {}
                        None => break,
                    }
                }
            }
        });
    }

    fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Option<Characteristic> {
        self.characteristics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(service, characteristic))
            .cloned()
    }

    fn cancel_subscription(&self, key: CharacteristicKey) {
        if let Some(token) = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
        {
            token.cancel();
        }
    }

    /// Subscribes through `Characteristic::notify`, which writes the CCCD itself.
    fn start_subscription(&self, service: Uuid, characteristic: Characteristic) {
        let key = (service, characteristic.uuid());
        self.cancel_subscription(key);

        let token = self.cancel.child_token();
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, token.clone());

        let events = self.events.clone();
        self.runtime.spawn(async move {
            let char_uuid = characteristic.uuid();
            let mut stream = match characteristic.notify().await {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to subscribe to notifications: {}", e);
                    events.send(TransportEvent::DescriptorWritten {
                        service,
                        characteristic: char_uuid,
                        descriptor: UUID_CLIENT_CHARACTERISTIC_CONFIG,
                        status: GattStatus::FAILURE,
                    });
                    return;
                }
            };
            events.send(TransportEvent::DescriptorWritten {
                service,
                characteristic: char_uuid,
                descriptor: UUID_CLIENT_CHARACTERISTIC_CONFIG,
                status: GattStatus::SUCCESS,
            });

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    item = stream.next() => match item {
                        Some(Ok(value)) => events.send(TransportEvent::CharacteristicChanged {
                            service,
                            characteristic: char_uuid,
                            value,
                        }),
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
            }
            debug!("Notification stream for {} ended", char_uuid);
        });
    }
}

async fn collect_services(
    device: &Device,
) -> Result<(ServiceTable, HashMap<CharacteristicKey, Characteristic>)> {
    let mut services = Vec::new();
    let mut handles = HashMap::new();

    for service in device.discover_services().await? {
        let mut characteristics = Vec::new();
        for characteristic in service.characteristics().await? {
            let props = characteristic.properties().await?;
            let properties = CharacteristicProperties {
                read: props.read,
                write: props.write || props.write_without_response,
                notify: props.notify,
                indicate: props.indicate,
            };
            let mut descriptors: Vec<Uuid> = characteristic
                .descriptors()
                .await?
                .iter()
                .map(|descriptor| descriptor.uuid())
                .collect();
            // some host stacks hide the CCCD and manage it themselves
            if (properties.notify || properties.indicate)
                && !descriptors.contains(&UUID_CLIENT_CHARACTERISTIC_CONFIG)
            {
                descriptors.push(UUID_CLIENT_CHARACTERISTIC_CONFIG);
            }

            handles.insert((service.uuid(), characteristic.uuid()), characteristic.clone());
            characteristics.push(GattCharacteristic::new(characteristic.uuid(), properties, descriptors));
        }
        services.push(GattService::new(service.uuid(), characteristics));
    }
    Ok((ServiceTable::new(services), handles))
}

impl GattSession for BluestSession {
    fn device(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn discover_services(&self) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::SessionClosed);
        }
        let device = self.device.clone();
        let events = self.events.clone();
        let handles = self.characteristics.clone();

        self.runtime.spawn(async move {
            match collect_services(&device).await {
                Ok((services, found)) => {
                    *handles.lock().unwrap_or_else(PoisonError::into_inner) = found;
                    events.send(TransportEvent::ServicesDiscovered { status: GattStatus::SUCCESS, services });
                }
                Err(e) => {
                    error!("Error discovering services: {}", e);
                    events.send(TransportEvent::ServicesDiscovered {
                        status: GattStatus::FAILURE,
                        services: ServiceTable::default(),
                    });
                }
            }
        });
        Ok(())
    }

    fn set_notification(&self, service: Uuid, characteristic: Uuid, enabled: bool) -> bool {
        if self.characteristic(service, characteristic).is_none() {
            return false;
        }
        if !enabled {
            self.cancel_subscription((service, characteristic));
        }
        true
    }

    fn write_descriptor(&self, service: Uuid, characteristic: Uuid, descriptor: Uuid, value: &[u8]) -> bool {
        let Some(handle) = self.characteristic(service, characteristic) else {
            return false;
        };

        if descriptor == UUID_CLIENT_CHARACTERISTIC_CONFIG {
            if value.iter().any(|&b| b != 0) {
                self.start_subscription(service, handle);
            } else {
                self.cancel_subscription((service, characteristic));
                self.events.send(TransportEvent::DescriptorWritten {
                    service,
                    characteristic,
                    descriptor,
                    status: GattStatus::SUCCESS,
                });
            }
            return true;
        }

        let events = self.events.clone();
        let value = value.to_vec();
        self.runtime.spawn(async move {
            let result = async {
                let descriptors = handle.descriptors().await?;
                let target = descriptors
                    .into_iter()
                    .find(|d| d.uuid() == descriptor)
                    .ok_or_else(|| anyhow!("Descriptor not found: {}", descriptor))?;
                target.write(&value).await?;
                Ok::<(), anyhow::Error>(())
            }
            .await;

            let status = match result {
                Ok(()) => GattStatus::SUCCESS,
                Err(e) => {
                    error!("Descriptor write failed: {}", e);
                    GattStatus::FAILURE
                }
            };
            events.send(TransportEvent::DescriptorWritten { service, characteristic, descriptor, status });
        });
        true
    }

    fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        let Some(handle) = self.characteristic(service, characteristic) else {
            return false;
        };
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let (status, value) = match handle.read().await {
                Ok(value) => (GattStatus::SUCCESS, value),
                Err(e) => {
                    error!("Characteristic read failed: {}", e);
                    (GattStatus::FAILURE, Vec::new())
                }
            };
            events.send(TransportEvent::CharacteristicRead { service, characteristic, status, value });
        });
        true
    }

    fn disconnect(&self) {
        let adapter = self.adapter.clone();
        let device = self.device.clone();
        let events = self.events.clone();
        self.runtime.spawn(async move {
            info!("Disconnecting from device {}", device.id());
            if let Err(e) = adapter.disconnect_device(&device).await {
                error!("Failed to disconnect: {}", e);
            }
            events.send(TransportEvent::Disconnected);
        });
    }

    fn close(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner).clear();

        let adapter = self.adapter.clone();
        let device = self.device.clone();
        self.runtime.spawn(async move {
            if device.is_connected().await {
                if let Err(e) = adapter.disconnect_device(&device).await {
                    debug!("Disconnect on close failed: {}", e);
                }
            }
        });
    }
}
