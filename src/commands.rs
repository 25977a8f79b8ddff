//! Host commands
//! This module implements the operations the command-line host exposes:
//! scanning for health devices and monitoring one of them.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{error, info, warn};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::config::{BleConfig, ScanConfig};
use crate::core::bluetooth::{
    extract_mac_address, BluestScanBackend, BluestTransport, ChannelCallback, ConnectionEvent,
    ConnectionManager, ConnectionState, DeviceIdentity, DeviceScanner, GattTransport, KnownDeviceStore,
    ScanEvent, HEALTH_MEASUREMENTS,
};
use crate::core::health_data::VitalSign;
use crate::core::simulator::SimulatedTransport;

/// Scans for health devices, forwarding every scan event until the scan ends
/// or `shutdown` fires.
pub async fn scan_devices(
    config: &BleConfig,
    events: UnboundedSender<ScanEvent>,
    shutdown: CancellationToken,
) -> Result<()> {
    let transport = BluestTransport::new().await?;
    let backend = Arc::new(BluestScanBackend::new(transport.adapter().clone(), transport.devices()));
    let mut scanner = DeviceScanner::new(backend, config.scan.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    scanner.start_scan(tx).await?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                let done = matches!(event, ScanEvent::Finished { .. } | ScanEvent::Failed { .. });
                let _ = events.send(event);
                if done {
                    break;
                }
            }
        }
    }
    scanner.stop_scan().await
}

/// Scans until a device whose id or MAC matches `address` shows up.
pub async fn locate_device(
    transport: &BluestTransport,
    config: &ScanConfig,
    address: &str,
) -> Result<DeviceIdentity> {
    let backend = Arc::new(BluestScanBackend::new(transport.adapter().clone(), transport.devices()));
    let mut scanner = DeviceScanner::new(backend, config.clone());
    let wanted = address.to_uppercase();

    let (tx, mut rx) = mpsc::unbounded_channel();
    scanner.start_scan(tx).await?;
    info!("Looking for device {}", address);

    let mut located = None;
    while let Some(event) = rx.recv().await {
        match event {
            ScanEvent::DeviceFound(device) => {
                let id_matches = device.identity.address.eq_ignore_ascii_case(address);
                let mac_matches = device.mac.as_deref() == Some(wanted.as_str())
                    || extract_mac_address(&device.identity.address).as_deref() == Some(wanted.as_str());
                if id_matches || mac_matches {
                    located = Some(device.identity);
                    break;
                }
            }
            ScanEvent::Finished { .. } | ScanEvent::Failed { .. } => break,
            ScanEvent::Started => {}
        }
    }
    scanner.stop_scan().await?;

    located.ok_or_else(|| anyhow!("Device not found with ID: {}", address))
}

/// Monitors a real peripheral. Without an address the last connected device is used.
pub async fn monitor_device(
    config: &BleConfig,
    config_dir: &Path,
    address: Option<String>,
    vitals: UnboundedSender<VitalSign>,
    shutdown: CancellationToken,
) -> Result<()> {
    let store = KnownDeviceStore::new(config_dir);
    let address = match address {
        Some(address) => address,
        None => store
            .last_connected()
            .await?
            .map(|device| device.address)
            .ok_or_else(|| anyhow!("No device given and no previously connected device"))?,
    };

    let transport = BluestTransport::new().await?;
    let device = locate_device(&transport, &config.scan, &address).await?;
    run_monitor(Arc::new(transport), device, config, Some(&store), vitals, shutdown).await
}

pub async fn monitor_simulated(
    config: &BleConfig,
    vitals: UnboundedSender<VitalSign>,
    shutdown: CancellationToken,
) -> Result<()> {
    let transport = Arc::new(SimulatedTransport::new(config.simulator.clone())?);
    run_monitor(transport, SimulatedTransport::device(), config, None, vitals, shutdown).await
}

/// Connects to `device`, subscribes to every health measurement it offers and
/// forwards decoded readings until `shutdown` fires or reconnection gives up.
pub async fn run_monitor(
    transport: Arc<dyn GattTransport>,
    device: DeviceIdentity,
    config: &BleConfig,
    store: Option<&KnownDeviceStore>,
    vitals: UnboundedSender<VitalSign>,
    shutdown: CancellationToken,
) -> Result<()> {
    let manager = ConnectionManager::with_config(transport, config.connection.clone())?;
    let (callback, mut events) = ChannelCallback::channel();

    if !manager.connect(device.clone(), callback) {
        return Err(anyhow!("Could not start connecting to {}", device.address));
    }

    let result = loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break Ok(());
        };

        match event {
            ConnectionEvent::StateChanged { device, state } => {
                info!("{} ({}) is {}", device.display_name(), device.address, state);
                if state == ConnectionState::Connected {
                    if let Some(store) = store {
                        if let Err(e) = store.remember(&device).await {
                            warn!("Failed to remember device: {}", e);
                        }
                    }
                }
            }
            ConnectionEvent::ServicesDiscovered { status, services, .. } => {
                if !status.is_success() {
                    warn!("Service discovery failed with status: {}", status);
                    continue;
                }
                let subscribed = manager.subscriptions();
                for (service, characteristic) in HEALTH_MEASUREMENTS {
                    if services.characteristic(service, characteristic).is_none()
                        || subscribed.contains(&(service, characteristic))
                    {
                        continue;
                    }
                    if !manager.enable_notifications(service, characteristic) {
                        warn!("Could not subscribe to {}", characteristic);
                    }
                }
            }
            ConnectionEvent::DataReceived { service, characteristic, data } => {
                match VitalSign::decode(service, characteristic, &data) {
                    Some(vital) => {
                        let _ = vitals.send(vital);
                    }
                    None => warn!("Undecodable payload from {}: {:02X?}", characteristic, data),
                }
            }
            ConnectionEvent::ReconnectExhausted { device } => {
                error!("Giving up on {} after repeated reconnection failures", device.address);
                break Err(anyhow!("Lost connection to {}", device.address));
            }
        }
    };

    manager.close();
    result
}
