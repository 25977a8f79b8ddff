//! Health device discovery
//! Scans for peripherals advertising one of the supported health services and
//! reports them as [`ScanEvent`]s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use bluest::Adapter;
use futures_util::StreamExt;
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::core::bluetooth::bluest_transport::DeviceRegistry;
use crate::core::bluetooth::constants::HEALTH_SERVICE_UUIDS;
use crate::core::bluetooth::device::{DeviceIdentity, DiscoveredDevice};

/// Progress of a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Started,
    DeviceFound(DiscoveredDevice),
    Finished { found: usize },
    Failed { reason: String },
}

/// Source of advertisements
#[async_trait]
pub trait ScanBackend: Send + Sync + 'static {
    /// Pushes every advertisement matching `services` into `found` until
    /// `cancel` fires or the platform stream ends.
    async fn scan(
        &self,
        services: &[Uuid],
        found: UnboundedSender<DiscoveredDevice>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

pub struct DeviceScanner<B: ScanBackend> {
    backend: Arc<B>,
    config: ScanConfig,
    devices: Arc<Mutex<HashMap<String, DiscoveredDevice>>>,
    cancel_token: CancellationToken,
    scan_task_handle: Option<JoinHandle<()>>,
}

impl<B: ScanBackend> DeviceScanner<B> {
    pub fn new(backend: Arc<B>, config: ScanConfig) -> Self {
        Self {
            backend,
            config,
            devices: Arc::new(Mutex::new(HashMap::new())),
            cancel_token: CancellationToken::new(),
            scan_task_handle: None,
        }
    }

    /// Starts a scan, replacing any scan still running. Results from the
    /// previous scan are discarded.
    pub async fn start_scan(&mut self, events: UnboundedSender<ScanEvent>) -> Result<()> {
        if self.scan_task_handle.is_some() {
            self.stop_scan().await?;
        }
        self.devices.lock().unwrap_or_else(PoisonError::into_inner).clear();

        self.cancel_token = CancellationToken::new();
        let cancel_token_for_task = self.cancel_token.clone();
        let backend_for_task = self.backend.clone();
        let devices_for_task = self.devices.clone();
        let config_for_task = self.config.clone();

        let handle = tokio::spawn(async move {
            Self::internal_scan_task(
                backend_for_task,
                devices_for_task,
                events,
                cancel_token_for_task,
                config_for_task,
            )
            .await;
        });

        self.scan_task_handle = Some(handle);
        info!("Device scan task started.");
        Ok(())
    }

    async fn internal_scan_task(
        backend: Arc<B>,
        devices: Arc<Mutex<HashMap<String, DiscoveredDevice>>>,
        events: UnboundedSender<ScanEvent>,
        cancel_token: CancellationToken,
        config: ScanConfig,
    ) {
        let _ = events.send(ScanEvent::Started);

        let (found_tx, mut found_rx) = mpsc::unbounded_channel();
        let backend_cancel = cancel_token.child_token();
        let backend_task = {
            let cancel = backend_cancel.clone();
            tokio::spawn(async move { backend.scan(&HEALTH_SERVICE_UUIDS, found_tx, cancel).await })
        };

        let deadline = tokio::time::sleep(config.scan_period());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                found = found_rx.recv() => {
                    match found {
                        Some(device) => Self::handle_found(&devices, &events, &config, device),
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = &mut deadline => {
                    info!("Scan period of {}ms elapsed, stopping scan", config.scan_period_ms);
                    break;
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
        backend_cancel.cancel();

        let finished = match backend_task.await {
            Ok(Ok(())) => {
                let found = devices.lock().unwrap_or_else(PoisonError::into_inner).len();
                ScanEvent::Finished { found }
            }
            Ok(Err(e)) => {
                error!("Scan failed: {}", e);
                ScanEvent::Failed { reason: e.to_string() }
            }
            Err(e) => {
                error!("Scan task finished with an unexpected join error: {:?}", e);
                ScanEvent::Failed { reason: e.to_string() }
            }
        };
        let _ = events.send(finished);
    }

    fn handle_found(
        devices: &Mutex<HashMap<String, DiscoveredDevice>>,
        events: &UnboundedSender<ScanEvent>,
        config: &ScanConfig,
        device: DiscoveredDevice,
    ) {
        debug!("Found device - ID: {}, RSSI: {:?}", device.identity.address, device.rssi);

        if let Some(rssi) = device.rssi {
            if rssi < config.min_rssi {
                debug!("Skipping {} with weak signal {}", device.identity.address, rssi);
                return;
            }
        }
        // an empty service list means the platform already applied the filter
        if config.health_devices_only && !device.services.is_empty() && !device.is_health_device() {
            debug!("Skipping non-health device {}", device.identity.address);
            return;
        }

        let is_new = {
            let mut devices = devices.lock().unwrap_or_else(PoisonError::into_inner);
            devices.insert(device.identity.address.clone(), device.clone()).is_none()
        };
        if is_new {
            info!(
                "Found health device: {} ({}), RSSI: {:?}",
                device.identity.display_name(),
                device.identity.address,
                device.rssi
            );
            let _ = events.send(ScanEvent::DeviceFound(device));
        }
    }

    /// Stops the running scan and waits for its task to wind down.
    pub async fn stop_scan(&mut self) -> Result<()> {
        info!("Stopping Bluetooth scan.");
        self.cancel_token.cancel();

        if let Some(handle) = self.scan_task_handle.take() {
            match handle.await {
                Ok(()) => info!("Scan task finished after cancellation."),
                Err(e) if e.is_cancelled() => info!("Scan task was cancelled."),
                Err(e) => error!("Scan task finished with an unexpected join error: {:?}", e),
            }
        } else {
            debug!("No active scan task handle found to wait for.");
        }
        Ok(())
    }

    /// Devices found by the current or last scan
    pub fn scanned_devices(&self) -> Vec<DiscoveredDevice> {
        let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<_> = devices.values().cloned().collect();
        list.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        list
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_task_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Scans through the host Bluetooth adapter
pub struct BluestScanBackend {
    adapter: Adapter,
    devices: DeviceRegistry,
}

impl BluestScanBackend {
    /// `devices` receives every found peripheral so a transport sharing the
    /// registry can connect to it later.
    pub fn new(adapter: Adapter, devices: DeviceRegistry) -> Self {
        Self { adapter, devices }
    }

    fn register(&self, device: &bluest::Device) -> String {
        let id = device.id().to_string();
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), device.clone());
        id
    }
}

#[async_trait]
impl ScanBackend for BluestScanBackend {
    async fn scan(
        &self,
        services: &[Uuid],
        found: UnboundedSender<DiscoveredDevice>,
        cancel: CancellationToken,
    ) -> Result<()> {
        // already connected peripherals do not advertise
        info!("Checking for connected devices");
        for device in self.adapter.connected_devices_with_services(services).await? {
            let id = self.register(&device);
            let identity = DeviceIdentity::new(id, device.name().ok());
            let _ = found.send(DiscoveredDevice::new(identity, None, services.to_vec()));
        }

        info!("Starting bluetooth scan");
        let mut scan_stream = self.adapter.scan(services).await?;

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    let Some(advertising) = result else {
                        break;
                    };
                    let id = self.register(&advertising.device);
                    let name = advertising.device.name().ok().or(advertising.adv_data.local_name);
                    let discovered = DiscoveredDevice::new(
                        DeviceIdentity::new(id, name),
                        advertising.rssi,
                        advertising.adv_data.services,
                    );
                    if found.send(discovered).is_err() {
                        break;
                    }
                }
                _ = cancel.cancelled() => {
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::constants::{UUID_GLUCOSE_SERVICE, UUID_HEART_RATE_SERVICE};
    use std::time::Duration;

    /// Replays a fixed list of advertisements, then idles until cancelled
    struct ScriptedBackend {
        adverts: Vec<DiscoveredDevice>,
    }

    #[async_trait]
    impl ScanBackend for ScriptedBackend {
        async fn scan(
            &self,
            _services: &[Uuid],
            found: UnboundedSender<DiscoveredDevice>,
            cancel: CancellationToken,
        ) -> Result<()> {
            for advert in &self.adverts {
                let _ = found.send(advert.clone());
            }
            cancel.cancelled().await;
            Ok(())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ScanBackend for FailingBackend {
        async fn scan(&self, _: &[Uuid], _: UnboundedSender<DiscoveredDevice>, _: CancellationToken) -> Result<()> {
            Err(anyhow::anyhow!("adapter powered off"))
        }
    }

    fn advert(address: &str, rssi: i16, services: Vec<Uuid>) -> DiscoveredDevice {
        DiscoveredDevice::new(DeviceIdentity::new(address, Some("Oximeter".into())), Some(rssi), services)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_filters_dedups_and_times_out() {
        let backend = Arc::new(ScriptedBackend {
            adverts: vec![
                advert("AA:AA:AA:AA:AA:01", -60, vec![UUID_HEART_RATE_SERVICE]),
                advert("AA:AA:AA:AA:AA:01", -55, vec![UUID_HEART_RATE_SERVICE]),
                advert("AA:AA:AA:AA:AA:02", -120, vec![UUID_GLUCOSE_SERVICE]),
                advert("AA:AA:AA:AA:AA:03", -40, vec![Uuid::nil()]),
            ],
        });
        let mut scanner = DeviceScanner::new(backend, ScanConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        scanner.start_scan(tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(ScanEvent::Started));
        match rx.recv().await {
            Some(ScanEvent::DeviceFound(device)) => assert_eq!(device.identity.address, "AA:AA:AA:AA:AA:01"),
            other => panic!("unexpected event {:?}", other),
        }

        let started = tokio::time::Instant::now();
        assert_eq!(rx.recv().await, Some(ScanEvent::Finished { found: 1 }));
        assert!(started.elapsed() >= Duration::from_millis(9_900));
        assert_eq!(scanner.scanned_devices().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_failure_is_reported() {
        let mut scanner = DeviceScanner::new(Arc::new(FailingBackend), ScanConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        scanner.start_scan(tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(ScanEvent::Started));
        assert_eq!(
            rx.recv().await,
            Some(ScanEvent::Failed { reason: "adapter powered off".into() })
        );
        scanner.stop_scan().await.unwrap();
        assert!(!scanner.is_scanning());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_scan_finishes_early() {
        let backend = Arc::new(ScriptedBackend { adverts: Vec::new() });
        let mut scanner = DeviceScanner::new(backend, ScanConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        scanner.start_scan(tx).await.unwrap();
        assert_eq!(rx.recv().await, Some(ScanEvent::Started));

        scanner.stop_scan().await.unwrap();
        assert_eq!(rx.recv().await, Some(ScanEvent::Finished { found: 0 }));
        assert!(!scanner.is_scanning());
    }
}
