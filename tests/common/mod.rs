#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use uuid::Uuid;

use healthedge_ble_lib::core::bluetooth::*;
use healthedge_ble_lib::error::TransportError;

/// How a scripted session answers the connection attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectBehavior {
    Succeed,
    Fail,
    /// Never answers, so the connection timeout has to fire
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    DiscoverServices,
    SetNotification(Uuid, Uuid, bool),
    WriteDescriptor(Uuid, Uuid, Uuid, Vec<u8>),
    Read(Uuid, Uuid),
    Disconnect,
    Close,
}

struct MockState {
    services: ServiceTable,
    script: VecDeque<ConnectBehavior>,
    default_behavior: ConnectBehavior,
    fail_open: bool,
    confirm_disconnect: bool,
    discovery_status: GattStatus,
    sessions: Vec<Arc<MockSession>>,
}

/// Scripted transport recording everything the manager asks of it
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new(services: ServiceTable) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(MockState {
                services,
                script: VecDeque::new(),
                default_behavior: ConnectBehavior::Succeed,
                fail_open: false,
                confirm_disconnect: true,
                discovery_status: GattStatus::SUCCESS,
                sessions: Vec::new(),
            }),
        })
    }

    /// Behaviours for the next opens, in order. Later opens use the default.
    pub fn script(&self, behaviors: &[ConnectBehavior]) {
        self.state.lock().unwrap().script.extend(behaviors.iter().copied());
    }

    pub fn set_default_behavior(&self, behavior: ConnectBehavior) {
        self.state.lock().unwrap().default_behavior = behavior;
    }

    /// Service table handed to sessions opened from now on
    pub fn set_services(&self, services: ServiceTable) {
        self.state.lock().unwrap().services = services;
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }

    pub fn set_confirm_disconnect(&self, confirm: bool) {
        self.state.lock().unwrap().confirm_disconnect = confirm;
    }

    /// Status reported by service discovery on sessions opened from now on
    pub fn set_discovery_status(&self, status: GattStatus) {
        self.state.lock().unwrap().discovery_status = status;
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn session(&self, index: usize) -> Arc<MockSession> {
        self.state.lock().unwrap().sessions[index].clone()
    }

    pub fn last_session(&self) -> Arc<MockSession> {
        self.state.lock().unwrap().sessions.last().cloned().expect("no session opened")
    }
}

impl GattTransport for MockTransport {
    fn open_session(
        &self,
        device: &DeviceIdentity,
        events: TransportEvents,
    ) -> Result<Arc<dyn GattSession>, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_open {
            return Err(TransportError::AdapterUnavailable);
        }
        let behavior = state.script.pop_front().unwrap_or(state.default_behavior);

        let session = Arc::new(MockSession {
            device: device.clone(),
            events,
            services: state.services.clone(),
            opened_at: Instant::now(),
            confirm_disconnect: state.confirm_disconnect,
            discovery_status: state.discovery_status,
            closed: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        });
        match behavior {
            ConnectBehavior::Succeed => session.events.send(TransportEvent::Connected),
            ConnectBehavior::Fail => session.events.send(TransportEvent::ConnectFailed {
                status: GattStatus::FAILURE,
            }),
            ConnectBehavior::Hang => {}
        }
        state.sessions.push(session.clone());
        Ok(session)
    }
}

pub struct MockSession {
    device: DeviceIdentity,
    pub events: TransportEvents,
    services: ServiceTable,
    pub opened_at: Instant,
    confirm_disconnect: bool,
    discovery_status: GattStatus,
    closed: AtomicBool,
    calls: Mutex<Vec<SessionCall>>,
}

impl MockSession {
    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscriptions written to the CCCD on this session
    pub fn cccd_writes(&self) -> Vec<(Uuid, Uuid, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SessionCall::WriteDescriptor(service, characteristic, descriptor, value)
                    if descriptor == UUID_CLIENT_CHARACTERISTIC_CONFIG =>
                {
                    Some((service, characteristic, value))
                }
                _ => None,
            })
            .collect()
    }

    /// Peripheral-side link loss
    pub fn drop_link(&self) {
        self.events.send(TransportEvent::Disconnected);
    }

    pub fn notify(&self, service: Uuid, characteristic: Uuid, value: &[u8]) {
        self.events.send(TransportEvent::CharacteristicChanged {
            service,
            characteristic,
            value: value.to_vec(),
        });
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl GattSession for MockSession {
    fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    fn discover_services(&self) -> Result<(), TransportError> {
        self.record(SessionCall::DiscoverServices);
        let services = if self.discovery_status.is_success() {
            self.services.clone()
        } else {
            ServiceTable::default()
        };
        self.events.send(TransportEvent::ServicesDiscovered { status: self.discovery_status, services });
        Ok(())
    }

    fn set_notification(&self, service: Uuid, characteristic: Uuid, enabled: bool) -> bool {
        self.record(SessionCall::SetNotification(service, characteristic, enabled));
        true
    }

    fn write_descriptor(&self, service: Uuid, characteristic: Uuid, descriptor: Uuid, value: &[u8]) -> bool {
        self.record(SessionCall::WriteDescriptor(service, characteristic, descriptor, value.to_vec()));
        self.events.send(TransportEvent::DescriptorWritten {
            service,
            characteristic,
            descriptor,
            status: GattStatus::SUCCESS,
        });
        true
    }

    fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.record(SessionCall::Read(service, characteristic));
        self.events.send(TransportEvent::CharacteristicRead {
            service,
            characteristic,
            status: GattStatus::SUCCESS,
            value: vec![0x00, 0x48],
        });
        true
    }

    fn disconnect(&self) {
        self.record(SessionCall::Disconnect);
        if self.confirm_disconnect {
            self.events.send(TransportEvent::Disconnected);
        }
    }

    fn close(&self) {
        self.record(SessionCall::Close);
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub fn characteristic(uuid: Uuid, properties: CharacteristicProperties, with_cccd: bool) -> GattCharacteristic {
    let descriptors = if with_cccd { vec![UUID_CLIENT_CHARACTERISTIC_CONFIG] } else { Vec::new() };
    GattCharacteristic::new(uuid, properties, descriptors)
}

/// Heart rate (notify) and glucose (indicate), both with a CCCD
pub fn health_table() -> ServiceTable {
    ServiceTable::new(vec![
        GattService::new(
            UUID_HEART_RATE_SERVICE,
            vec![characteristic(UUID_HEART_RATE_MEASUREMENT, CharacteristicProperties::notify(), true)],
        ),
        GattService::new(
            UUID_GLUCOSE_SERVICE,
            vec![characteristic(UUID_GLUCOSE_MEASUREMENT, CharacteristicProperties::indicate(), true)],
        ),
    ])
}

pub fn heart_rate_only_table() -> ServiceTable {
    ServiceTable::new(vec![GattService::new(
        UUID_HEART_RATE_SERVICE,
        vec![characteristic(UUID_HEART_RATE_MEASUREMENT, CharacteristicProperties::notify(), true)],
    )])
}

pub fn monitor() -> DeviceIdentity {
    DeviceIdentity::new("C8:FD:19:AA:BB:CC", Some("Pulse Oximeter".to_string()))
}

pub async fn next_event(rx: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
    tokio::time::timeout(Duration::from_secs(120), rx.recv())
        .await
        .expect("timed out waiting for a connection event")
        .expect("callback channel closed")
}

/// Next state change, skipping any other event
pub async fn next_state(rx: &mut UnboundedReceiver<ConnectionEvent>) -> ConnectionState {
    loop {
        if let ConnectionEvent::StateChanged { state, .. } = next_event(rx).await {
            return state;
        }
    }
}

/// Waits for the next discovery result, returning the states seen on the way
pub async fn until_services(rx: &mut UnboundedReceiver<ConnectionEvent>) -> (Vec<ConnectionState>, ServiceTable) {
    let mut states = Vec::new();
    loop {
        match next_event(rx).await {
            ConnectionEvent::StateChanged { state, .. } => states.push(state),
            ConnectionEvent::ServicesDiscovered { status, services, .. } => {
                assert!(status.is_success());
                return (states, services);
            }
            _ => {}
        }
    }
}

/// Lets the manager's event loop drain without advancing the clock much
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
