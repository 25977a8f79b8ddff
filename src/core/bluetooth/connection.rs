//! Bluetooth connection handling for health peripherals
//! This module owns the GATT session lifecycle: connecting, timeouts,
//! reconnection with backoff, service discovery and notification replay.
//!
//! All transport callbacks and timer firings are posted to one event loop task,
//! so state is only ever mutated by that task or by a public method holding the
//! same lock. Caller callbacks are queued while the lock is held and delivered
//! after it is released, which keeps them in transition order and lets them call
//! back into the manager.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::core::bluetooth::constants::UUID_CLIENT_CHARACTERISTIC_CONFIG;
use crate::core::bluetooth::device::DeviceIdentity;
use crate::core::bluetooth::events::ConnectionCallback;
use crate::core::bluetooth::notification::SubscriptionRegistry;
use crate::core::bluetooth::transport::{
    GattSession, GattTransport, ManagerEvent, TransportEvent, TransportEvents,
};
use crate::core::bluetooth::types::{
    ConnectionState, GattCharacteristic, GattStatus, ServiceTable, SubscriptionMode,
};
use crate::error::TransportError;

/// Connection manager for one health peripheral at a time
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    transport: Arc<dyn GattTransport>,
    config: ConnectionConfig,
    runtime: Handle,
    events: UnboundedSender<ManagerEvent>,
    inner: Mutex<Inner>,
    outbox: Mutex<Outbox>,
}

struct Inner {
    state: ConnectionState,
    device: Option<DeviceIdentity>,
    callback: Option<Arc<dyn ConnectionCallback>>,
    /// Id of the current session, 0 when none. Events from other ids are stale.
    session_id: u64,
    next_session_id: u64,
    session: Option<Arc<dyn GattSession>>,
    /// Bumped on every caller intent so queued reconnects from before it are dropped
    generation: u64,
    reconnect_attempts: u32,
    connect_timeout: Option<CancellationToken>,
    /// Discovery, reconnect and disconnect-guard timers
    timers: CancellationToken,
    services: ServiceTable,
    subscriptions: SubscriptionRegistry,
}

enum Notice {
    State(DeviceIdentity, ConnectionState),
    Services(DeviceIdentity, GattStatus, ServiceTable),
    Data(Uuid, Uuid, Vec<u8>),
    Exhausted(DeviceIdentity),
}

impl Notice {
    fn deliver(self, callback: &dyn ConnectionCallback) {
        match self {
            Notice::State(device, state) => callback.on_connection_state_change(&device, state),
            Notice::Services(device, status, services) => {
                callback.on_services_discovered(&device, status, &services)
            }
            Notice::Data(service, characteristic, data) => {
                callback.on_data_received(service, characteristic, &data)
            }
            Notice::Exhausted(device) => callback.on_reconnect_exhausted(&device),
        }
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<(Arc<dyn ConnectionCallback>, Notice)>,
    delivering: bool,
}

/// Clears the delivering flag if a callback panics mid-drain
struct DeliveryGuard<'a> {
    outbox: &'a Mutex<Outbox>,
    drained: bool,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        if !self.drained {
            self.outbox.lock().unwrap_or_else(PoisonError::into_inner).delivering = false;
        }
    }
}

impl ConnectionManager {
    /// Creates a manager with the default timing policy.
    /// Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn GattTransport>) -> Result<Self, TransportError> {
        Self::with_config(transport, ConnectionConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn GattTransport>,
        config: ConnectionConfig,
    ) -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            transport,
            config,
            runtime: runtime.clone(),
            events: tx,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                device: None,
                callback: None,
                session_id: 0,
                next_session_id: 0,
                session: None,
                generation: 0,
                reconnect_attempts: 0,
                connect_timeout: None,
                timers: CancellationToken::new(),
                services: ServiceTable::default(),
                subscriptions: SubscriptionRegistry::new(),
            }),
            outbox: Mutex::new(Outbox::default()),
        });

        runtime.spawn(run_event_loop(Arc::downgrade(&shared), rx));
        Ok(Self { shared })
    }

    /// Connects to `device`, reporting progress through `callback`.
    ///
    /// Returns `true` when the attempt was started (or the device is already
    /// connected) and `false` when the session could not even be opened.
    pub fn connect(&self, device: DeviceIdentity, callback: Arc<dyn ConnectionCallback>) -> bool {
        info!("Connecting to device: {}", device.address);
        if !device.is_valid() {
            error!("Refusing to connect to a device without an address");
            return false;
        }

        let pending = self.shared.with_inner(|shared, inner, notices| {
            if inner.state == ConnectionState::Connected && inner.device.as_ref() == Some(&device) {
                debug!("Already connected to this device");
                inner.callback = Some(callback);
                return None;
            }

            let same_device = inner.device.as_ref() == Some(&device);
            if inner.session.is_some() || inner.device.is_some() {
                info!("Closing existing connection before connecting");
                // a different peripheral starts from an empty subscription set
                shared.teardown(inner, notices, !same_device);
                // the previous caller hears about the teardown, not the new one
                shared.enqueue(inner.callback.clone(), std::mem::take(notices));
            }
            inner.callback = Some(callback);

            inner.generation += 1;
            inner.reconnect_attempts = 0;
            inner.device = Some(device);
            Some(shared.enter_connecting(inner, notices))
        });

        match pending {
            Some(session_id) => self.shared.open_session(session_id),
            None => true,
        }
    }

    /// Gracefully disconnects. No automatic reconnection follows.
    pub fn disconnect(&self) {
        let pending = self.shared.with_inner(|shared, inner, notices| {
            let active = matches!(
                inner.state,
                ConnectionState::Connected | ConnectionState::Connecting
            );
            if !active || inner.session.is_none() {
                debug!("Disconnect called but not in a connected state");
                if inner.reconnect_attempts > 0 {
                    info!("Cancelling pending reconnection");
                    shared.cancel_timers(inner);
                    inner.generation += 1;
                    inner.reconnect_attempts = 0;
                }
                return None;
            }

            info!("Disconnecting from device");
            shared.cancel_connect_timeout(inner);
            shared.cancel_timers(inner);
            inner.generation += 1;
            inner.reconnect_attempts = 0;
            inner.state = ConnectionState::Disconnecting;
            shared.spawn_timer(
                &inner.timers,
                shared.config.connect_timeout(),
                ManagerEvent::DisconnectTimeout { session: inner.session_id },
            );
            if let Some(device) = inner.device.clone() {
                notices.push(Notice::State(device, ConnectionState::Disconnecting));
            }
            Some(inner.session_id)
        });

        // DISCONNECTING has been delivered before the transport can answer.
        if let Some(session_id) = pending {
            let inner = self.shared.lock();
            if inner.session_id == session_id && inner.state == ConnectionState::Disconnecting {
                if let Some(session) = &inner.session {
                    session.disconnect();
                }
            }
        }
    }

    /// Hard teardown from any state: cancels timers and reconnects, releases the
    /// session and clears the subscription set. Safe to call repeatedly.
    pub fn close(&self) {
        self.shared.with_inner(|shared, inner, notices| {
            info!("Closing GATT connection");
            shared.teardown(inner, notices, true);
        });
    }

    /// Subscribes to value changes of a discovered characteristic.
    ///
    /// Indications are used when the characteristic supports them, otherwise
    /// notifications. The pair is remembered and restored after reconnects.
    pub fn enable_notifications(&self, service: Uuid, characteristic: Uuid) -> bool {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;

        if inner.state != ConnectionState::Connected {
            error!("Cannot enable notifications when not connected");
            return false;
        }
        let Some(session) = inner.session.clone() else {
            return false;
        };

        debug!("Enabling notifications for service: {}, char: {}", service, characteristic);
        let Some(service_entry) = inner.services.service(service) else {
            error!("Service not found: {}", service);
            return false;
        };
        let Some(found) = service_entry.characteristic(characteristic) else {
            error!("Characteristic not found: {}", characteristic);
            return false;
        };

        match subscribe(session.as_ref(), service, found) {
            Some(mode) => {
                inner.subscriptions.record(service, characteristic);
                debug!("Subscribed to {} using {:?}", characteristic, mode);
                true
            }
            None => false,
        }
    }

    /// Starts a read. The value arrives through `on_data_received`.
    pub fn read_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        let inner = self.shared.lock();

        if inner.state != ConnectionState::Connected {
            error!("Cannot read characteristic when not connected");
            return false;
        }
        let Some(session) = inner.session.as_ref() else {
            return false;
        };
        if inner.services.characteristic(service, characteristic).is_none() {
            error!("Characteristic not found: {} / {}", service, characteristic);
            return false;
        }
        session.read_characteristic(service, characteristic)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// The peripheral of the current session while it is connected
    pub fn connected_device(&self) -> Option<DeviceIdentity> {
        let inner = self.shared.lock();
        match inner.state {
            ConnectionState::Connected => inner.device.clone(),
            _ => None,
        }
    }

    /// Service table of the current session, once discovered
    pub fn available_services(&self) -> Option<ServiceTable> {
        let inner = self.shared.lock();
        match (&inner.session, inner.services.is_empty()) {
            (Some(_), false) => Some(inner.services.clone()),
            _ => None,
        }
    }

    /// Recorded (service, characteristic) subscriptions
    pub fn subscriptions(&self) -> Vec<(Uuid, Uuid)> {
        self.shared.lock().subscriptions.entries()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect_attempts
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        let mut discarded = Vec::new();
        self.shared.teardown(&mut inner, &mut discarded, true);
    }
}

async fn run_event_loop(shared: Weak<Shared>, mut rx: UnboundedReceiver<ManagerEvent>) {
    while let Some(event) = rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.handle_event(event);
    }
    debug!("Connection manager event loop stopped");
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` under the state lock, queues the notices it produced and then
    /// delivers them with the lock released.
    fn with_inner<R>(&self, f: impl FnOnce(&Shared, &mut Inner, &mut Vec<Notice>) -> R) -> R {
        let result = {
            let mut guard = self.lock();
            let mut notices = Vec::new();
            let result = f(self, &mut *guard, &mut notices);
            self.enqueue(guard.callback.clone(), notices);
            result
        };
        self.deliver();
        result
    }

    /// Queues notices for `callback`. Must be called with the state lock held
    /// so queue order matches transition order.
    fn enqueue(&self, callback: Option<Arc<dyn ConnectionCallback>>, notices: Vec<Notice>) {
        if notices.is_empty() {
            return;
        }
        match callback {
            Some(callback) => {
                let mut outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
                outbox
                    .queue
                    .extend(notices.into_iter().map(|n| (callback.clone(), n)));
            }
            None => debug!("No callback registered, dropping {} notice(s)", notices.len()),
        }
    }

    /// Drains the outbox unless another thread (or an outer frame of this one) already is.
    fn deliver(&self) {
        {
            let mut outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
            if outbox.delivering {
                return;
            }
            outbox.delivering = true;
        }
        let mut guard = DeliveryGuard { outbox: &self.outbox, drained: false };

        loop {
            let (callback, notice) = {
                let mut outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
                match outbox.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        // cleared under the same lock as the empty check
                        outbox.delivering = false;
                        break;
                    }
                }
            };
            notice.deliver(callback.as_ref());
        }
        guard.drained = true;
    }

    fn spawn_timer(&self, token: &CancellationToken, delay: Duration, event: ManagerEvent) {
        let token = token.clone();
        let tx = self.events.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(event);
                }
            }
        });
    }

    fn cancel_timers(&self, inner: &mut Inner) {
        inner.timers.cancel();
        inner.timers = CancellationToken::new();
    }

    fn cancel_connect_timeout(&self, inner: &mut Inner) {
        if let Some(token) = inner.connect_timeout.take() {
            token.cancel();
        }
    }

    /// Moves to CONNECTING under a fresh session id and arms the connection timeout.
    fn enter_connecting(&self, inner: &mut Inner, notices: &mut Vec<Notice>) -> u64 {
        inner.next_session_id += 1;
        let session_id = inner.next_session_id;
        inner.session_id = session_id;
        inner.state = ConnectionState::Connecting;

        self.cancel_connect_timeout(inner);
        let token = CancellationToken::new();
        self.spawn_timer(
            &token,
            self.config.connect_timeout(),
            ManagerEvent::ConnectTimeout { session: session_id },
        );
        inner.connect_timeout = Some(token);

        if let Some(device) = inner.device.clone() {
            notices.push(Notice::State(device, ConnectionState::Connecting));
        }
        session_id
    }

    /// Asks the transport for a session. Called after CONNECTING was delivered.
    fn open_session(&self, session_id: u64) -> bool {
        self.with_inner(|shared, inner, notices| {
            if inner.session_id != session_id || inner.state != ConnectionState::Connecting {
                debug!("Session {} superseded before it was opened", session_id);
                return true;
            }
            let Some(device) = inner.device.clone() else {
                return false;
            };

            debug!("Establishing connection to {}", device.address);
            let events = TransportEvents::new(session_id, shared.events.clone());
            match shared.transport.open_session(&device, events) {
                Ok(session) => {
                    inner.session = Some(session);
                    true
                }
                Err(e) => {
                    error!("Failed to open session to {}: {}", device.address, e);
                    shared.release_session(inner);
                    inner.state = ConnectionState::Disconnected;
                    notices.push(Notice::State(device, ConnectionState::Disconnected));
                    if inner.reconnect_attempts > 0 {
                        shared.schedule_reconnect(inner, notices);
                    }
                    false
                }
            }
        })
    }

    /// Closes the transport session and forgets its service table.
    fn release_session(&self, inner: &mut Inner) {
        self.cancel_connect_timeout(inner);
        if let Some(session) = inner.session.take() {
            session.close();
        }
        inner.session_id = 0;
        inner.services = ServiceTable::default();
    }

    fn teardown(&self, inner: &mut Inner, notices: &mut Vec<Notice>, clear_subscriptions: bool) {
        self.cancel_timers(inner);
        inner.generation += 1;
        self.release_session(inner);

        if inner.state != ConnectionState::Disconnected {
            if let Some(device) = inner.device.clone() {
                notices.push(Notice::State(device, ConnectionState::Disconnected));
            }
        }
        inner.state = ConnectionState::Disconnected;
        inner.reconnect_attempts = 0;
        inner.device = None;
        if clear_subscriptions {
            inner.subscriptions.clear();
        }
    }

    /// Schedules the next backoff step, or gives up once the budget is spent.
    fn schedule_reconnect(&self, inner: &mut Inner, notices: &mut Vec<Notice>) {
        if inner.reconnect_attempts < self.config.max_reconnect_attempts {
            inner.reconnect_attempts += 1;
            let delay = self.config.reconnect_delay(inner.reconnect_attempts);
            info!(
                "Scheduling reconnection attempt {} in {}ms",
                inner.reconnect_attempts,
                delay.as_millis()
            );
            self.spawn_timer(
                &inner.timers,
                delay,
                ManagerEvent::Reconnect { generation: inner.generation },
            );
        } else {
            warn!("Max reconnect attempts reached, giving up");
            if let Some(device) = inner.device.clone() {
                notices.push(Notice::Exhausted(device));
            }
            self.teardown(inner, notices, true);
        }
    }

    fn handle_event(&self, event: ManagerEvent) {
        match event {
            ManagerEvent::Transport { session, event } => self.on_transport_event(session, event),
            ManagerEvent::ConnectTimeout { session } => self.on_connect_timeout(session),
            ManagerEvent::DisconnectTimeout { session } => self.on_disconnect_timeout(session),
            ManagerEvent::DiscoverServices { session } => self.on_discover_services(session),
            ManagerEvent::Reconnect { generation } => self.on_reconnect(generation),
        }
    }

    fn on_transport_event(&self, session: u64, event: TransportEvent) {
        self.with_inner(|shared, inner, notices| {
            if session == 0 || session != inner.session_id {
                debug!("Ignoring event from stale session {}: {:?}", session, event);
                return;
            }

            match event {
                TransportEvent::Connected => shared.on_connected(inner, notices),
                TransportEvent::ConnectFailed { status } => shared.on_connect_failed(inner, notices, status),
                TransportEvent::Disconnected => shared.on_disconnected(inner, notices),
                TransportEvent::ServicesDiscovered { status, services } => {
                    shared.on_services_discovered(inner, notices, status, services)
                }
                TransportEvent::CharacteristicChanged { service, characteristic, value } => {
                    debug!("Characteristic changed: {}", characteristic);
                    notices.push(Notice::Data(service, characteristic, value));
                }
                TransportEvent::CharacteristicRead { service, characteristic, status, value } => {
                    if status.is_success() {
                        debug!("Characteristic read successful: {}", characteristic);
                        notices.push(Notice::Data(service, characteristic, value));
                    } else {
                        error!("Characteristic read failed with status: {}", status);
                    }
                }
                TransportEvent::DescriptorWritten { characteristic, descriptor, status, .. } => {
                    if status.is_success() {
                        debug!("Descriptor {} write successful for characteristic: {}", descriptor, characteristic);
                    } else {
                        warn!(
                            "Descriptor write failed with status: {} for characteristic: {}",
                            status, characteristic
                        );
                    }
                }
            }
        })
    }

    fn on_connected(&self, inner: &mut Inner, notices: &mut Vec<Notice>) {
        if inner.state != ConnectionState::Connecting {
            warn!("Ignoring link-up while {}", inner.state);
            return;
        }
        self.cancel_connect_timeout(inner);
        inner.state = ConnectionState::Connected;
        inner.reconnect_attempts = 0;

        let Some(device) = inner.device.clone() else {
            return;
        };
        info!("Connected to GATT server: {}", device.address);
        self.spawn_timer(
            &inner.timers,
            self.config.service_discovery_delay(),
            ManagerEvent::DiscoverServices { session: inner.session_id },
        );
        notices.push(Notice::State(device, ConnectionState::Connected));
    }

    fn on_connect_failed(&self, inner: &mut Inner, notices: &mut Vec<Notice>, status: GattStatus) {
        if inner.state != ConnectionState::Connecting {
            warn!("Ignoring connect failure while {}", inner.state);
            return;
        }
        error!("Connection failed with status: {}", status);
        self.release_session(inner);
        inner.state = ConnectionState::Disconnected;
        if let Some(device) = inner.device.clone() {
            notices.push(Notice::State(device, ConnectionState::Disconnected));
        }
        if inner.reconnect_attempts > 0 {
            self.schedule_reconnect(inner, notices);
        }
    }

    fn on_disconnected(&self, inner: &mut Inner, notices: &mut Vec<Notice>) {
        let previous = inner.state;
        if let Some(device) = inner.device.as_ref() {
            info!("Disconnected from GATT server: {}", device.address);
        }

        self.release_session(inner);
        inner.state = ConnectionState::Disconnected;
        if let Some(device) = inner.device.clone() {
            notices.push(Notice::State(device, ConnectionState::Disconnected));
        }

        match previous {
            ConnectionState::Disconnecting => {
                info!("Intentional disconnect, not attempting reconnection");
                self.cancel_timers(inner);
            }
            ConnectionState::Connected => self.schedule_reconnect(inner, notices),
            ConnectionState::Connecting if inner.reconnect_attempts > 0 => {
                self.schedule_reconnect(inner, notices)
            }
            _ => {}
        }
    }

    fn on_services_discovered(
        &self,
        inner: &mut Inner,
        notices: &mut Vec<Notice>,
        status: GattStatus,
        services: ServiceTable,
    ) {
        if inner.state != ConnectionState::Connected {
            debug!("Ignoring service discovery result while {}", inner.state);
            return;
        }
        let Some(device) = inner.device.clone() else {
            return;
        };

        if !status.is_success() {
            warn!("Service discovery failed with status: {}", status);
            notices.push(Notice::Services(device, status, services));
            return;
        }

        info!("Services discovered on {}", device.address);
        for service in services.services() {
            debug!("Service discovered: {}", service.uuid);
            for characteristic in &service.characteristics {
                debug!("  Characteristic: {}", characteristic.uuid);
            }
        }
        inner.services = services.clone();
        notices.push(Notice::Services(device, status, services));

        if let Some(session) = inner.session.clone() {
            let report = inner.subscriptions.replay(&inner.services, |service, characteristic| {
                subscribe(session.as_ref(), service, characteristic).is_some()
            });
            if !report.restored.is_empty() {
                info!("Restored {} notification(s)", report.restored.len());
            }
        }
    }

    fn on_connect_timeout(&self, session: u64) {
        self.with_inner(|shared, inner, notices| {
            if inner.session_id != session || inner.state != ConnectionState::Connecting {
                return;
            }
            error!(
                "Connection attempt timed out after {}ms",
                shared.config.connect_timeout_ms
            );
            shared.release_session(inner);
            inner.state = ConnectionState::Disconnected;
            if let Some(device) = inner.device.clone() {
                notices.push(Notice::State(device, ConnectionState::Disconnected));
            }
            if inner.reconnect_attempts > 0 {
                shared.schedule_reconnect(inner, notices);
            }
        });
    }

    fn on_disconnect_timeout(&self, session: u64) {
        self.with_inner(|shared, inner, notices| {
            if inner.session_id != session || inner.state != ConnectionState::Disconnecting {
                return;
            }
            warn!("Transport never confirmed the disconnect, forcing close");
            shared.release_session(inner);
            inner.state = ConnectionState::Disconnected;
            if let Some(device) = inner.device.clone() {
                notices.push(Notice::State(device, ConnectionState::Disconnected));
            }
        });
    }

    fn on_discover_services(&self, session: u64) {
        self.with_inner(|_, inner, notices| {
            if inner.session_id != session || inner.state != ConnectionState::Connected {
                return;
            }
            let (Some(session), Some(device)) = (inner.session.as_ref(), inner.device.clone()) else {
                return;
            };
            debug!("Discovering services...");
            if let Err(e) = session.discover_services() {
                error!("Error discovering services: {}", e);
                notices.push(Notice::Services(device, GattStatus::FAILURE, ServiceTable::default()));
            }
        });
    }

    fn on_reconnect(&self, generation: u64) {
        let pending = self.with_inner(|shared, inner, notices| {
            if generation != inner.generation
                || inner.state != ConnectionState::Disconnected
                || inner.session.is_some()
            {
                debug!("Dropping stale reconnection request");
                return None;
            }
            let device = inner.device.clone()?;
            info!(
                "Attempting reconnection {} to {}",
                inner.reconnect_attempts, device.address
            );
            Some(shared.enter_connecting(inner, notices))
        });

        if let Some(session_id) = pending {
            self.open_session(session_id);
        }
    }
}

/// Turns on local delivery and writes the CCCD for one characteristic.
fn subscribe(
    session: &dyn GattSession,
    service: Uuid,
    characteristic: &GattCharacteristic,
) -> Option<SubscriptionMode> {
    let Some(mode) = characteristic.properties.subscription_mode() else {
        error!(
            "Characteristic {} doesn't support notifications or indications",
            characteristic.uuid
        );
        return None;
    };
    if !characteristic.has_descriptor(UUID_CLIENT_CHARACTERISTIC_CONFIG) {
        error!("Client Config Descriptor not found for {}", characteristic.uuid);
        return None;
    }
    if !session.set_notification(service, characteristic.uuid, true) {
        error!("Failed to enable local notifications for {}", characteristic.uuid);
        return None;
    }
    if !session.write_descriptor(
        service,
        characteristic.uuid,
        UUID_CLIENT_CHARACTERISTIC_CONFIG,
        &mode.descriptor_value(),
    ) {
        error!("Failed to write descriptor for {}", characteristic.uuid);
        return None;
    }
    Some(mode)
}
