//! The handle applications use to run discovery and control devices.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::device::{DiscoveredDevice, HandshakeState};
use crate::engine::{Action, SyncEngine};
use crate::errors::Error;
use crate::events::LanEvent;
use crate::heartbeat::Heartbeat;
use crate::network::{NetworkIdentity, select_identity};
use crate::options::{LanOptions, StartOptions};
use crate::payload::{self, Payload};
use crate::runtime;
use crate::status::DeviceState;
use crate::transport::{DatagramHandler, Recovery, RecoveryPolicy, Role, Transport};
use crate::types::ColorRGBW;

type Result<T> = std::result::Result<T, Error>;

/// Diagnostics for a [`LanComm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanDiagnostics {
    pub running: bool,
    pub listen_socket: Option<SocketAddr>,
    pub broadcast_socket: Option<SocketAddr>,
    pub listen_bind_attempts: u32,
    pub broadcast_bind_attempts: u32,
    pub known_devices: usize,
    pub synced_devices: usize,
    pub subscriber_count: usize,
    pub last_error: Option<String>,
}

/// Continuously discovers Wiz devices on the LAN and keeps their state in sync.
///
/// Cloning is cheap; every clone drives the same sockets and device set.
///
/// # Examples
///
/// ```no_run
/// use futures::StreamExt;
/// use wiz_lan::{LanComm, LanEvent, LanOptions, StartOptions};
///
/// # async fn run() -> Result<(), wiz_lan::Error> {
/// let lan = LanComm::new(LanOptions::default())?;
/// let mut events = lan.subscribe();
/// lan.start(StartOptions::default()).await;
///
/// while let Some(event) = events.next().await {
///     if let LanEvent::Discover { hardware_id, device } = event {
///         println!("{} is a {:?}", hardware_id, device.name());
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LanComm {
    inner: Arc<Inner>,
}

struct Inner {
    this: Weak<Inner>,
    options: LanOptions,
    policy: RecoveryPolicy,
    shared: Mutex<Shared>,
}

struct Shared {
    running: bool,
    engine: SyncEngine,
    transport: Transport,
    subscribers: Vec<UnboundedSender<LanEvent>>,
    heartbeat: Option<Heartbeat>,
}

impl LanComm {
    /// Pick a network identity for `options.bind_to` and set up the engine.
    ///
    /// Fails when the host has no usable IPv4 interface.
    pub fn new(options: LanOptions) -> Result<Self> {
        let identity = select_identity(options.bind_to)?;
        Ok(Self::with_identity(options, identity))
    }

    /// Set up the engine with an identity chosen by the caller.
    pub fn with_identity(options: LanOptions, identity: NetworkIdentity) -> Self {
        info!(
            "Initialized on network {} ({})",
            identity.address, identity.hardware_id
        );
        let inner = Arc::new_cyclic(|this| Inner {
            this: this.clone(),
            policy: RecoveryPolicy::new(&options),
            shared: Mutex::new(Shared {
                running: false,
                engine: SyncEngine::new(identity),
                transport: Transport::new(&options),
                subscribers: Vec::new(),
                heartbeat: None,
            }),
            options,
        });
        LanComm { inner }
    }

    pub fn identity(&self) -> NetworkIdentity {
        self.inner.lock().engine.identity().clone()
    }

    pub fn options(&self) -> &LanOptions {
        &self.inner.options
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }

    /// Receive every event emitted from now on.
    ///
    /// The stream ends after [`LanComm::end`].
    pub fn subscribe(&self) -> UnboundedReceiver<LanEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.inner.lock().subscribers.push(tx);
        rx
    }

    pub fn device(&self, hardware_id: &str) -> Option<DiscoveredDevice> {
        self.inner.lock().engine.device(hardware_id).cloned()
    }

    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.inner.lock().engine.devices().cloned().collect()
    }

    pub fn handshake_state(&self, hardware_id: &str) -> HandshakeState {
        self.inner.lock().engine.handshake_state(hardware_id)
    }

    /// Last state reported by a device, or `None` if it never reported one.
    pub fn get_state(&self, hardware_id: &str) -> Option<DeviceState> {
        self.inner
            .lock()
            .engine
            .device(hardware_id)
            .and_then(|device| device.state().cloned())
    }

    /// Last color reported by a device, if it reported all four channels.
    pub fn rgbw(&self, hardware_id: &str) -> Option<ColorRGBW> {
        self.inner
            .lock()
            .engine
            .device(hardware_id)
            .and_then(DiscoveredDevice::rgbw)
    }

    /// Send a `setPilot` command to a known device.
    ///
    /// Returns `false` if the device is unknown or there is no socket to send from.
    pub fn set_state(&self, hardware_id: &str, payload: &Payload) -> bool {
        let mut shared = self.inner.lock();
        match shared.engine.command(hardware_id, payload) {
            Some(action) => shared.dispatch(vec![action]) > 0,
            None => false,
        }
    }

    pub fn diagnostics(&self) -> LanDiagnostics {
        let shared = self.inner.lock();
        LanDiagnostics {
            running: shared.running,
            listen_socket: shared.transport.local_addr(Role::Listen),
            broadcast_socket: shared.transport.local_addr(Role::Broadcast),
            listen_bind_attempts: shared.transport.bind_attempts(Role::Listen),
            broadcast_bind_attempts: shared.transport.bind_attempts(Role::Broadcast),
            known_devices: shared.engine.devices().count(),
            synced_devices: shared
                .engine
                .devices()
                .filter(|device| device.handshake() == HandshakeState::Synced)
                .count(),
            subscriber_count: shared
                .subscribers
                .iter()
                .filter(|tx| !tx.is_closed())
                .count(),
            last_error: shared.transport.last_error().map(str::to_string),
        }
    }

    /// Open both sockets, announce this process and start the heartbeat.
    ///
    /// Completes once the LISTEN socket is bound, which may take several
    /// retries if its port is in use. Starting a running engine only applies
    /// `options.clear`.
    pub async fn start(&self, options: StartOptions) {
        {
            let mut shared = self.inner.lock();
            if options.clear {
                shared.engine.clear();
                shared.subscribers.clear();
            }
            if shared.running {
                return;
            }
            shared.running = true;
        }

        self.inner.open(Role::Listen);
        while !self.inner.is_bound(Role::Listen) {
            if !self.is_running() {
                return;
            }
            runtime::sleep(self.inner.options.bind_poll_interval).await;
        }

        self.inner.open(Role::Broadcast);

        let weak = Weak::clone(&self.inner.this);
        let heartbeat = Heartbeat::start(self.inner.options.heartbeat_interval, move || {
            weak.upgrade().is_some_and(|inner| inner.announce())
        });
        let mut shared = self.inner.lock();
        if shared.running {
            shared.heartbeat = Some(heartbeat);
        }
    }

    /// Close both sockets and stop announcing. Known devices are kept.
    pub fn stop(&self) {
        let mut shared = self.inner.lock();
        if shared.running {
            info!("Stopping");
        }
        shared.running = false;
        shared.heartbeat = None;
        shared.transport.shutdown();
    }

    /// Stop, forget every device, and end all subscriptions.
    pub fn end(&self) {
        self.stop();
        let mut shared = self.inner.lock();
        shared.engine.clear();
        shared.emit(LanEvent::End);
        shared.subscribers.clear();
        info!("Ended");
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_bound(&self, role: Role) -> bool {
        self.lock().transport.local_addr(role).is_some()
    }

    /// Bind `role`, scheduling a rebind if the port is taken.
    fn open(&self, role: Role) {
        let mut shared = self.lock();
        let port = shared.transport.port(role);

        match shared.transport.open(role, Weak::clone(&self.this)) {
            Ok(()) => {
                info!(
                    "Bound {} socket on {:?}",
                    role,
                    shared.transport.local_addr(role)
                );
                if role == Role::Broadcast {
                    let announcement = payload::registration(shared.engine.identity(), true);
                    shared.transport.send(&announcement, None);
                }
            }
            Err(Error::Socket { action, err }) => {
                shared.transport.record_error(&err.to_string());
                shared.transport.close(role);
                match self.policy.on_bind_error(&err) {
                    Recovery::Retry(delay) => {
                        error!("Port {} is in use. Will retry in {:?}", port, delay);
                        self.schedule_open(&mut shared, role, delay);
                    }
                    Recovery::GiveUp => {
                        error!("Failed to {} {} socket on port {}: {}", action, role, port, err);
                    }
                }
            }
            Err(e) => {
                shared.transport.record_error(&e.to_string());
                error!("Failed to open {} socket on port {}: {}", role, port, e);
            }
        }
    }

    fn schedule_open(&self, shared: &mut Shared, role: Role, delay: Duration) {
        let weak = Weak::clone(&self.this);
        let handle = runtime::spawn_abortable(async move {
            runtime::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.lock().running {
                inner.open(role);
            }
        });
        shared.transport.set_retry(role, handle);
    }

    /// Broadcast a registration. Returns `false` once the engine stopped.
    fn announce(&self) -> bool {
        let shared = self.lock();
        if !shared.running {
            return false;
        }
        let announcement = payload::registration(shared.engine.identity(), true);
        shared.transport.send(&announcement, None);
        true
    }
}

impl DatagramHandler for Inner {
    fn on_datagram(&self, role: Role, data: &[u8], from: SocketAddr) {
        let SocketAddr::V4(from) = from else {
            return;
        };
        debug!(
            "Received UDP on {} from {} < {}",
            role,
            from,
            String::from_utf8_lossy(data)
        );

        let mut shared = self.lock();
        let actions = shared.engine.handle_datagram(data, *from.ip());
        shared.dispatch(actions);
    }

    fn on_receive_error(&self, role: Role, generation: u64, err: io::Error) {
        let mut shared = self.lock();
        if !shared.transport.is_current(role, generation) {
            return;
        }
        shared.transport.record_error(&err.to_string());
        shared.transport.close(role);
        warn!("{} socket closed ({}). Restarting...", role, err);

        if let Some(delay) = self.policy.on_unexpected_close(shared.running) {
            self.schedule_open(&mut shared, role, delay);
        }
    }
}

impl Shared {
    /// Carry out engine actions. Returns how many datagrams were queued.
    fn dispatch(&mut self, actions: Vec<Action>) -> usize {
        let mut sent = 0;
        for action in actions {
            match action {
                Action::Send { message, to } => {
                    if self.transport.send(&message, Some(to)) {
                        sent += 1;
                    }
                }
                Action::Emit(event) => self.emit(event),
            }
        }
        sent
    }

    fn emit(&mut self, event: LanEvent) {
        self.subscribers
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}
