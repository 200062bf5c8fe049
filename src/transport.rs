//! UDP sockets shared by discovery and control.
//!
//! Two sockets are kept open, identified by [`Role`]. Devices push state
//! reports to the LISTEN port; everything this process sends leaves from the
//! BROADCAST port, which is also where devices answer requests.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::AbortHandle;
use log::{debug, error, warn};
use serde_json::Value;
use socket2::{Domain, Protocol, Socket, Type};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::errors::Error;
use crate::options::LanOptions;
use crate::runtime::{self, AsyncUdpSocket, UdpSocket};

/// Largest datagram accepted from a device.
const MAX_DATAGRAM: usize = 4096;

/// Which of the two sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub(crate) enum Role {
    /// Receives pushed state reports.
    #[strum(serialize = "listen")]
    Listen,
    /// Source of all outbound traffic and destination of replies.
    #[strum(serialize = "broadcast")]
    Broadcast,
}

/// What to do after a socket failed to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// Try the whole open sequence again after the delay.
    Retry(Duration),
    /// Leave the socket closed.
    GiveUp,
}

/// Fixed-delay recovery rules, applied to each role independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecoveryPolicy {
    pub address_in_use_retry: Duration,
    pub reopen_delay: Duration,
}

impl RecoveryPolicy {
    pub fn new(options: &LanOptions) -> Self {
        RecoveryPolicy {
            address_in_use_retry: options.address_in_use_retry,
            reopen_delay: options.reopen_delay,
        }
    }

    pub fn on_bind_error(&self, err: &io::Error) -> Recovery {
        if err.kind() == io::ErrorKind::AddrInUse {
            Recovery::Retry(self.address_in_use_retry)
        } else {
            Recovery::GiveUp
        }
    }

    /// Delay before reopening a socket that closed on its own.
    pub fn on_unexpected_close(&self, running: bool) -> Option<Duration> {
        running.then_some(self.reopen_delay)
    }
}

/// Receives what the sockets pick up.
pub(crate) trait DatagramHandler: Send + Sync + 'static {
    fn on_datagram(&self, role: Role, data: &[u8], from: SocketAddr);

    /// The receive loop of socket `generation` failed and has stopped.
    fn on_receive_error(&self, role: Role, generation: u64, err: io::Error);
}

struct Outbound {
    data: Vec<u8>,
    to: SocketAddr,
}

struct Slot {
    socket: Arc<UdpSocket>,
    generation: u64,
    outbound: Option<UnboundedSender<Outbound>>,
    tasks: Vec<AbortHandle>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.tasks.iter().for_each(AbortHandle::abort);
    }
}

/// Open sockets, pending rebinds and bind statistics.
pub(crate) struct Transport {
    listen_port: u16,
    broadcast_port: u16,
    device_port: u16,
    broadcast_address: Ipv4Addr,
    slots: HashMap<Role, Slot>,
    retries: HashMap<Role, AbortHandle>,
    attempts: HashMap<Role, u32>,
    generation: u64,
    last_error: Option<String>,
}

impl Transport {
    pub fn new(options: &LanOptions) -> Self {
        Transport {
            listen_port: options.listen_port,
            broadcast_port: options.broadcast_port,
            device_port: options.device_port,
            broadcast_address: options.broadcast_address,
            slots: HashMap::new(),
            retries: HashMap::new(),
            attempts: HashMap::new(),
            generation: 0,
            last_error: None,
        }
    }

    pub fn port(&self, role: Role) -> u16 {
        match role {
            Role::Listen => self.listen_port,
            Role::Broadcast => self.broadcast_port,
        }
    }

    /// Bind the socket for `role`, replacing any socket it already has.
    ///
    /// Incoming datagrams are handed to `handler` for as long as it is alive.
    pub fn open<H: DatagramHandler>(&mut self, role: Role, handler: Weak<H>) -> Result<(), Error> {
        self.close(role);
        self.cancel_retry(role);
        *self.attempts.entry(role).or_default() += 1;

        let socket = bind_socket(self.port(role))
            .and_then(UdpSocket::from_std)
            .map_err(|e| Error::socket("bind", e))?;
        if role == Role::Broadcast {
            socket
                .set_broadcast(true)
                .map_err(|e| Error::socket("set_broadcast", e))?;
        }
        let socket = Arc::new(socket);

        self.generation += 1;
        let generation = self.generation;
        let mut tasks = vec![runtime::spawn_abortable(receive_loop(
            Arc::clone(&socket),
            role,
            generation,
            handler,
        ))];

        let outbound = (role == Role::Broadcast).then(|| {
            let (tx, rx) = mpsc::unbounded();
            tasks.push(runtime::spawn_abortable(send_loop(Arc::clone(&socket), rx)));
            tx
        });

        self.slots.insert(
            role,
            Slot {
                socket,
                generation,
                outbound,
                tasks,
            },
        );
        Ok(())
    }

    /// Release the socket for `role`. Closing a closed socket does nothing.
    pub fn close(&mut self, role: Role) {
        if self.slots.remove(&role).is_some() {
            debug!("Closed {} socket on port {}", role, self.port(role));
        }
    }

    /// Close every socket and cancel pending rebinds.
    pub fn shutdown(&mut self) {
        for role in Role::iter() {
            self.close(role);
        }
        self.retries
            .drain()
            .for_each(|(_, handle)| handle.abort());
    }

    /// Remember a scheduled rebind so it can be cancelled.
    pub fn set_retry(&mut self, role: Role, handle: AbortHandle) {
        if let Some(previous) = self.retries.insert(role, handle) {
            previous.abort();
        }
    }

    fn cancel_retry(&mut self, role: Role) {
        if let Some(handle) = self.retries.remove(&role) {
            handle.abort();
        }
    }

    pub fn is_current(&self, role: Role, generation: u64) -> bool {
        self.slots
            .get(&role)
            .is_some_and(|slot| slot.generation == generation)
    }

    #[cfg(test)]
    pub fn generation(&self, role: Role) -> Option<u64> {
        self.slots.get(&role).map(|slot| slot.generation)
    }

    pub fn local_addr(&self, role: Role) -> Option<SocketAddr> {
        self.slots
            .get(&role)
            .and_then(|slot| slot.socket.local_addr().ok())
    }

    pub fn bind_attempts(&self, role: Role) -> u32 {
        self.attempts.get(&role).copied().unwrap_or(0)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn record_error(&mut self, error: &str) {
        self.last_error = Some(error.to_string());
    }

    /// Queue `message` for a device, or for the broadcast address when `to` is `None`.
    ///
    /// Returns `false` when there is no BROADCAST socket to send from.
    pub fn send(&self, message: &Value, to: Option<Ipv4Addr>) -> bool {
        let Some(outbound) = self
            .slots
            .get(&Role::Broadcast)
            .and_then(|slot| slot.outbound.as_ref())
        else {
            error!("No socket to send {}", message["method"]);
            return false;
        };

        let data = match serde_json::to_vec(message) {
            Ok(data) => data,
            Err(e) => {
                warn!("{}", Error::JsonDump(e));
                return false;
            }
        };

        let destination = to.unwrap_or(self.broadcast_address);
        if to.is_some() {
            debug!("Sending UDP to {} > {}", destination, message);
        } else {
            debug!("Broadcasting UDP > {}", message);
        }

        outbound
            .unbounded_send(Outbound {
                data,
                to: SocketAddr::V4(SocketAddrV4::new(destination, self.device_port)),
            })
            .is_ok()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Create a non-blocking IPv4 UDP socket with address reuse, bound to all interfaces.
pub(crate) fn bind_socket(port: u16) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&socket2::SockAddr::from(bind_addr))?;
    Ok(std::net::UdpSocket::from(socket))
}

async fn receive_loop<H: DatagramHandler>(
    socket: Arc<UdpSocket>,
    role: Role,
    generation: u64,
    handler: Weak<H>,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];
    loop {
        let result = socket.recv_from(&mut buffer).await;
        let Some(handler) = handler.upgrade() else {
            return;
        };
        match result {
            Ok((size, from)) => handler.on_datagram(role, &buffer[..size], from),
            Err(e) => {
                handler.on_receive_error(role, generation, e);
                return;
            }
        }
    }
}

async fn send_loop(socket: Arc<UdpSocket>, mut outbound: UnboundedReceiver<Outbound>) {
    while let Some(Outbound { data, to }) = outbound.next().await {
        if let Err(e) = socket.send_to(&data, to).await {
            warn!("Failed to send UDP to {}: {}", to, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn policy() -> RecoveryPolicy {
        RecoveryPolicy::new(&LanOptions::default())
    }

    #[test]
    fn test_address_in_use_retries_after_fixed_delay() {
        let err = io::Error::from(io::ErrorKind::AddrInUse);
        assert_eq!(
            policy().on_bind_error(&err),
            Recovery::Retry(Duration::from_secs(15))
        );
    }

    #[test]
    fn test_other_bind_errors_give_up() {
        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(policy().on_bind_error(&err), Recovery::GiveUp);
    }

    #[test]
    fn test_unexpected_close_reopens_only_while_running() {
        assert_eq!(
            policy().on_unexpected_close(true),
            Some(Duration::from_secs(1))
        );
        assert_eq!(policy().on_unexpected_close(false), None);
    }

    #[test]
    fn test_bind_socket_reuses_address() {
        let first = bind_socket(0).unwrap();
        let port = first.local_addr().unwrap().port();
        // Both sockets enable address reuse, so the second bind succeeds.
        let second = bind_socket(port).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[test]
    fn test_bind_conflict_reports_address_in_use() {
        let blocker = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = blocker.local_addr().unwrap().port();
        let err = bind_socket(port).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }

    #[derive(Default)]
    struct Recorder {
        datagrams: Mutex<Vec<(Role, Vec<u8>)>>,
    }

    impl DatagramHandler for Recorder {
        fn on_datagram(&self, role: Role, data: &[u8], _from: SocketAddr) {
            self.datagrams.lock().unwrap().push((role, data.to_vec()));
        }

        fn on_receive_error(&self, _role: Role, _generation: u64, _err: io::Error) {}
    }

    fn loopback_options() -> LanOptions {
        LanOptions {
            listen_port: 0,
            broadcast_port: 0,
            broadcast_address: Ipv4Addr::LOCALHOST,
            ..LanOptions::default()
        }
    }

    #[tokio::test]
    async fn test_send_without_broadcast_socket_is_a_no_op() {
        let transport = Transport::new(&loopback_options());
        assert!(!transport.send(&serde_json::json!({"method": "getPilot"}), None));
    }

    #[tokio::test]
    async fn test_open_receive_and_close() {
        let recorder = Arc::new(Recorder::default());
        let mut transport = Transport::new(&loopback_options());

        transport.open(Role::Listen, Arc::downgrade(&recorder)).unwrap();
        let addr = transport.local_addr(Role::Listen).unwrap();
        assert_eq!(transport.bind_attempts(Role::Listen), 1);

        let peer = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        peer.send_to(b"{}", ("127.0.0.1", addr.port())).unwrap();

        for _ in 0..50 {
            if !recorder.datagrams.lock().unwrap().is_empty() {
                break;
            }
            runtime::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            recorder.datagrams.lock().unwrap().as_slice(),
            &[(Role::Listen, b"{}".to_vec())]
        );

        transport.close(Role::Listen);
        transport.close(Role::Listen);
        assert!(transport.local_addr(Role::Listen).is_none());
    }

    #[tokio::test]
    async fn test_send_from_broadcast_socket() {
        let recorder = Arc::new(Recorder::default());
        let device = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        device
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let options = LanOptions {
            device_port: device.local_addr().unwrap().port(),
            ..loopback_options()
        };
        let mut transport = Transport::new(&options);
        transport
            .open(Role::Broadcast, Arc::downgrade(&recorder))
            .unwrap();
        let source = transport.local_addr(Role::Broadcast).unwrap();

        let message = serde_json::json!({"method": "getPilot", "params": {}});
        assert!(transport.send(&message, Some(Ipv4Addr::LOCALHOST)));

        let received = tokio::task::spawn_blocking(move || {
            let mut buffer = [0u8; 512];
            let (size, from) = device.recv_from(&mut buffer).unwrap();
            (buffer[..size].to_vec(), from)
        })
        .await
        .unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&received.0).unwrap(), message);
        assert_eq!(received.1.port(), source.port());
    }
}
