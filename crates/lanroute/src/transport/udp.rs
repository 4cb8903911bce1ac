// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP transport for discovery multicast and data unicast.
//!
//! One receive socket bound to `0.0.0.0:port` joins the discovery group on
//! every usable adapter. Each adapter gets its own send socket bound to the
//! adapter address with `IP_MULTICAST_IF` set, so multicast leaves through
//! the right interface and unicast carries the right source address.
//!
//! The local address a datagram arrived on is not available from a plain
//! `recv_from`; it is resolved from the sender's subnet instead.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, Socket, Type};

use super::{ReceiveCallback, SendTarget, Transport, TransportError, TransportResult};
use crate::adapter::{AdapterAddress, AdapterDescriptor, AdapterId};
use crate::config::{NodeConfig, DEFAULT_MULTICAST_GROUP, DEFAULT_PORT, MAX_PACKET_SIZE};

/// Linux EADDRINUSE: group already joined on this interface.
const EADDRINUSE: i32 = 98;

#[derive(Debug, Clone)]
pub struct UdpTransportConfig {
    /// Port for both discovery multicast and data unicast; 0 picks an ephemeral port.
    pub port: u16,
    pub multicast_group: Ipv4Addr,
    pub multicast_ttl: u32,
    /// Receive thread wake-up period, bounds shutdown latency.
    pub read_timeout: Duration,
}

impl Default for UdpTransportConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            multicast_ttl: 1,
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl From<&NodeConfig> for UdpTransportConfig {
    fn from(config: &NodeConfig) -> Self {
        Self {
            port: config.port,
            multicast_group: config.multicast_group,
            ..Self::default()
        }
    }
}

/// Transport counters.
#[derive(Debug, Default)]
pub struct UdpMetrics {
    pub datagrams_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub datagrams_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    /// Sender on no adapter subnet, or one of our own send sockets.
    pub datagrams_dropped: AtomicU64,
    /// Receive callback panics caught.
    pub callback_errors: AtomicU64,
}

impl UdpMetrics {
    /// (received, bytes_received, sent, bytes_sent, dropped, callback_errors)
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64, u64) {
        (
            self.datagrams_received.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
            self.datagrams_sent.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.datagrams_dropped.load(Ordering::Relaxed),
            self.callback_errors.load(Ordering::Relaxed),
        )
    }
}

struct AdapterSocket {
    address: Ipv4Addr,
    socket: UdpSocket,
}

/// State shared with the receive thread.
#[derive(Default)]
struct Shared {
    callback: RwLock<Option<ReceiveCallback>>,
    /// Addresses of every active adapter, for recipient resolution.
    subnets: RwLock<Vec<AdapterAddress>>,
    /// Local endpoints of our send sockets; datagrams from them are echoes.
    own_endpoints: RwLock<Vec<SocketAddrV4>>,
    metrics: UdpMetrics,
}

/// UDP implementation of [`Transport`].
pub struct UdpTransport {
    config: UdpTransportConfig,
    /// Actual bound port.
    port: u16,
    receive_socket: Arc<UdpSocket>,
    senders: RwLock<HashMap<AdapterId, AdapterSocket>>,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    /// Bind the receive socket and start the receive thread.
    ///
    /// No group is joined until [`Transport::update_adapters`] is called.
    pub fn new(config: UdpTransportConfig) -> TransportResult<Self> {
        let receive_socket = bind_receive_socket(&config)?;
        let port = receive_socket.local_addr()?.port();
        log::debug!(
            "[udp] receive socket bound to 0.0.0.0:{} group={}",
            port,
            config.multicast_group
        );

        let receive_socket = Arc::new(receive_socket);
        let shared = Arc::new(Shared::default());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let socket = Arc::clone(&receive_socket);
            let shared = Arc::clone(&shared);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("lanroute-udp-rx".to_string())
                .spawn(move || receive_loop(&socket, &shared, &running))?
        };

        Ok(Self {
            config,
            port,
            receive_socket,
            senders: RwLock::new(HashMap::new()),
            shared,
            running,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn metrics(&self) -> &UdpMetrics {
        &self.shared.metrics
    }

    /// Adapters with an open send socket.
    pub fn active_adapters(&self) -> Vec<AdapterId> {
        let mut ids: Vec<AdapterId> = self.senders.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop the receive thread. Idempotent.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::warn!("[udp] receive thread panicked");
            }
            log::debug!("[udp] receive thread stopped");
        }
    }

    fn open_adapter(&self, adapter: &AdapterDescriptor, address: Ipv4Addr) -> TransportResult<AdapterSocket> {
        let group = self.config.multicast_group;
        match self.receive_socket.join_multicast_v4(&group, &address) {
            Ok(()) => log::debug!("[udp] joined {} on {} ({})", group, address, adapter.id),
            Err(err) if err.raw_os_error() == Some(EADDRINUSE) => {
                log::debug!("[udp] {} already joined on {}", group, address);
            }
            Err(source) => {
                return Err(TransportError::MulticastJoinFailed {
                    group,
                    adapter: address,
                    source,
                })
            }
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&SocketAddr::V4(SocketAddrV4::new(address, 0)).into())?;
        socket.set_multicast_if_v4(&address)?;
        socket.set_multicast_ttl_v4(self.config.multicast_ttl)?;
        socket.set_multicast_loop_v4(false)?;
        let socket: UdpSocket = socket.into();

        log::info!(
            "[udp] adapter {} active on {} (send port {})",
            adapter.id,
            address,
            socket.local_addr()?.port()
        );
        Ok(AdapterSocket { address, socket })
    }

    fn close_adapter(&self, id: &AdapterId, entry: &AdapterSocket) {
        if let Err(err) = self
            .receive_socket
            .leave_multicast_v4(&self.config.multicast_group, &entry.address)
        {
            log::debug!("[udp] leave {} on {} failed: {}", self.config.multicast_group, entry.address, err);
        }
        log::info!("[udp] adapter {} closed", id);
    }

    fn refresh_shared(&self, adapters: &[AdapterDescriptor]) {
        let senders = self.senders.read();
        *self.shared.subnets.write() = adapters
            .iter()
            .filter(|adapter| senders.contains_key(&adapter.id))
            .flat_map(|adapter| adapter.addresses.iter().copied())
            .collect();
        *self.shared.own_endpoints.write() = senders
            .values()
            .filter_map(|entry| match entry.socket.local_addr() {
                Ok(SocketAddr::V4(endpoint)) => Some(endpoint),
                _ => None,
            })
            .collect();
    }
}

impl Transport for UdpTransport {
    fn send(&self, target: &SendTarget, bytes: &[u8]) -> TransportResult<usize> {
        let senders = self.senders.read();
        let entry = senders
            .get(target.adapter())
            .ok_or_else(|| TransportError::UnknownAdapter(target.adapter().clone()))?;

        let destination = match target {
            SendTarget::Multicast { .. } => SocketAddrV4::new(self.config.multicast_group, self.port),
            SendTarget::Unicast { peer, .. } => SocketAddrV4::new(*peer, self.port),
        };

        let sent = entry
            .socket
            .send_to(bytes, destination)
            .map_err(|source| TransportError::SendFailed {
                target: target.clone(),
                source,
            })?;
        let metrics = &self.shared.metrics;
        metrics.datagrams_sent.fetch_add(1, Ordering::Relaxed);
        metrics.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        log::trace!("[udp] sent {} bytes to {} via {}", sent, destination, target.adapter());
        Ok(sent)
    }

    /// Open sockets for new usable adapters, close those that went away or
    /// changed address. Every adapter is attempted; the first error is returned.
    fn update_adapters(&self, adapters: &[AdapterDescriptor]) -> TransportResult<()> {
        let wanted: HashMap<&AdapterId, (&AdapterDescriptor, Ipv4Addr)> = adapters
            .iter()
            .filter(|adapter| adapter.is_usable())
            .filter_map(|adapter| {
                adapter
                    .primary_address()
                    .map(|address| (&adapter.id, (adapter, address)))
            })
            .collect();

        let mut result = Ok(());
        {
            let mut senders = self.senders.write();

            let stale: Vec<AdapterId> = senders
                .iter()
                .filter(|(id, entry)| {
                    wanted
                        .get(id)
                        .map_or(true, |(_, address)| *address != entry.address)
                })
                .map(|(id, _)| id.clone())
                .collect();
            for id in stale {
                if let Some(entry) = senders.remove(&id) {
                    self.close_adapter(&id, &entry);
                }
            }

            for (id, (adapter, address)) in wanted {
                if senders.contains_key(id) {
                    continue;
                }
                match self.open_adapter(adapter, address) {
                    Ok(entry) => {
                        senders.insert(id.clone(), entry);
                    }
                    Err(err) => {
                        log::warn!("[udp] cannot use adapter {}: {}", id, err);
                        if result.is_ok() {
                            result = Err(err);
                        }
                    }
                }
            }
        }

        self.refresh_shared(adapters);
        result
    }

    fn set_receive_callback(&self, callback: ReceiveCallback) {
        *self.shared.callback.write() = Some(callback);
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_receive_socket(config: &UdpTransportConfig) -> TransportResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket
        .bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port)).into())
        .map_err(|source| TransportError::BindFailed {
            port: config.port,
            source,
        })?;
    socket.set_multicast_loop_v4(false)?;
    socket.set_read_timeout(Some(config.read_timeout))?;
    Ok(socket.into())
}

/// Local address whose subnet contains `sender`.
fn resolve_recipient(subnets: &[AdapterAddress], sender: Ipv4Addr) -> Option<Ipv4Addr> {
    subnets
        .iter()
        .find(|entry| entry.contains(sender))
        .map(|entry| entry.address)
}

fn receive_loop(socket: &UdpSocket, shared: &Shared, running: &AtomicBool) {
    log::debug!("[udp] receive thread started");
    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let metrics = &shared.metrics;

    while running.load(Ordering::Acquire) {
        let (len, sender) = match socket.recv_from(&mut buf) {
            Ok((len, SocketAddr::V4(sender))) => (len, sender),
            Ok((_, SocketAddr::V6(_))) => continue,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(err) => {
                log::debug!("[udp] recv_from failed: {}", err);
                continue;
            }
        };

        metrics.datagrams_received.fetch_add(1, Ordering::Relaxed);
        metrics.bytes_received.fetch_add(len as u64, Ordering::Relaxed);

        if shared.own_endpoints.read().contains(&sender) {
            metrics.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        let Some(recipient) = resolve_recipient(&shared.subnets.read(), *sender.ip()) else {
            log::trace!("[udp] dropping {} bytes from {}: no matching adapter", len, sender);
            metrics.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
            continue;
        };
        let Some(callback) = shared.callback.read().clone() else {
            continue;
        };

        let bytes = &buf[..len];
        if catch_unwind(AssertUnwindSafe(|| callback(bytes, sender, recipient))).is_err() {
            metrics.callback_errors.fetch_add(1, Ordering::Relaxed);
            log::warn!("[udp] receive callback panicked on datagram from {}", sender);
        }
    }
    log::debug!("[udp] receive thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_NETMASK;
    use std::sync::mpsc;

    fn loopback_config() -> UdpTransportConfig {
        UdpTransportConfig {
            port: 0,
            read_timeout: Duration::from_millis(20),
            ..UdpTransportConfig::default()
        }
    }

    fn loopback_adapter() -> AdapterDescriptor {
        AdapterDescriptor::new("lo", "loopback")
            .with_address(Ipv4Addr::LOCALHOST, Ipv4Addr::new(255, 0, 0, 0))
    }

    #[test]
    fn test_resolve_recipient_by_subnet() {
        let subnets = vec![
            AdapterAddress::new(Ipv4Addr::new(10, 0, 0, 1), DEFAULT_NETMASK),
            AdapterAddress::new(Ipv4Addr::new(192, 168, 1, 1), DEFAULT_NETMASK),
        ];
        assert_eq!(
            resolve_recipient(&subnets, Ipv4Addr::new(192, 168, 1, 40)),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
        assert_eq!(resolve_recipient(&subnets, Ipv4Addr::new(172, 16, 0, 1)), None);
    }

    #[test]
    fn test_config_from_node_config() {
        let node = NodeConfig::default().with_port(9000);
        let config = UdpTransportConfig::from(&node);
        assert_eq!(config.port, 9000);
        assert_eq!(config.multicast_group, node.multicast_group);
        assert_eq!(config.multicast_ttl, 1);
    }

    #[test]
    fn test_send_to_unknown_adapter_fails() {
        let transport = UdpTransport::new(loopback_config()).expect("bind should succeed");
        let err = transport
            .send(
                &SendTarget::Multicast {
                    adapter: AdapterId::new("eth9"),
                },
                &[1, 2, 3],
            )
            .expect_err("unknown adapter should fail");
        assert!(matches!(err, TransportError::UnknownAdapter(_)));
    }

    #[test]
    fn test_loopback_receive_and_stop() {
        let transport = UdpTransport::new(loopback_config()).expect("bind should succeed");
        // Joining a group on loopback is platform-dependent; only the unicast path matters here.
        let _ = transport.update_adapters(&[loopback_adapter()]);

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        transport.set_receive_callback(Arc::new(move |bytes, sender, recipient| {
            let _ = tx.lock().send((bytes.to_vec(), sender, recipient));
        }));

        let peer = UdpSocket::bind("127.0.0.1:0").expect("peer bind should succeed");
        peer.send_to(&[0xAB; 12], ("127.0.0.1", transport.port()))
            .expect("peer send should succeed");

        if transport.active_adapters().is_empty() {
            // Multicast setup unavailable in this environment; nothing is routed.
            transport.stop();
            return;
        }

        let (bytes, sender, recipient) = rx
            .recv_timeout(Duration::from_secs(2))
            .expect("datagram should be delivered");
        assert_eq!(bytes, vec![0xAB; 12]);
        assert_eq!(sender.ip(), &Ipv4Addr::LOCALHOST);
        assert_eq!(recipient, Ipv4Addr::LOCALHOST);

        let sent = transport
            .send(
                &SendTarget::Unicast {
                    adapter: AdapterId::new("lo"),
                    peer: Ipv4Addr::LOCALHOST,
                },
                &[1, 2, 3],
            )
            .expect("unicast send should succeed");
        assert_eq!(sent, 3);

        transport.stop();
        transport.stop();
    }

    #[test]
    fn test_update_adapters_closes_removed() {
        let transport = UdpTransport::new(loopback_config()).expect("bind should succeed");
        if transport.update_adapters(&[loopback_adapter()]).is_err() {
            return;
        }
        assert_eq!(transport.active_adapters(), vec![AdapterId::new("lo")]);

        transport
            .update_adapters(&[])
            .expect("removing adapters should succeed");
        assert!(transport.active_adapters().is_empty());
    }

    #[test]
    fn test_unusable_adapters_are_skipped() {
        let transport = UdpTransport::new(loopback_config()).expect("bind should succeed");
        transport
            .update_adapters(&[
                AdapterDescriptor::new("down", "down")
                    .with_address(Ipv4Addr::LOCALHOST, DEFAULT_NETMASK)
                    .with_enabled(false),
                AdapterDescriptor::new("bare", "bare"),
            ])
            .expect("unusable adapters are ignored");
        assert!(transport.active_adapters().is_empty());
    }
}
