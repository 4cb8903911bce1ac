// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram transport seam.
//!
//! The engine sends whole encoded packets through [`Transport`] and receives
//! raw bytes through a [`ReceiveCallback`] invoked from transport threads.
//! [`UdpTransport`] is the production implementation.

pub mod udp;

pub use udp::{UdpTransport, UdpTransportConfig};

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Instant;

use crate::adapter::{AdapterDescriptor, AdapterId};

/// Reception context of one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Remote endpoint the bytes came from.
    pub sender: SocketAddrV4,
    /// Local adapter address they arrived on.
    pub adapter: Ipv4Addr,
    pub reception_time: Instant,
}

/// Where an outbound packet goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendTarget {
    /// The discovery group, out of one adapter.
    Multicast { adapter: AdapterId },
    /// A single neighbour reachable through one adapter.
    Unicast { adapter: AdapterId, peer: Ipv4Addr },
}

impl SendTarget {
    pub fn adapter(&self) -> &AdapterId {
        match self {
            SendTarget::Multicast { adapter } | SendTarget::Unicast { adapter, .. } => adapter,
        }
    }
}

/// Raw inbound bytes: (payload, sender, local adapter address).
pub type ReceiveCallback = Arc<dyn Fn(&[u8], SocketAddrV4, Ipv4Addr) + Send + Sync>;

/// Transport errors.
#[derive(Debug)]
pub enum TransportError {
    Io(io::Error),
    /// Receive socket could not be bound.
    BindFailed { port: u16, source: io::Error },
    /// Joining the discovery group on an adapter failed.
    MulticastJoinFailed {
        group: Ipv4Addr,
        adapter: Ipv4Addr,
        source: io::Error,
    },
    SendFailed { target: SendTarget, source: io::Error },
    /// No send socket for the adapter.
    UnknownAdapter(AdapterId),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Io(err) => write!(f, "transport I/O error: {}", err),
            TransportError::BindFailed { port, source } => {
                write!(f, "failed to bind UDP port {}: {}", port, source)
            }
            TransportError::MulticastJoinFailed {
                group,
                adapter,
                source,
            } => write!(
                f,
                "failed to join multicast group {} on {}: {}",
                group, adapter, source
            ),
            TransportError::SendFailed { target, source } => {
                write!(f, "send to {:?} failed: {}", target, source)
            }
            TransportError::UnknownAdapter(id) => write!(f, "no transport for adapter {}", id),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(err)
            | TransportError::BindFailed { source: err, .. }
            | TransportError::MulticastJoinFailed { source: err, .. }
            | TransportError::SendFailed { source: err, .. } => Some(err),
            TransportError::UnknownAdapter(_) => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(err)
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Packet-oriented datagram transport.
pub trait Transport: Send + Sync {
    /// Send one encoded packet. Returns the number of bytes sent.
    fn send(&self, target: &SendTarget, bytes: &[u8]) -> TransportResult<usize>;

    /// Bring per-adapter resources in line with `adapters`.
    fn update_adapters(&self, adapters: &[AdapterDescriptor]) -> TransportResult<()>;

    /// Install the inbound callback, replacing any previous one.
    fn set_receive_callback(&self, callback: ReceiveCallback);
}
