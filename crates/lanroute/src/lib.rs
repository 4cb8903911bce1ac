// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # lanroute - LAN node discovery and route propagation
//!
//! Nodes on a local network announce themselves over UDP multicast every
//! few seconds, re-advertise the routes they have learned, and build a
//! per-adapter table of every reachable node with a hop-cost path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lanroute::{Node, NodeConfig, NodeRunner, SystemAdapters, UdpTransport, UdpTransportConfig};
//!
//! fn main() -> lanroute::Result<()> {
//!     let config = NodeConfig::from_env().with_node_id(42);
//!     let transport = Arc::new(UdpTransport::new(UdpTransportConfig::from(&config))?);
//!
//!     let mut node = Node::new(config.clone(), transport)?;
//!     node.refresh_adapters(&SystemAdapters::default())?;
//!
//!     let node = Arc::new(parking_lot::Mutex::new(node));
//!     let _runner = NodeRunner::spawn(Arc::clone(&node), config.poll_period)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  engine     Node::poll | DiscoveryScheduler | NodeListener | Runner |
//! +---------------------------------------------------------------------+
//! |  routing    RouteManager: ingest, liveness, split-horizon selection |
//! +---------------------------------------------------------------------+
//! |  stream     DataHandler (per sender/recipient) -> DataStream        |
//! +---------------------------------------------------------------------+
//! |  protocol   packet / message codec, MD5-derived checksum            |
//! |  core::ser  big-endian Buffer                                       |
//! +---------------------------------------------------------------------+
//! |  transport  Transport trait, UdpTransport      adapter  Adapters    |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`protocol`] - wire format
//! - [`stream`] - stream reassembly and demultiplexing
//! - [`routing`] - route table
//! - [`engine`] - node wiring, discovery scheduling
//! - [`transport`] - datagram transport
//! - [`adapter`] - local network adapters
//! - [`config`] - constants and runtime configuration

pub mod adapter;
pub mod config;
pub mod core;
pub mod engine;
pub mod protocol;
pub mod routing;
pub mod stream;
pub mod transport;

pub use adapter::{
    AdapterDescriptor, AdapterId, AdapterManager, AdapterProvider, StaticAdapters, SystemAdapters,
};
pub use config::NodeConfig;
pub use crate::core::ser::{Buffer, CodecError, CodecResult};
pub use engine::{DiscoveryScheduler, Node, NodeListener, NodeRunner, NullListener, PollStats};
pub use protocol::{DataMessage, DiscoveryMessage, Message, NodeEntry, Packet};
pub use routing::{NodeIdentifier, Route, RouteError, RouteIdentifier, RouteManager};
pub use stream::{DataHandler, DataStream, StreamKey};
pub use transport::{
    NetworkInfo, ReceiveCallback, SendTarget, Transport, TransportError, UdpTransport,
    UdpTransportConfig,
};

use std::fmt;

/// Crate-level error.
#[derive(Debug)]
pub enum Error {
    /// Encoding or decoding failed.
    Codec(CodecError),
    /// Route table rejected the operation.
    Route(RouteError),
    /// Socket or send failure.
    Transport(TransportError),
    /// Invalid configuration.
    Config(String),
    /// OS failure outside the transport, such as spawning the poll thread.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Codec(err) => write!(f, "codec error: {}", err),
            Error::Route(err) => write!(f, "routing error: {}", err),
            Error::Transport(err) => write!(f, "transport error: {}", err),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Codec(err) => Some(err),
            Error::Route(err) => Some(err),
            Error::Transport(err) => Some(err),
            Error::Config(_) => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Error::Codec(err)
    }
}

impl From<RouteError> for Error {
    fn from(err: RouteError) -> Self {
        Error::Route(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
