// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! lanroute configuration - single source of truth
//!
//! Protocol constants live here and nowhere else.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: compile-time constants (wire layout, hop cost, timers)
//! - **Level 2 (Dynamic)**: [`NodeConfig`], chosen once per node, with
//!   environment overrides (`LANROUTE_*`)
//!
//! # Example
//!
//! ```
//! use lanroute::config::{NodeConfig, DISCOVERY_INTERVAL};
//!
//! let config = NodeConfig::default().with_node_id(1024);
//! assert_eq!(config.discovery_interval, DISCOVERY_INTERVAL);
//! config.validate().expect("default config is valid");
//! ```

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::{Error, Result};

// =======================================================================
// Wire layout
// =======================================================================

/// Packet envelope fixed fields: `total_size:u32 | message_count:u16 | ... | checksum:u32`.
///
/// A stream backlog shorter than this can never hold a complete packet.
pub const PACKET_HEADER_SIZE: usize = 4 + 2 + 4;

/// Size of the trailing checksum field.
pub const PACKET_CHECKSUM_SIZE: usize = 4;

/// Largest `total_size` a packet may declare: one maximum UDP datagram.
///
/// A larger declared size can never complete and is treated as corruption.
pub const MAX_PACKET_SIZE: usize = 65_536;

/// Per-message header: `size:u32 | type:u16`.
pub const MESSAGE_HEADER_SIZE: usize = 4 + 2;

/// Wire type tag of a discovery message.
pub const MESSAGE_TYPE_DISCOVERY: u16 = 1;

/// Wire type tag of a data message.
pub const MESSAGE_TYPE_DATA: u16 = 2;

// =======================================================================
// Routing
// =======================================================================

/// Cost contributed by one hop. Route cost is the sum of its jump path.
pub const HOP_COST: u16 = 256;

/// A non-persistent route goes offline after this much discovery and data silence.
pub const ROUTE_TIMEOUT: Duration = Duration::from_secs(90);

/// Period between two discovery rounds.
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(20);

/// Cadence of the polling loop driving drain/update/tick.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(250);

/// A stream reassembler that has not received anything for this long is dropped.
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

// =======================================================================
// Network defaults
// =======================================================================

/// UDP port shared by discovery multicast and data unicast.
pub const DEFAULT_PORT: u16 = 7171;

/// Administratively scoped multicast group used for discovery.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 71, 71);

/// MTU assumed when the OS listing does not report one.
pub const DEFAULT_MTU: u32 = 1500;

/// Netmask assumed when the OS listing does not report one.
pub const DEFAULT_NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// IPv4 header (20) + UDP header (8).
pub const IP_UDP_OVERHEAD: u32 = 28;

// =======================================================================
// Runtime configuration
// =======================================================================

/// Per-node runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Identifier announced in every discovery message.
    pub node_id: u16,
    /// UDP port for discovery and data traffic.
    pub port: u16,
    /// Multicast group for discovery.
    pub multicast_group: Ipv4Addr,
    /// Polling loop cadence.
    pub poll_period: Duration,
    /// Discovery period. Fixed for the lifetime of a scheduler.
    pub discovery_interval: Duration,
    /// Idle time after which a stream reassembler is dropped.
    pub stream_idle_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            port: DEFAULT_PORT,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            poll_period: DEFAULT_POLL_PERIOD,
            discovery_interval: DISCOVERY_INTERVAL,
            stream_idle_timeout: STREAM_IDLE_TIMEOUT,
        }
    }
}

impl NodeConfig {
    /// Defaults overlaid with `LANROUTE_NODE_ID`, `LANROUTE_PORT`,
    /// `LANROUTE_MULTICAST_GROUP` and `LANROUTE_POLL_MS`.
    ///
    /// Unparsable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(id) = env_parse::<u16>("LANROUTE_NODE_ID") {
            config.node_id = id;
        }
        if let Some(port) = env_parse::<u16>("LANROUTE_PORT") {
            config.port = port;
        }
        if let Some(group) = env_parse::<Ipv4Addr>("LANROUTE_MULTICAST_GROUP") {
            config.multicast_group = group;
        }
        if let Some(ms) = env_parse::<u64>("LANROUTE_POLL_MS") {
            config.poll_period = Duration::from_millis(ms);
        }
        config
    }

    #[must_use]
    pub fn with_node_id(mut self, node_id: u16) -> Self {
        self.node_id = node_id;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_multicast_group(mut self, group: Ipv4Addr) -> Self {
        self.multicast_group = group;
        self
    }

    #[must_use]
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    #[must_use]
    pub fn with_discovery_interval(mut self, interval: Duration) -> Self {
        self.discovery_interval = interval;
        self
    }

    #[must_use]
    pub fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_period.is_zero() {
            return Err(Error::Config("poll period must be non-zero".into()));
        }
        if self.discovery_interval.is_zero() {
            return Err(Error::Config("discovery interval must be non-zero".into()));
        }
        if !self.multicast_group.is_multicast() {
            return Err(Error::Config(format!(
                "{} is not a multicast group",
                self.multicast_group
            )));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            log::debug!("[config] {} override: {}", key, raw.trim());
            Some(value)
        }
        Err(err) => {
            log::warn!("[config] ignoring invalid {}='{}': {}", key, raw, err);
            None
        }
    }
}
