// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Local network adapters.
//!
//! Routes are learned and advertised per adapter. Enumeration itself is
//! OS-specific and sits behind [`AdapterProvider`]; the engine only consumes
//! [`AdapterDescriptor`] lists through the [`AdapterManager`].

pub mod manager;
pub mod system;

pub use manager::{AdapterChanges, AdapterManager};
pub use system::SystemAdapters;

use std::fmt;
use std::net::Ipv4Addr;

use crate::config::DEFAULT_MTU;

/// Stable identifier of one physical adapter (interface name or OS GUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterId(String);

impl AdapterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdapterId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One IPv4 address assigned to an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterAddress {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl AdapterAddress {
    pub fn new(address: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self { address, netmask }
    }

    /// True if `peer` is on this address's subnet.
    pub fn contains(&self, peer: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        u32::from(self.address) & mask == u32::from(peer) & mask
    }
}

/// Snapshot of one local network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDescriptor {
    pub id: AdapterId,
    pub name: String,
    pub enabled: bool,
    pub multicast_capable: bool,
    pub mtu: u32,
    pub addresses: Vec<AdapterAddress>,
    pub gateway: Option<Ipv4Addr>,
}

impl AdapterDescriptor {
    /// Enabled, multicast-capable adapter with the default MTU and no addresses.
    pub fn new(id: impl Into<AdapterId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            multicast_capable: true,
            mtu: DEFAULT_MTU,
            addresses: Vec::new(),
            gateway: None,
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        self.addresses.push(AdapterAddress::new(address, netmask));
        self
    }

    #[must_use]
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    #[must_use]
    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_multicast(mut self, multicast_capable: bool) -> Self {
        self.multicast_capable = multicast_capable;
        self
    }

    /// First assigned address; used as the source of outgoing traffic.
    pub fn primary_address(&self) -> Option<Ipv4Addr> {
        self.addresses.first().map(|entry| entry.address)
    }

    pub fn has_address(&self, address: Ipv4Addr) -> bool {
        self.addresses.iter().any(|entry| entry.address == address)
    }

    /// Enabled, multicast-capable and addressed: discovery can run on it.
    pub fn is_usable(&self) -> bool {
        self.enabled && self.multicast_capable && !self.addresses.is_empty()
    }
}

impl From<String> for AdapterId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Source of adapter descriptors (OS enumeration, static list, test fixture).
pub trait AdapterProvider: Send + Sync {
    fn adapters(&self) -> Vec<AdapterDescriptor>;
}

/// Provider returning a fixed list.
#[derive(Debug, Clone, Default)]
pub struct StaticAdapters(pub Vec<AdapterDescriptor>);

impl AdapterProvider for StaticAdapters {
    fn adapters(&self) -> Vec<AdapterDescriptor> {
        self.0.clone()
    }
}
