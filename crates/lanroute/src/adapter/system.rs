// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OS adapter enumeration via the `local_ip_address` crate.
//!
//! The portable listing only exposes (interface name, address) pairs, so MTU
//! and netmask fall back to [`DEFAULT_MTU`] and [`DEFAULT_NETMASK`].

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};

use super::{AdapterDescriptor, AdapterProvider};
use crate::config::{DEFAULT_MTU, DEFAULT_NETMASK};

/// Adapters reported by the operating system, loopback excluded.
#[derive(Debug, Clone)]
pub struct SystemAdapters {
    /// MTU assigned to every adapter.
    pub mtu: u32,
    /// Netmask assigned to every address.
    pub netmask: Ipv4Addr,
}

impl Default for SystemAdapters {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            netmask: DEFAULT_NETMASK,
        }
    }
}

impl AdapterProvider for SystemAdapters {
    fn adapters(&self) -> Vec<AdapterDescriptor> {
        let interfaces = match local_ip_address::list_afinet_netifas() {
            Ok(interfaces) => interfaces,
            Err(err) => {
                log::debug!("[adapter] failed to list network interfaces: {}", err);
                return Vec::new();
            }
        };
        let adapters = self.group(interfaces);
        log::debug!(
            "[adapter] discovered {} non-loopback adapters",
            adapters.len()
        );
        adapters
    }
}

impl SystemAdapters {
    /// One descriptor per interface name, IPv4 non-loopback addresses only.
    fn group(&self, interfaces: impl IntoIterator<Item = (String, IpAddr)>) -> Vec<AdapterDescriptor> {
        let mut by_name: BTreeMap<String, Vec<Ipv4Addr>> = BTreeMap::new();
        for (name, ip) in interfaces {
            if let IpAddr::V4(address) = ip {
                if !address.is_loopback() {
                    by_name.entry(name).or_default().push(address);
                }
            }
        }

        by_name
            .into_iter()
            .map(|(name, addresses)| {
                let mut adapter = AdapterDescriptor::new(name.clone(), name).with_mtu(self.mtu);
                for address in addresses {
                    adapter = adapter.with_address(address, self.netmask);
                }
                adapter
            })
            .collect()
    }
}
