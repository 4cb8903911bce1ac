// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic discovery transmission.
//!
//! Every interval, each usable adapter gets one or more discovery packets
//! listing the routes selected for it by
//! [`RouteManager::routes_to_advertise`], each path extended by one
//! [`HOP_COST`]. Lists that would exceed the adapter MTU are split across
//! packets.

use std::time::{Duration, Instant};

use crate::adapter::{AdapterDescriptor, AdapterManager};
use crate::config::{
    DISCOVERY_INTERVAL, HOP_COST, IP_UDP_OVERHEAD, MESSAGE_HEADER_SIZE, PACKET_HEADER_SIZE,
};
use crate::protocol::{encode_packet_to_vec, DiscoveryMessage, NodeEntry, Packet};
use crate::routing::RouteManager;
use crate::transport::{SendTarget, Transport};

/// Discovery header bytes ahead of the node list: identifier + node_count.
const DISCOVERY_FIXED_BODY: usize = 4;

/// Fixed-interval discovery sender.
#[derive(Debug, Clone)]
pub struct DiscoveryScheduler {
    interval: Duration,
    last_discovery_time: Option<Instant>,
    rounds: u64,
}

impl Default for DiscoveryScheduler {
    fn default() -> Self {
        Self::new(DISCOVERY_INTERVAL)
    }
}

impl DiscoveryScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_discovery_time: None,
            rounds: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_discovery_time(&self) -> Option<Instant> {
        self.last_discovery_time
    }

    /// Completed discovery rounds.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// True if a round should run at `now`.
    ///
    /// A `now` before the last send is never due.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_discovery_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Run a discovery round if one is due. Returns the number of packets sent.
    pub fn tick<T: Transport + ?Sized>(
        &mut self,
        now: Instant,
        node_id: u16,
        routes: &RouteManager,
        adapters: &AdapterManager,
        transport: &T,
    ) -> usize {
        if !self.is_due(now) {
            return 0;
        }
        if let Some(last) = self.last_discovery_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed > self.interval * 2 {
                log::info!(
                    "[scheduler] {:?} since last discovery (interval {:?}), resuming",
                    elapsed,
                    self.interval
                );
            }
        }

        let mut sent = 0;
        for adapter in adapters.usable() {
            sent += self.send_on_adapter(node_id, adapter, routes, transport);
        }

        self.last_discovery_time = Some(now);
        self.rounds += 1;
        log::debug!(
            "[scheduler] round {} sent {} discovery packets",
            self.rounds,
            sent
        );
        sent
    }

    fn send_on_adapter<T: Transport + ?Sized>(
        &self,
        node_id: u16,
        adapter: &AdapterDescriptor,
        routes: &RouteManager,
        transport: &T,
    ) -> usize {
        let entries: Vec<NodeEntry> = routes
            .routes_to_advertise(&adapter.id)
            .iter()
            .map(|route| route.to_node_entry(HOP_COST))
            .collect();
        let budget = adapter.mtu.saturating_sub(IP_UDP_OVERHEAD) as usize;
        let target = SendTarget::Multicast {
            adapter: adapter.id.clone(),
        };

        let mut sent = 0;
        for message in split_discovery(node_id, entries, budget) {
            let bytes = match encode_packet_to_vec(&Packet::single(message)) {
                Ok(bytes) => bytes,
                Err(err) => {
                    log::warn!("[scheduler] cannot encode discovery for {}: {}", adapter.id, err);
                    continue;
                }
            };
            match transport.send(&target, &bytes) {
                Ok(_) => sent += 1,
                Err(err) => {
                    log::warn!("[scheduler] discovery send on {} failed: {}", adapter.id, err);
                }
            }
        }
        sent
    }
}

/// Split `entries` into discovery messages whose single-message packet fits
/// `budget` bytes. Always yields at least one message.
///
/// An entry too large for the budget on its own still gets its own message.
pub fn split_discovery(node_id: u16, entries: Vec<NodeEntry>, budget: usize) -> Vec<DiscoveryMessage> {
    let fixed = PACKET_HEADER_SIZE + MESSAGE_HEADER_SIZE + DISCOVERY_FIXED_BODY;
    let max_nodes = usize::from(u16::MAX);

    let mut messages = Vec::new();
    let mut current: Vec<NodeEntry> = Vec::new();
    let mut size = fixed;

    for entry in entries {
        let entry_size = entry.encoded_size();
        let overflow = size + entry_size > budget || current.len() == max_nodes;
        if overflow && !current.is_empty() {
            messages.push(DiscoveryMessage::new(node_id, std::mem::take(&mut current)));
            size = fixed;
        }
        if fixed + entry_size > budget {
            log::warn!(
                "[scheduler] route to {} exceeds the datagram budget ({} bytes)",
                entry.address,
                budget
            );
        }
        size += entry_size;
        current.push(entry);
    }

    if !current.is_empty() || messages.is_empty() {
        messages.push(DiscoveryMessage::new(node_id, current));
    }
    messages
}
