// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route identity, status and lifecycle events.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use crate::adapter::AdapterId;
use crate::protocol::NodeEntry;

/// A node on the network: announced id plus address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIdentifier {
    pub id: u16,
    pub address: Ipv4Addr,
}

impl NodeIdentifier {
    pub fn new(id: u16, address: Ipv4Addr) -> Self {
        Self { id, address }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Which node, learned on which local adapter, reported by which neighbour.
///
/// Two routes to the same node through the same adapter but different
/// reporters are distinct (multipath).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteIdentifier {
    pub node: NodeIdentifier,
    pub adapter: AdapterId,
    pub reporter: Ipv4Addr,
}

impl RouteIdentifier {
    pub fn new(node: NodeIdentifier, adapter: AdapterId, reporter: Ipv4Addr) -> Self {
        Self {
            node,
            adapter,
            reporter,
        }
    }

    /// One hop: the node reported itself.
    pub fn is_direct(&self) -> bool {
        self.node.address == self.reporter
    }
}

impl fmt::Display for RouteIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {} on {}", self.node, self.reporter, self.adapter)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteStatus {
    pub online: bool,
    /// Admin-injected; exempt from the silence timeout.
    pub persistent: bool,
    /// Recorded and usable locally but never advertised.
    pub silent: bool,
    /// Cost path, frozen at creation.
    pub jumps: Vec<u16>,
    pub mtu: u32,
}

impl RouteStatus {
    pub fn cost(&self) -> u32 {
        self.jumps.iter().map(|&jump| u32::from(jump)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub identifier: RouteIdentifier,
    pub last_discovery: Instant,
    /// Last data message from this node on this adapter, if any.
    pub last_data_message: Option<Instant>,
    pub status: RouteStatus,
}

impl Route {
    pub fn new(identifier: RouteIdentifier, jumps: Vec<u16>, mtu: u32, now: Instant) -> Self {
        Self {
            identifier,
            last_discovery: now,
            last_data_message: None,
            status: RouteStatus {
                online: true,
                persistent: false,
                silent: false,
                jumps,
                mtu,
            },
        }
    }

    pub fn cost(&self) -> u32 {
        self.status.cost()
    }

    pub fn is_direct(&self) -> bool {
        self.identifier.is_direct()
    }

    pub fn is_online(&self) -> bool {
        self.status.online
    }

    /// Liveness at `now`: persistent, or heard from (discovery or data) within `timeout`.
    ///
    /// A `now` earlier than the recorded timestamps counts as fresh.
    pub fn compute_online(&self, now: Instant, timeout: Duration) -> bool {
        if self.status.persistent {
            return true;
        }
        let fresh = |at: Instant| now.saturating_duration_since(at) < timeout;
        fresh(self.last_discovery) || self.last_data_message.is_some_and(fresh)
    }

    /// Re-advertisement of this route: the stored path plus this node's own hop.
    pub fn to_node_entry(&self, hop_cost: u16) -> NodeEntry {
        let mut jumps = Vec::with_capacity(self.status.jumps.len() + 1);
        jumps.extend_from_slice(&self.status.jumps);
        jumps.push(hop_cost);
        NodeEntry::new(
            self.identifier.node.id,
            self.identifier.node.address,
            jumps,
        )
    }
}

/// Notification produced by the route manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEvent {
    /// First sighting of a route identifier.
    NewRoute(Route),
    /// The online flag flipped; `was_online` is the previous state.
    LivenessChanged { route: Route, was_online: bool },
}
