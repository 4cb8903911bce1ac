// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route table and propagation rules.
//!
//! Routes are grouped per local adapter and kept in insertion order. They are
//! never removed: a silent route goes offline and comes back online when its
//! node is heard from again. Jump paths are frozen at creation; later
//! discoveries only refresh `last_discovery`.
//!
//! Notifications are queued as [`RouteEvent`]s and collected by the owner
//! with [`RouteManager::take_events`].

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::types::{NodeIdentifier, Route, RouteEvent, RouteIdentifier};
use super::{RouteError, RouteResult};
use crate::adapter::{AdapterId, AdapterManager};
use crate::config::{HOP_COST, ROUTE_TIMEOUT};
use crate::protocol::{DataMessage, DiscoveryMessage};
use crate::transport::NetworkInfo;

/// Per-adapter route table.
#[derive(Debug)]
pub struct RouteManager {
    /// Adapter id to routes, both in first-seen order.
    table: Vec<(AdapterId, Vec<Route>)>,
    route_timeout: Duration,
    events: Vec<RouteEvent>,
}

impl Default for RouteManager {
    fn default() -> Self {
        Self::new(ROUTE_TIMEOUT)
    }
}

impl RouteManager {
    pub fn new(route_timeout: Duration) -> Self {
        Self {
            table: Vec::new(),
            route_timeout,
            events: Vec::new(),
        }
    }

    pub fn route_timeout(&self) -> Duration {
        self.route_timeout
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Learn routes from a discovery message received as described by `info`.
    ///
    /// Creates or refreshes the direct route to the sender, then one indirect
    /// route per listed node with the sender as reporter. Every route is
    /// attempted; the first failure is returned.
    pub fn process_discovery(
        &mut self,
        message: &DiscoveryMessage,
        info: &NetworkInfo,
        adapters: &AdapterManager,
    ) -> RouteResult<()> {
        let adapter = adapters
            .by_local_address(info.adapter)
            .ok_or(RouteError::UnknownAdapter(info.adapter))?
            .id
            .clone();
        let reporter = *info.sender.ip();

        let direct = RouteIdentifier::new(
            NodeIdentifier::new(message.identifier, reporter),
            adapter.clone(),
            reporter,
        );
        let mut result = self.process_route(adapters, direct, &[HOP_COST], info.reception_time);

        for entry in &message.nodes {
            let identifier = RouteIdentifier::new(
                NodeIdentifier::new(entry.identifier, entry.address),
                adapter.clone(),
                reporter,
            );
            let mut jumps = Vec::with_capacity(entry.jumps.len() + 1);
            jumps.push(HOP_COST);
            jumps.extend_from_slice(&entry.jumps);

            let outcome = self.process_route(adapters, identifier, &jumps, info.reception_time);
            if result.is_ok() {
                result = outcome;
            }
        }

        if let Err(err) = &result {
            log::debug!("[routing] discovery from {} partially ingested: {}", info.sender, err);
        }
        result
    }

    /// Create `identifier` with `jumps`, or refresh its `last_discovery` if known.
    ///
    /// The adapter must still exist; its MTU is copied into new routes.
    pub fn process_route(
        &mut self,
        adapters: &AdapterManager,
        identifier: RouteIdentifier,
        jumps: &[u16],
        now: Instant,
    ) -> RouteResult<()> {
        self.upsert(adapters, identifier, jumps, now).map(|_| ())
    }

    /// Inject an admin route, or change the persistence of an existing one.
    ///
    /// A persistent route stays online regardless of silence.
    pub fn set_persistent_route(
        &mut self,
        adapters: &AdapterManager,
        identifier: RouteIdentifier,
        jumps: &[u16],
        persistent: bool,
        now: Instant,
    ) -> RouteResult<()> {
        let timeout = self.route_timeout;
        let route = self.upsert(adapters, identifier, jumps, now)?;
        route.status.persistent = persistent;
        let was_online = route.status.online;
        route.status.online = route.compute_online(now, timeout);
        log::info!(
            "[routing] route {} persistent={}",
            route.identifier,
            persistent
        );
        if was_online != route.status.online {
            let event = RouteEvent::LivenessChanged {
                route: route.clone(),
                was_online,
            };
            self.events.push(event);
        }
        Ok(())
    }

    /// Mark a route as local-only. Returns false if the route is unknown.
    pub fn set_silent(&mut self, identifier: &RouteIdentifier, silent: bool) -> bool {
        match self.find_mut(identifier) {
            Some(route) => {
                route.status.silent = silent;
                true
            }
            None => false,
        }
    }

    /// Refresh `last_data_message` on every route to the data message's
    /// origin on the receiving adapter. Returns how many routes were touched.
    pub fn record_data_message(
        &mut self,
        message: &DataMessage,
        info: &NetworkInfo,
        adapters: &AdapterManager,
    ) -> usize {
        let Some(adapter) = adapters.by_local_address(info.adapter) else {
            return 0;
        };
        let node = NodeIdentifier::new(message.identifier, *info.sender.ip());
        let Some(routes) = self.routes_mut(&adapter.id) else {
            return 0;
        };

        let mut touched = 0;
        for route in routes.iter_mut().filter(|route| route.identifier.node == node) {
            route.last_data_message = Some(info.reception_time);
            touched += 1;
        }
        touched
    }

    // ========================================================================
    // Liveness
    // ========================================================================

    /// Recompute every route's online flag at `now`, queueing a
    /// [`RouteEvent::LivenessChanged`] for each flip. Returns the flip count.
    pub fn update(&mut self, now: Instant) -> usize {
        let timeout = self.route_timeout;
        let mut flipped = 0;
        for (_, routes) in &mut self.table {
            for route in routes.iter_mut() {
                let was_online = route.status.online;
                let online = route.compute_online(now, timeout);
                if online == was_online {
                    continue;
                }
                route.status.online = online;
                flipped += 1;
                if online {
                    log::info!("[routing] route {} back online", route.identifier);
                } else {
                    log::info!("[routing] route {} went offline", route.identifier);
                }
                self.events.push(RouteEvent::LivenessChanged {
                    route: route.clone(),
                    was_online,
                });
            }
        }
        flipped
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Routes to re-advertise on `outbound`.
    ///
    /// Split horizon: routes learned on `outbound` are excluded, as are
    /// offline and silent ones. One route per node; a strictly cheaper route
    /// replaces an earlier one, ties keep the first seen.
    pub fn routes_to_advertise(&self, outbound: &AdapterId) -> Vec<Route> {
        let mut selected: Vec<Route> = Vec::new();
        let mut index: HashMap<NodeIdentifier, usize> = HashMap::new();

        let candidates = self
            .table
            .iter()
            .filter(|(adapter, _)| adapter != outbound)
            .flat_map(|(_, routes)| routes.iter())
            .filter(|route| route.status.online && !route.status.silent);

        for route in candidates {
            match index.get(&route.identifier.node) {
                Some(&slot) => {
                    if route.cost() < selected[slot].cost() {
                        selected[slot] = route.clone();
                    }
                }
                None => {
                    index.insert(route.identifier.node, selected.len());
                    selected.push(route.clone());
                }
            }
        }
        selected
    }

    /// Routes learned on `adapter`, in insertion order.
    pub fn routes_on_adapter(&self, adapter: &AdapterId) -> &[Route] {
        self.table
            .iter()
            .find(|(id, _)| id == adapter)
            .map(|(_, routes)| routes.as_slice())
            .unwrap_or(&[])
    }

    /// Cheapest online route to `node` across all adapters. Ties keep the first seen.
    pub fn best_route(&self, node: &NodeIdentifier) -> Option<&Route> {
        self.routes()
            .filter(|route| route.status.online && &route.identifier.node == node)
            .fold(None, |best: Option<&Route>, route| match best {
                Some(current) if current.cost() <= route.cost() => Some(current),
                _ => Some(route),
            })
    }

    /// Cheapest online route on which `node` itself is the reporter.
    ///
    /// Data messages carry no destination, so only these routes can deliver one.
    pub fn best_direct_route(&self, node: &NodeIdentifier) -> Option<&Route> {
        self.routes()
            .filter(|route| route.status.online && route.is_direct() && &route.identifier.node == node)
            .fold(None, |best: Option<&Route>, route| match best {
                Some(current) if current.cost() <= route.cost() => Some(current),
                _ => Some(route),
            })
    }

    /// Every known node with at least one online route.
    pub fn reachable_nodes(&self) -> Vec<NodeIdentifier> {
        let mut nodes: Vec<NodeIdentifier> = self
            .routes()
            .filter(|route| route.status.online)
            .map(|route| route.identifier.node)
            .collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }

    pub fn get(&self, identifier: &RouteIdentifier) -> Option<&Route> {
        self.routes_on_adapter(&identifier.adapter)
            .iter()
            .find(|route| &route.identifier == identifier)
    }

    /// All routes, adapter by adapter.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.table.iter().flat_map(|(_, routes)| routes.iter())
    }

    pub fn len(&self) -> usize {
        self.table.iter().map(|(_, routes)| routes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain queued notifications in the order they occurred.
    pub fn take_events(&mut self) -> Vec<RouteEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn upsert(
        &mut self,
        adapters: &AdapterManager,
        identifier: RouteIdentifier,
        jumps: &[u16],
        now: Instant,
    ) -> RouteResult<&mut Route> {
        let mtu = adapters
            .by_id(&identifier.adapter)
            .ok_or_else(|| RouteError::UnknownAdapterId(identifier.adapter.clone()))?
            .mtu;

        let slot = match self.table.iter().position(|(id, _)| id == &identifier.adapter) {
            Some(slot) => slot,
            None => {
                self.table.push((identifier.adapter.clone(), Vec::new()));
                self.table.len() - 1
            }
        };
        let routes = &mut self.table[slot].1;

        if let Some(position) = routes.iter().position(|route| route.identifier == identifier) {
            let route = &mut routes[position];
            route.last_discovery = now;
            return Ok(route);
        }

        let route = Route::new(identifier, jumps.to_vec(), mtu, now);
        log::info!(
            "[routing] new route {} cost={}",
            route.identifier,
            route.cost()
        );
        self.events.push(RouteEvent::NewRoute(route.clone()));
        routes.push(route);
        let last = routes.len() - 1;
        Ok(&mut routes[last])
    }

    fn routes_mut(&mut self, adapter: &AdapterId) -> Option<&mut Vec<Route>> {
        self.table
            .iter_mut()
            .find(|(id, _)| id == adapter)
            .map(|(_, routes)| routes)
    }

    fn find_mut(&mut self, identifier: &RouteIdentifier) -> Option<&mut Route> {
        self.routes_mut(&identifier.adapter)?
            .iter_mut()
            .find(|route| &route.identifier == identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterDescriptor;
    use crate::config::DEFAULT_NETMASK;
    use crate::protocol::NodeEntry;
    use std::net::{Ipv4Addr, SocketAddrV4};

    const ETH0: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const ETH1: Ipv4Addr = Ipv4Addr::new(10, 0, 1, 1);

    fn adapters() -> AdapterManager {
        AdapterManager::new(vec![
            AdapterDescriptor::new("eth0", "eth0")
                .with_address(ETH0, DEFAULT_NETMASK)
                .with_mtu(1500),
            AdapterDescriptor::new("eth1", "eth1")
                .with_address(ETH1, DEFAULT_NETMASK)
                .with_mtu(9000),
        ])
    }

    fn info(sender: [u8; 4], adapter: Ipv4Addr, at: Instant) -> NetworkInfo {
        NetworkInfo {
            sender: SocketAddrV4::new(Ipv4Addr::from(sender), 7171),
            adapter,
            reception_time: at,
        }
    }

    fn node(id: u16, address: [u8; 4]) -> NodeIdentifier {
        NodeIdentifier::new(id, Ipv4Addr::from(address))
    }

    #[test]
    fn test_discovery_creates_direct_and_indirect_routes() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        let message = DiscoveryMessage::new(
            7,
            vec![NodeEntry::new(9, Ipv4Addr::new(10, 0, 0, 9), vec![256, 256])],
        );

        manager
            .process_discovery(&message, &info([10, 0, 0, 2], ETH0, t), &adapters)
            .expect("ingestion should succeed");

        let routes = manager.routes_on_adapter(&AdapterId::new("eth0"));
        assert_eq!(routes.len(), 2);

        assert_eq!(routes[0].identifier.node, node(7, [10, 0, 0, 2]));
        assert!(routes[0].is_direct());
        assert_eq!(routes[0].status.jumps, vec![256]);
        assert_eq!(routes[0].status.mtu, 1500);
        assert!(routes[0].is_online());

        assert_eq!(routes[1].identifier.node, node(9, [10, 0, 0, 9]));
        assert_eq!(routes[1].identifier.reporter, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(routes[1].status.jumps, vec![256, 256, 256]);
        assert_eq!(routes[1].cost(), 768);

        let events = manager.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], RouteEvent::NewRoute(r) if r.is_direct()));
        assert!(manager.take_events().is_empty());
    }

    #[test]
    fn test_jump_path_is_frozen() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        let first = DiscoveryMessage::new(
            7,
            vec![NodeEntry::new(9, Ipv4Addr::new(10, 0, 0, 9), vec![256])],
        );
        let cheaper_later = DiscoveryMessage::new(
            7,
            vec![NodeEntry::new(9, Ipv4Addr::new(10, 0, 0, 9), vec![])],
        );

        manager
            .process_discovery(&first, &info([10, 0, 0, 2], ETH0, t), &adapters)
            .expect("ingestion should succeed");
        let later = t + Duration::from_secs(30);
        manager
            .process_discovery(&cheaper_later, &info([10, 0, 0, 2], ETH0, later), &adapters)
            .expect("ingestion should succeed");

        let routes = manager.routes_on_adapter(&AdapterId::new("eth0"));
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].status.jumps, vec![256, 256]);
        assert_eq!(routes[1].last_discovery, later);
        assert_eq!(manager.take_events().len(), 2);
    }

    #[test]
    fn test_unknown_adapter_is_rejected() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let err = manager
            .process_discovery(
                &DiscoveryMessage::new(7, vec![]),
                &info([10, 0, 5, 2], Ipv4Addr::new(10, 0, 5, 1), Instant::now()),
                &adapters,
            )
            .expect_err("unknown adapter should fail");
        assert_eq!(err, RouteError::UnknownAdapter(Ipv4Addr::new(10, 0, 5, 1)));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_liveness_timeout_and_revival() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        let message = DiscoveryMessage::new(7, vec![]);
        manager
            .process_discovery(&message, &info([10, 0, 0, 2], ETH0, t), &adapters)
            .expect("ingestion should succeed");
        manager.take_events();

        assert_eq!(manager.update(t + Duration::from_secs(89)), 0);
        assert!(manager.routes().all(Route::is_online));

        assert_eq!(manager.update(t + Duration::from_secs(91)), 1);
        assert!(manager.routes().all(|route| !route.is_online()));
        let events = manager.take_events();
        assert!(matches!(
            &events[..],
            [RouteEvent::LivenessChanged { was_online: true, .. }]
        ));

        // Offline routes stay in the table and come back on the next discovery.
        let revived = t + Duration::from_secs(200);
        manager
            .process_discovery(&message, &info([10, 0, 0, 2], ETH0, revived), &adapters)
            .expect("ingestion should succeed");
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.update(revived), 1);
        assert!(manager.routes().all(Route::is_online));
    }

    #[test]
    fn test_data_message_keeps_route_alive() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        manager
            .process_discovery(
                &DiscoveryMessage::new(7, vec![]),
                &info([10, 0, 0, 2], ETH0, t),
                &adapters,
            )
            .expect("ingestion should succeed");

        let touched = manager.record_data_message(
            &DataMessage::new(7, vec![1, 2, 3]),
            &info([10, 0, 0, 2], ETH0, t + Duration::from_secs(80)),
            &adapters,
        );
        assert_eq!(touched, 1);

        assert_eq!(manager.update(t + Duration::from_secs(150)), 0);
        assert!(manager.routes().all(Route::is_online));
        assert_eq!(manager.update(t + Duration::from_secs(171)), 1);
    }

    #[test]
    fn test_persistent_route_never_times_out() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        let identifier = RouteIdentifier::new(
            node(3, [172, 16, 0, 3]),
            AdapterId::new("eth1"),
            Ipv4Addr::new(10, 0, 1, 254),
        );

        manager
            .set_persistent_route(&adapters, identifier.clone(), &[256, 256], true, t)
            .expect("injection should succeed");
        assert_eq!(manager.update(t + Duration::from_secs(3600)), 0);
        let route = manager.get(&identifier).expect("route should exist");
        assert!(route.is_online());
        assert!(route.status.persistent);
        assert_eq!(route.status.mtu, 9000);

        manager
            .set_persistent_route(&adapters, identifier.clone(), &[], false, t)
            .expect("update should succeed");
        assert_eq!(manager.update(t + Duration::from_secs(3600)), 1);
    }

    #[test]
    fn test_persistent_route_requires_known_adapter() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let identifier = RouteIdentifier::new(
            node(3, [172, 16, 0, 3]),
            AdapterId::new("wlan0"),
            Ipv4Addr::new(10, 0, 1, 254),
        );
        let err = manager
            .set_persistent_route(&adapters, identifier, &[256], true, Instant::now())
            .expect_err("unknown adapter should fail");
        assert_eq!(err, RouteError::UnknownAdapterId(AdapterId::new("wlan0")));
    }

    #[test]
    fn test_split_horizon_and_cheapest_route() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        let target = Ipv4Addr::new(10, 0, 9, 9);

        // Node 9 is 256 away via eth0 and 512 away via eth1.
        manager
            .process_discovery(
                &DiscoveryMessage::new(2, vec![NodeEntry::new(9, target, vec![])]),
                &info([10, 0, 0, 2], ETH0, t),
                &adapters,
            )
            .expect("ingestion should succeed");
        manager
            .process_discovery(
                &DiscoveryMessage::new(3, vec![NodeEntry::new(9, target, vec![256])]),
                &info([10, 0, 1, 3], ETH1, t),
                &adapters,
            )
            .expect("ingestion should succeed");

        let on_eth1 = manager.routes_to_advertise(&AdapterId::new("eth1"));
        let nine: Vec<_> = on_eth1
            .iter()
            .filter(|route| route.identifier.node.id == 9)
            .collect();
        assert_eq!(nine.len(), 1);
        assert_eq!(nine[0].cost(), 256);
        assert!(on_eth1
            .iter()
            .all(|route| route.identifier.adapter.as_str() == "eth0"));

        let on_eth0 = manager.routes_to_advertise(&AdapterId::new("eth0"));
        let nine: Vec<_> = on_eth0
            .iter()
            .filter(|route| route.identifier.node.id == 9)
            .collect();
        assert_eq!(nine.len(), 1);
        assert_eq!(nine[0].cost(), 512);

        // Three adapters seen together: the cheaper eth0 entry wins.
        let on_other = manager.routes_to_advertise(&AdapterId::new("wlan0"));
        let best = on_other
            .iter()
            .find(|route| route.identifier.node.id == 9)
            .expect("node 9 should be advertised");
        assert_eq!(best.cost(), 256);
        assert_eq!(on_other.len(), 3);
    }

    #[test]
    fn test_equal_cost_keeps_first_seen() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        let target = Ipv4Addr::new(10, 0, 9, 9);

        for reporter in [[10, 0, 0, 2], [10, 0, 0, 3]] {
            manager
                .process_discovery(
                    &DiscoveryMessage::new(reporter[3] as u16, vec![NodeEntry::new(9, target, vec![])]),
                    &info(reporter, ETH0, t),
                    &adapters,
                )
                .expect("ingestion should succeed");
        }

        // Multipath: both reporters are kept.
        assert_eq!(manager.routes_on_adapter(&AdapterId::new("eth0")).len(), 4);

        let advertised = manager.routes_to_advertise(&AdapterId::new("eth1"));
        let nine = advertised
            .iter()
            .find(|route| route.identifier.node.id == 9)
            .expect("node 9 should be advertised");
        assert_eq!(nine.identifier.reporter, Ipv4Addr::new(10, 0, 0, 2));

        let best = manager
            .best_route(&NodeIdentifier::new(9, target))
            .expect("best route should exist");
        assert_eq!(best.identifier.reporter, Ipv4Addr::new(10, 0, 0, 2));
    }

    #[test]
    fn test_offline_and_silent_routes_are_not_advertised() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        manager
            .process_discovery(
                &DiscoveryMessage::new(2, vec![]),
                &info([10, 0, 0, 2], ETH0, t),
                &adapters,
            )
            .expect("ingestion should succeed");
        manager
            .process_discovery(
                &DiscoveryMessage::new(4, vec![]),
                &info([10, 0, 0, 4], ETH0, t + Duration::from_secs(60)),
                &adapters,
            )
            .expect("ingestion should succeed");

        manager.update(t + Duration::from_secs(100));
        let advertised = manager.routes_to_advertise(&AdapterId::new("eth1"));
        assert_eq!(advertised.len(), 1);
        assert_eq!(advertised[0].identifier.node.id, 4);

        let identifier = advertised[0].identifier.clone();
        assert!(manager.set_silent(&identifier, true));
        assert!(manager.routes_to_advertise(&AdapterId::new("eth1")).is_empty());
        assert_eq!(manager.reachable_nodes(), vec![identifier.node]);
    }

    #[test]
    fn test_best_direct_route_ignores_relayed_paths() {
        let adapters = adapters();
        let mut manager = RouteManager::default();
        let t = Instant::now();
        let target = NodeIdentifier::new(9, Ipv4Addr::new(10, 0, 1, 9));

        // Node 9 first heard through a relay on eth1.
        manager
            .process_discovery(
                &DiscoveryMessage::new(2, vec![NodeEntry::new(9, target.address, vec![])]),
                &info([10, 0, 1, 2], ETH1, t),
                &adapters,
            )
            .expect("ingestion should succeed");
        assert!(manager.best_route(&target).is_some());
        assert!(manager.best_direct_route(&target).is_none());

        // Then directly.
        manager
            .process_discovery(&DiscoveryMessage::new(9, vec![]), &info([10, 0, 1, 9], ETH1, t), &adapters)
            .expect("ingestion should succeed");
        let direct = manager
            .best_direct_route(&target)
            .expect("direct route should exist");
        assert!(direct.is_direct());
        assert_eq!(direct.identifier.reporter, target.address);
        assert_eq!(direct.identifier.adapter, AdapterId::new("eth1"));

        manager.update(t + Duration::from_secs(91));
        assert!(manager.best_direct_route(&target).is_none());
    }
}
