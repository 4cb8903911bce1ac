// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node: one routing participant.
//!
//! ```text
//! transport thread -> receive_callback -> DataHandler (shared)
//! polling thread   -> poll: process -> ingest -> update -> tick -> evict_idle
//! ```
//!
//! Everything except the [`DataHandler`] is touched only from the polling
//! thread through `&mut self`.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::time::Instant;

use crate::adapter::{AdapterChanges, AdapterDescriptor, AdapterId, AdapterManager, AdapterProvider};
use crate::config::NodeConfig;
use crate::engine::{DiscoveryScheduler, NodeListener, NullListener};
use crate::protocol::{encode_packet_to_vec, DataMessage, DiscoveryMessage, Message, Packet};
use crate::routing::{NodeIdentifier, Route, RouteError, RouteEvent, RouteIdentifier, RouteManager};
use crate::stream::{DataHandler, StreamMetricsSnapshot};
use crate::transport::{NetworkInfo, ReceiveCallback, SendTarget, Transport};
use crate::Result;

/// Work done by one [`Node::poll`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub packets: usize,
    pub discovery_messages: usize,
    pub data_messages: usize,
    /// Discovery messages that could not be fully ingested.
    pub ingest_errors: usize,
    /// Routes whose online flag flipped.
    pub routes_changed: usize,
    pub discovery_packets_sent: usize,
    pub streams_evicted: usize,
}

/// A routing node bound to one transport.
pub struct Node<T: Transport> {
    config: NodeConfig,
    adapters: AdapterManager,
    handler: Arc<DataHandler>,
    routes: RouteManager,
    scheduler: DiscoveryScheduler,
    transport: Arc<T>,
    listener: Arc<dyn NodeListener>,
}

impl<T: Transport> Node<T> {
    /// Validate `config` and hook the node's receive path into `transport`.
    pub fn new(config: NodeConfig, transport: Arc<T>) -> Result<Self> {
        config.validate()?;
        let node = Self {
            adapters: AdapterManager::default(),
            handler: Arc::new(DataHandler::new()),
            routes: RouteManager::default(),
            scheduler: DiscoveryScheduler::new(config.discovery_interval),
            transport,
            listener: Arc::new(NullListener),
            config,
        };
        node.transport.set_receive_callback(node.receive_callback());
        log::info!(
            "[node] node {} ready (discovery every {:?})",
            node.config.node_id,
            node.config.discovery_interval
        );
        Ok(node)
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn NodeListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn node_id(&self) -> u16 {
        self.config.node_id
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Callback feeding raw datagrams into this node's stream demultiplexer.
    ///
    /// Safe to call from any thread.
    pub fn receive_callback(&self) -> ReceiveCallback {
        let handler = Arc::clone(&self.handler);
        Arc::new(move |bytes: &[u8], sender: SocketAddrV4, recipient: Ipv4Addr| {
            handler.handle_receive(bytes, sender, recipient);
        })
    }

    /// Feed raw bytes directly, bypassing the transport.
    pub fn handle_receive(&self, bytes: &[u8], sender: SocketAddrV4, recipient: Ipv4Addr) {
        self.handler.handle_receive(bytes, sender, recipient);
    }

    // ========================================================================
    // Adapters
    // ========================================================================

    /// Replace the adapter set and reconfigure the transport.
    ///
    /// The adapter table is updated even if the transport reports an error.
    pub fn update_adapters(&mut self, adapters: Vec<AdapterDescriptor>) -> Result<AdapterChanges> {
        let changes = self.adapters.update(adapters);
        self.transport.update_adapters(self.adapters.all())?;
        Ok(changes)
    }

    /// [`update_adapters`](Self::update_adapters) from a provider.
    pub fn refresh_adapters(&mut self, provider: &dyn AdapterProvider) -> Result<AdapterChanges> {
        self.update_adapters(provider.adapters())
    }

    pub fn adapters(&self) -> &AdapterManager {
        &self.adapters
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// One polling cycle at `now`.
    pub fn poll(&mut self, now: Instant) -> PollStats {
        let mut stats = PollStats::default();

        for batch in self.handler.process() {
            let info = NetworkInfo {
                sender: batch.key.sender,
                adapter: batch.key.recipient,
                reception_time: now,
            };
            for packet in batch.packets {
                stats.packets += 1;
                for message in packet.messages {
                    match message {
                        Message::Discovery(message) => {
                            stats.discovery_messages += 1;
                            if !self.ingest_discovery(&message, &info) {
                                stats.ingest_errors += 1;
                            }
                        }
                        Message::Data(message) => {
                            stats.data_messages += 1;
                            self.ingest_data(&message, &info);
                        }
                    }
                }
            }
        }

        stats.routes_changed = self.routes.update(now);
        self.dispatch_route_events();

        stats.discovery_packets_sent = self.scheduler.tick(
            now,
            self.config.node_id,
            &self.routes,
            &self.adapters,
            self.transport.as_ref(),
        );
        stats.streams_evicted = self.handler.evict_idle(now, self.config.stream_idle_timeout);

        if stats.packets > 0 || stats.routes_changed > 0 {
            log::trace!("[node] poll {:?}", stats);
        }
        stats
    }

    fn ingest_discovery(&mut self, message: &DiscoveryMessage, info: &NetworkInfo) -> bool {
        if self.adapters.by_local_address(*info.sender.ip()).is_some() {
            log::trace!("[node] ignoring own discovery echo from {}", info.sender);
            return true;
        }
        let ingested = match self.routes.process_discovery(message, info, &self.adapters) {
            Ok(()) => true,
            Err(err) => {
                log::debug!(
                    "[node] discovery from {} on {} ignored: {}",
                    info.sender,
                    info.adapter,
                    err
                );
                false
            }
        };
        self.dispatch_route_events();
        self.listener.on_discovery_message(message, info);
        ingested
    }

    fn ingest_data(&mut self, message: &DataMessage, info: &NetworkInfo) {
        self.routes.record_data_message(message, info, &self.adapters);
        self.listener.on_data_message(message, info);
    }

    fn dispatch_route_events(&mut self) {
        for event in self.routes.take_events() {
            match event {
                RouteEvent::NewRoute(route) => self.listener.on_new_route(&route),
                RouteEvent::LivenessChanged { route, was_online } => {
                    self.listener.on_route_liveness_changed(&route, was_online);
                }
            }
        }
    }

    // ========================================================================
    // Data path
    // ========================================================================

    /// Unicast `payload` straight to `destination` over its cheapest online
    /// direct route.
    ///
    /// Data messages carry no destination field and are not relayed, so a node
    /// known only through another node yields [`RouteError::NotDirect`].
    /// Returns the number of bytes handed to the transport.
    pub fn send_data(&self, destination: &NodeIdentifier, payload: Vec<u8>) -> Result<usize> {
        let Some(route) = self.routes.best_direct_route(destination) else {
            return Err(match self.routes.best_route(destination) {
                Some(_) => RouteError::NotDirect(*destination),
                None => RouteError::NoRoute(*destination),
            }
            .into());
        };
        let packet = Packet::single(DataMessage::new(self.config.node_id, payload));
        let bytes = encode_packet_to_vec(&packet)?;
        let target = SendTarget::Unicast {
            adapter: route.identifier.adapter.clone(),
            peer: destination.address,
        };
        let sent = self.transport.send(&target, &bytes)?;
        log::trace!("[node] data for {} sent on {}", destination, route.identifier.adapter);
        Ok(sent)
    }

    // ========================================================================
    // Route table access
    // ========================================================================

    /// Inject an admin route, or change the persistence of an existing one.
    ///
    /// `now` is on the same clock as the one passed to [`poll`](Self::poll).
    pub fn set_persistent_route(
        &mut self,
        identifier: RouteIdentifier,
        jumps: &[u16],
        persistent: bool,
        now: Instant,
    ) -> Result<()> {
        self.routes
            .set_persistent_route(&self.adapters, identifier, jumps, persistent, now)?;
        self.dispatch_route_events();
        Ok(())
    }

    pub fn routes_on_adapter(&self, adapter: &AdapterId) -> &[Route] {
        self.routes.routes_on_adapter(adapter)
    }

    pub fn routes_to_advertise(&self, adapter: &AdapterId) -> Vec<Route> {
        self.routes.routes_to_advertise(adapter)
    }

    pub fn routes(&self) -> &RouteManager {
        &self.routes
    }

    pub fn stream_metrics(&self) -> StreamMetricsSnapshot {
        self.handler.metrics()
    }
}
