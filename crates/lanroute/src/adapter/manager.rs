// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Current adapter table and lookups used by ingestion and scheduling.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use super::{AdapterDescriptor, AdapterId, AdapterProvider};

/// Ids that appeared or disappeared in an [`AdapterManager::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdapterChanges {
    pub added: Vec<AdapterId>,
    pub removed: Vec<AdapterId>,
}

impl AdapterChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Holds the latest adapter descriptors, in provider order.
#[derive(Debug, Clone, Default)]
pub struct AdapterManager {
    adapters: Vec<AdapterDescriptor>,
}

impl AdapterManager {
    pub fn new(adapters: Vec<AdapterDescriptor>) -> Self {
        let mut manager = Self::default();
        manager.update(adapters);
        manager
    }

    /// Replace the adapter set. Duplicate ids keep their first descriptor.
    pub fn update(&mut self, adapters: Vec<AdapterDescriptor>) -> AdapterChanges {
        let mut seen = HashSet::new();
        let mut next = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            if seen.insert(adapter.id.clone()) {
                next.push(adapter);
            } else {
                log::warn!("[adapter] duplicate adapter id {}, ignoring", adapter.id);
            }
        }

        let changes = AdapterChanges {
            added: next
                .iter()
                .filter(|adapter| self.by_id(&adapter.id).is_none())
                .map(|adapter| adapter.id.clone())
                .collect(),
            removed: self
                .adapters
                .iter()
                .filter(|adapter| !seen.contains(&adapter.id))
                .map(|adapter| adapter.id.clone())
                .collect(),
        };

        for id in &changes.added {
            log::info!("[adapter] adapter {} added", id);
        }
        for id in &changes.removed {
            log::info!("[adapter] adapter {} removed", id);
        }

        self.adapters = next;
        changes
    }

    /// Re-read adapters from `provider`.
    pub fn refresh(&mut self, provider: &dyn AdapterProvider) -> AdapterChanges {
        self.update(provider.adapters())
    }

    pub fn by_id(&self, id: &AdapterId) -> Option<&AdapterDescriptor> {
        self.adapters.iter().find(|adapter| &adapter.id == id)
    }

    /// Adapter owning the local address `address`.
    pub fn by_local_address(&self, address: Ipv4Addr) -> Option<&AdapterDescriptor> {
        self.adapters
            .iter()
            .find(|adapter| adapter.has_address(address))
    }

    /// Adapters discovery runs on.
    pub fn usable(&self) -> impl Iterator<Item = &AdapterDescriptor> {
        self.adapters.iter().filter(|adapter| adapter.is_usable())
    }

    pub fn all(&self) -> &[AdapterDescriptor] {
        &self.adapters
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
