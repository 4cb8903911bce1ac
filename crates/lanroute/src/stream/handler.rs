// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream demultiplexer.
//!
//! Routes raw inbound buffers to one [`DataStream`] per (sender, recipient)
//! pair and collects decoded packets on poll.
//!
//! # Thread Safety
//!
//! `handle_receive` runs on transport callback threads while `process` runs
//! on the polling thread. A receive holds the map shard lock across the
//! append, so an eviction sweep sees either the old stream or the appended
//! one. `process` clones the stream handles out of the map and drains each
//! under its own mutex. Lock order is always shard, then stream.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::data_stream::DataStream;
use crate::protocol::Packet;

/// Identity of one inbound byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    /// Remote endpoint the bytes came from.
    pub sender: SocketAddrV4,
    /// Local adapter address the bytes arrived on.
    pub recipient: Ipv4Addr,
}

impl StreamKey {
    pub fn new(sender: SocketAddrV4, recipient: Ipv4Addr) -> Self {
        Self { sender, recipient }
    }
}

/// Packets drained from one stream during a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPackets {
    pub key: StreamKey,
    pub packets: Vec<Packet>,
}

/// Demultiplexer counters.
#[derive(Debug, Default)]
pub struct StreamMetrics {
    pub bytes_received: AtomicU64,
    pub packets_decoded: AtomicU64,
    pub bytes_discarded: AtomicU64,
    pub streams_created: AtomicU64,
    pub streams_evicted: AtomicU64,
}

/// Point-in-time copy of [`StreamMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamMetricsSnapshot {
    pub bytes_received: u64,
    pub packets_decoded: u64,
    pub bytes_discarded: u64,
    pub streams_created: u64,
    pub streams_evicted: u64,
}

impl StreamMetrics {
    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
            streams_created: self.streams_created.load(Ordering::Relaxed),
            streams_evicted: self.streams_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Owns every stream reassembler, keyed by (sender, recipient).
#[derive(Debug, Default)]
pub struct DataHandler {
    streams: DashMap<StreamKey, Arc<Mutex<DataStream>>>,
    metrics: StreamMetrics,
}

impl DataHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes received from `sender` on local address `recipient`.
    pub fn handle_receive(&self, bytes: &[u8], sender: SocketAddrV4, recipient: Ipv4Addr) {
        self.handle_receive_at(bytes, sender, recipient, Instant::now());
    }

    /// [`handle_receive`](Self::handle_receive) with an explicit reception time.
    pub fn handle_receive_at(
        &self,
        bytes: &[u8],
        sender: SocketAddrV4,
        recipient: Ipv4Addr,
        now: Instant,
    ) {
        let key = StreamKey::new(sender, recipient);
        let entry = self.streams.entry(key).or_insert_with(|| {
            log::debug!("[stream] new stream {} -> {}", sender, recipient);
            self.metrics.streams_created.fetch_add(1, Ordering::Relaxed);
            Arc::new(Mutex::new(DataStream::new()))
        });
        // Append under the shard guard so evict_idle never drops a stream
        // between lookup and append.
        entry.value().lock().receive(bytes, now);
        drop(entry);
        self.metrics
            .bytes_received
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
    }

    /// Drain every stream. Streams with nothing complete are omitted.
    ///
    /// Batches are ordered by stream key; packets within a batch keep stream order.
    pub fn process(&self) -> Vec<StreamPackets> {
        let mut streams: Vec<(StreamKey, Arc<Mutex<DataStream>>)> = self
            .streams
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        streams.sort_by_key(|(key, _)| *key);

        let mut batches = Vec::new();
        for (key, stream) in streams {
            let (packets, discarded) = {
                let mut stream = stream.lock();
                let before = stream.bytes_discarded();
                let packets = stream.drain();
                (packets, stream.bytes_discarded() - before)
            };

            if discarded > 0 {
                self.metrics
                    .bytes_discarded
                    .fetch_add(discarded, Ordering::Relaxed);
            }
            if !packets.is_empty() {
                self.metrics
                    .packets_decoded
                    .fetch_add(packets.len() as u64, Ordering::Relaxed);
                batches.push(StreamPackets { key, packets });
            }
        }
        batches
    }

    /// Drop streams that received nothing for `timeout`. Returns how many were dropped.
    pub fn evict_idle(&self, now: Instant, timeout: Duration) -> usize {
        let before = self.streams.len();
        self.streams.retain(|key, stream| {
            let idle = stream
                .lock()
                .last_received()
                .map_or(true, |last| now.saturating_duration_since(last) >= timeout);
            if idle {
                log::debug!(
                    "[stream] evicting idle stream {} -> {}",
                    key.sender,
                    key.recipient
                );
            }
            !idle
        });
        let evicted = before.saturating_sub(self.streams.len());
        if evicted > 0 {
            self.metrics
                .streams_evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Buffered, not yet decoded bytes for one stream.
    pub fn backlog_len(&self, key: &StreamKey) -> Option<usize> {
        self.streams
            .get(key)
            .map(|stream| stream.value().lock().backlog_len())
    }

    pub fn metrics(&self) -> StreamMetricsSnapshot {
        self.metrics.snapshot()
    }
}
