// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Packet reassembly for one (sender, recipient) byte stream.
//!
//! Datagrams from one peer are treated as an unbounded byte stream: a packet
//! may span several receives, and one receive may carry several packets.
//! [`DataStream::drain`] extracts every complete packet currently buffered.
//!
//! Recovery is deliberately coarse: a packet that fails to decode discards
//! the whole backlog. No attempt is made to resynchronize further into the
//! stream.

use std::time::Instant;

use crate::config::{MAX_PACKET_SIZE, PACKET_HEADER_SIZE};
use crate::core::ser::Buffer;
use crate::protocol::{decode_packet, peek_packet_size, Packet};

/// Starting capacity of a backlog; grows by doubling.
const INITIAL_BACKLOG_CAPACITY: usize = 2048;

/// Backlogs larger than this are released once emptied.
const SHRINK_THRESHOLD: usize = 64 * 1024;

/// Reassembly state for one stream.
#[derive(Debug, Default)]
pub struct DataStream {
    /// Unread bytes, oldest first.
    backlog: Vec<u8>,
    last_received: Option<Instant>,
    packets_decoded: u64,
    bytes_discarded: u64,
}

impl DataStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append inbound bytes to the backlog. Never fails.
    pub fn receive(&mut self, bytes: &[u8], now: Instant) {
        let needed = self.backlog.len() + bytes.len();
        if needed > self.backlog.capacity() {
            let mut capacity = self.backlog.capacity().max(INITIAL_BACKLOG_CAPACITY);
            while capacity < needed {
                capacity *= 2;
            }
            self.backlog.reserve_exact(capacity - self.backlog.len());
        }
        self.backlog.extend_from_slice(bytes);
        self.last_received = Some(now);
    }

    /// Extract every complete packet, in stream order.
    ///
    /// Stops when the backlog is empty or holds only part of a packet. A
    /// decode failure, or a declared size above [`MAX_PACKET_SIZE`], drops
    /// the entire backlog.
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();

        while self.backlog.len() >= PACKET_HEADER_SIZE {
            let mut buffer = Buffer::from_vec(std::mem::take(&mut self.backlog));

            let declared = match peek_packet_size(&buffer) {
                Ok(declared) => declared,
                Err(_) => {
                    self.backlog = buffer.into_vec();
                    break;
                }
            };
            // An impossible size can never complete; let decode reject it.
            if declared <= MAX_PACKET_SIZE && buffer.len() < declared {
                log::trace!(
                    "[stream] partial packet: {} of {} bytes buffered",
                    buffer.len(),
                    declared
                );
                self.backlog = buffer.into_vec();
                break;
            }

            match decode_packet(&mut buffer) {
                Ok(packet) => {
                    let consumed = buffer.read_offset();
                    let mut rest = buffer.into_vec();
                    if consumed == 0 || consumed > rest.len() {
                        log::debug!(
                            "[stream] decoder consumed {} of {} bytes, stopping",
                            consumed,
                            rest.len()
                        );
                        self.backlog = rest;
                        break;
                    }
                    rest.drain(..consumed);
                    self.backlog = rest;
                    self.packets_decoded += 1;
                    packets.push(packet);
                }
                Err(err) => {
                    let dropped = buffer.len();
                    log::debug!(
                        "[stream] corrupt packet ({}), discarding {} buffered bytes",
                        err,
                        dropped
                    );
                    self.bytes_discarded += dropped as u64;
                    self.backlog = Vec::new();
                    break;
                }
            }
        }

        if self.backlog.is_empty() && self.backlog.capacity() > SHRINK_THRESHOLD {
            self.backlog.shrink_to(INITIAL_BACKLOG_CAPACITY);
        }
        packets
    }

    /// Bytes received but not yet turned into packets.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn last_received(&self) -> Option<Instant> {
        self.last_received
    }

    /// Packets extracted over the stream's lifetime.
    pub fn packets_decoded(&self) -> u64 {
        self.packets_decoded
    }

    /// Bytes thrown away by corrupt-packet recovery.
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_packet_to_vec, DataMessage, DiscoveryMessage, NodeEntry};
    use std::net::Ipv4Addr;

    fn data_packet(id: u16, payload: &[u8]) -> Packet {
        Packet::single(DataMessage::new(id, payload.to_vec()))
    }

    fn encoded(packet: &Packet) -> Vec<u8> {
        encode_packet_to_vec(packet).expect("encode should succeed")
    }

    #[test]
    fn test_single_packet() {
        let packet = data_packet(1, &[1, 2, 3]);
        let mut stream = DataStream::new();
        stream.receive(&encoded(&packet), Instant::now());
        assert_eq!(stream.drain(), vec![packet]);
        assert_eq!(stream.backlog_len(), 0);
        assert_eq!(stream.packets_decoded(), 1);
    }

    #[test]
    fn test_fragment_waits_for_rest() {
        let packet = Packet::single(DiscoveryMessage::new(
            7,
            vec![NodeEntry::new(8, Ipv4Addr::new(10, 0, 0, 8), vec![256])],
        ));
        let bytes = encoded(&packet);
        let mut stream = DataStream::new();
        let now = Instant::now();

        stream.receive(&bytes[..3], now);
        assert!(stream.drain().is_empty());
        stream.receive(&bytes[3..15], now);
        assert!(stream.drain().is_empty());
        assert_eq!(stream.backlog_len(), 15);

        stream.receive(&bytes[15..], now);
        assert_eq!(stream.drain(), vec![packet]);
        assert_eq!(stream.backlog_len(), 0);
    }

    #[test]
    fn test_two_packets_in_one_receive() {
        let first = data_packet(1, &[0xAA]);
        let second = data_packet(2, &[0xBB, 0xCC]);
        let mut bytes = encoded(&first);
        bytes.extend(encoded(&second));

        let mut stream = DataStream::new();
        stream.receive(&bytes, Instant::now());
        assert_eq!(stream.drain(), vec![first, second]);
    }

    #[test]
    fn test_complete_packet_followed_by_partial() {
        let first = data_packet(1, &[1]);
        let second = data_packet(2, &[2, 2]);
        let second_bytes = encoded(&second);
        let mut bytes = encoded(&first);
        bytes.extend_from_slice(&second_bytes[..5]);

        let mut stream = DataStream::new();
        let now = Instant::now();
        stream.receive(&bytes, now);
        assert_eq!(stream.drain(), vec![first]);
        assert_eq!(stream.backlog_len(), 5);

        stream.receive(&second_bytes[5..], now);
        assert_eq!(stream.drain(), vec![second]);
    }

    #[test]
    fn test_corrupt_packet_discards_whole_backlog() {
        let mut bad = encoded(&data_packet(1, &[1, 2, 3]));
        bad[12] ^= 0xFF;
        let good = encoded(&data_packet(2, &[4]));
        let mut bytes = bad.clone();
        bytes.extend(&good);

        let mut stream = DataStream::new();
        stream.receive(&bytes, Instant::now());
        assert!(stream.drain().is_empty());
        assert_eq!(stream.backlog_len(), 0);
        assert_eq!(stream.bytes_discarded(), bytes.len() as u64);

        // The stream recovers with the next clean packet.
        stream.receive(&good, Instant::now());
        assert_eq!(stream.drain().len(), 1);
    }

    #[test]
    fn test_zero_declared_size_does_not_spin() {
        let mut stream = DataStream::new();
        stream.receive(&[0u8; 12], Instant::now());
        assert!(stream.drain().is_empty());
        assert_eq!(stream.backlog_len(), 0);
    }

    #[test]
    fn test_implausible_declared_size_discards_backlog() {
        let good = encoded(&data_packet(3, &[7, 7]));
        let mut stream = DataStream::new();
        let now = Instant::now();

        stream.receive(&[0xFF; 12], now);
        assert!(stream.drain().is_empty());
        assert_eq!(stream.backlog_len(), 0);
        assert_eq!(stream.bytes_discarded(), 12);

        for _ in 0..3 {
            stream.receive(&good, now);
            assert_eq!(stream.drain(), vec![data_packet(3, &[7, 7])]);
        }
        assert_eq!(stream.backlog_len(), 0);
    }

    #[test]
    fn test_stray_prefix_glued_to_good_packet_recovers_on_next_receive() {
        let good = encoded(&data_packet(4, &[1]));
        let mut bytes = vec![0xFF; 12];
        bytes.extend(&good);

        let mut stream = DataStream::new();
        stream.receive(&bytes, Instant::now());
        assert!(stream.drain().is_empty());
        assert_eq!(stream.backlog_len(), 0);

        stream.receive(&good, Instant::now());
        assert_eq!(stream.drain().len(), 1);
    }

    #[test]
    fn test_short_backlog_is_kept() {
        let mut stream = DataStream::new();
        stream.receive(&[0, 0, 0], Instant::now());
        assert!(stream.drain().is_empty());
        assert_eq!(stream.backlog_len(), 3);
    }

    #[test]
    fn test_backlog_grows_past_initial_capacity() {
        let packet = data_packet(9, &[0x5A; 3000]);
        let bytes = encoded(&packet);
        let mut stream = DataStream::new();
        let now = Instant::now();
        for chunk in bytes.chunks(700) {
            stream.receive(chunk, now);
        }
        assert!(stream.backlog.capacity() >= bytes.len());
        assert_eq!(stream.drain(), vec![packet]);
    }

    #[test]
    fn test_receive_updates_timestamp() {
        let mut stream = DataStream::new();
        assert!(stream.last_received().is_none());
        let now = Instant::now();
        stream.receive(&[1], now);
        assert_eq!(stream.last_received(), Some(now));
    }
}
