// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Stream reassembly under arbitrary fragmentation, corruption recovery, and
// demultiplexing across senders.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_panics_doc)]

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Instant;

use lanroute::protocol::encode_packet_to_vec;
use lanroute::{DataHandler, DataMessage, DataStream, DiscoveryMessage, Message, NodeEntry, Packet};

fn sample_packets() -> Vec<Packet> {
    vec![
        Packet::new(vec![
            Message::Discovery(DiscoveryMessage::new(
                3,
                vec![
                    NodeEntry::new(4, Ipv4Addr::new(10, 0, 0, 4), vec![256]),
                    NodeEntry::new(5, Ipv4Addr::new(10, 0, 0, 5), vec![256, 256]),
                ],
            )),
            Message::Data(DataMessage::new(3, b"hello".to_vec())),
        ]),
        Packet::single(DataMessage::new(3, vec![0xEE; 300])),
        Packet::single(DiscoveryMessage::new(3, vec![])),
    ]
}

fn encode(packet: &Packet) -> Vec<u8> {
    encode_packet_to_vec(packet).expect("encode should succeed")
}

#[test]
fn test_split_at_every_offset_matches_whole_receive() {
    let packet = &sample_packets()[0];
    let bytes = encode(packet);
    let now = Instant::now();

    let mut whole = DataStream::new();
    whole.receive(&bytes, now);
    let expected = whole.drain();
    assert_eq!(expected, vec![packet.clone()]);

    for split in 1..bytes.len() {
        let mut stream = DataStream::new();
        stream.receive(&bytes[..split], now);
        assert!(stream.drain().is_empty(), "split {} yielded early", split);
        stream.receive(&bytes[split..], now);
        assert_eq!(stream.drain(), expected, "split {}", split);
        assert_eq!(stream.backlog_len(), 0);
    }
}

#[test]
fn test_random_fragmentation_of_a_packet_sequence() {
    let packets = sample_packets();
    let wire: Vec<u8> = packets.iter().flat_map(encode).collect();
    let mut rng = fastrand::Rng::with_seed(7);

    for _ in 0..100 {
        let mut stream = DataStream::new();
        let mut decoded = Vec::new();
        let mut offset = 0;
        while offset < wire.len() {
            let end = (offset + rng.usize(1..64)).min(wire.len());
            stream.receive(&wire[offset..end], Instant::now());
            decoded.extend(stream.drain());
            offset = end;
        }
        assert_eq!(decoded, packets);
        assert_eq!(stream.backlog_len(), 0);
    }
}

#[test]
fn test_two_packets_in_one_receive_drain_in_order() {
    let packets = sample_packets();
    let mut wire = encode(&packets[0]);
    wire.extend(encode(&packets[1]));

    let mut stream = DataStream::new();
    stream.receive(&wire, Instant::now());
    assert_eq!(stream.drain(), packets[..2].to_vec());
    assert_eq!(stream.packets_decoded(), 2);
}

#[test]
fn test_corruption_discards_backlog_then_recovers() {
    let packets = sample_packets();
    let mut corrupt = encode(&packets[0]);
    corrupt[12] ^= 0xFF;
    let trailing = encode(&packets[2]);

    let mut stream = DataStream::new();
    let mut wire = corrupt.clone();
    wire.extend(&trailing);
    stream.receive(&wire, Instant::now());

    // The corrupt packet poisons everything buffered with it.
    assert!(stream.drain().is_empty());
    assert_eq!(stream.backlog_len(), 0);
    assert_eq!(stream.bytes_discarded(), wire.len() as u64);

    // Later traffic decodes normally.
    stream.receive(&trailing, Instant::now());
    assert_eq!(stream.drain(), vec![packets[2].clone()]);
}

#[test]
fn test_demultiplexer_keeps_senders_apart() {
    let handler = DataHandler::new();
    let recipient = Ipv4Addr::new(10, 0, 0, 1);
    let packets = sample_packets();
    let senders: Vec<SocketAddrV4> = (2..5u8)
        .map(|last| SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, last), 7171))
        .collect();

    // Interleave byte-by-byte chunks from three senders.
    let wires: Vec<Vec<u8>> = packets.iter().map(encode).collect();
    let longest = wires.iter().map(Vec::len).max().unwrap_or(0);
    for chunk_start in (0..longest).step_by(5) {
        for (sender, wire) in senders.iter().zip(&wires) {
            if chunk_start < wire.len() {
                let end = (chunk_start + 5).min(wire.len());
                handler.handle_receive(&wire[chunk_start..end], *sender, recipient);
            }
        }
    }

    let batches = handler.process();
    assert_eq!(batches.len(), 3);
    for ((batch, sender), packet) in batches.iter().zip(&senders).zip(&packets) {
        assert_eq!(batch.key.sender, *sender);
        assert_eq!(batch.key.recipient, recipient);
        assert_eq!(batch.packets, vec![packet.clone()]);
    }
    assert!(handler.process().is_empty());
}

#[test]
fn test_stray_datagram_with_huge_size_does_not_stall_the_stream() {
    let handler = DataHandler::new();
    let sender = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 7171);
    let recipient = Ipv4Addr::new(10, 0, 0, 1);
    let packet = Packet::single(DataMessage::new(2, b"after".to_vec()));
    let wire = encode(&packet);

    handler.handle_receive(&[0xFF; 12], sender, recipient);
    let mut decoded = 0;
    for _ in 0..100 {
        handler.handle_receive(&wire, sender, recipient);
        decoded += handler
            .process()
            .iter()
            .map(|batch| batch.packets.len())
            .sum::<usize>();
    }

    // Only the first good packet is lost with the stray bytes.
    assert_eq!(decoded, 99);
    let key = lanroute::StreamKey { sender, recipient };
    assert_eq!(handler.backlog_len(&key), Some(0));
}
