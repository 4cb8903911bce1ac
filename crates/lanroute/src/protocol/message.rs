// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message model carried inside a packet.

use std::net::Ipv4Addr;

/// One route known by the sender of a discovery message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    pub identifier: u16,
    pub address: Ipv4Addr,
    /// Ordered cost path, one element per hop.
    pub jumps: Vec<u16>,
}

impl NodeEntry {
    pub fn new(identifier: u16, address: Ipv4Addr, jumps: Vec<u16>) -> Self {
        Self {
            identifier,
            address,
            jumps,
        }
    }

    /// Sum of the jump path.
    pub fn cost(&self) -> u32 {
        self.jumps.iter().map(|&jump| u32::from(jump)).sum()
    }

    /// Bytes this entry occupies inside a discovery body.
    pub fn encoded_size(&self) -> usize {
        2 + 4 + 2 + 2 * self.jumps.len()
    }
}

/// Periodic announcement of a node and the routes it knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryMessage {
    /// Originating node id.
    pub identifier: u16,
    pub nodes: Vec<NodeEntry>,
}

impl DiscoveryMessage {
    pub fn new(identifier: u16, nodes: Vec<NodeEntry>) -> Self {
        Self { identifier, nodes }
    }
}

/// Opaque application payload; never interpreted by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataMessage {
    pub identifier: u16,
    pub payload: Vec<u8>,
}

impl DataMessage {
    pub fn new(identifier: u16, payload: Vec<u8>) -> Self {
        Self {
            identifier,
            payload,
        }
    }
}

/// Closed set of message kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Discovery(DiscoveryMessage),
    Data(DataMessage),
}

impl From<DiscoveryMessage> for Message {
    fn from(message: DiscoveryMessage) -> Self {
        Message::Discovery(message)
    }
}

impl From<DataMessage> for Message {
    fn from(message: DataMessage) -> Self {
        Message::Data(message)
    }
}

/// Ordered batch of messages, transmitted as one checksummed unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub messages: Vec<Message>,
}

impl Packet {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Packet carrying a single message.
    pub fn single(message: impl Into<Message>) -> Self {
        Self {
            messages: vec![message.into()],
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
