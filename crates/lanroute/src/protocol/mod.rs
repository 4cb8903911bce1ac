// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire protocol: message model and packet codec.
//!
//! See [`codec`] for the byte layout.

pub mod codec;
pub mod message;

pub use codec::{
    checksum, decode_message, decode_packet, decode_packet_bytes, encode_message, encode_packet,
    encode_packet_to_vec, message_size, packet_size, peek_packet_size, validate_packet,
    MessageCodec, MessageHeader,
};
pub use message::{DataMessage, DiscoveryMessage, Message, NodeEntry, Packet};
