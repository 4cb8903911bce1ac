// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire codec for messages and packets.
//!
//! All integers are big-endian.
//!
//! ```text
//! Packet
//! +----------------+-----------------+-------------------------+--------------+
//! | total_size:u32 | msg_count:u16   | (header + body) x count | checksum:u32 |
//! +----------------+-----------------+-------------------------+--------------+
//!
//! Message header
//! +----------+----------+
//! | size:u32 | type:u16 |   size covers header + body
//! +----------+----------+
//!
//! Discovery body (type 1)
//!   identifier:u16 | node_count:u16 | { id:u16 | addr:u32 | jump_count:u16 | jump:u16 x jump_count } x node_count
//!
//! Data body (type 2)
//!   identifier:u16 | payload_len:u16 | payload
//! ```
//!
//! The checksum is derived from an MD5 digest of every byte from `total_size`
//! through the last message byte: the final four digest bytes, taken as a
//! little-endian word, are written big-endian.

use std::net::Ipv4Addr;

use md5::{Digest, Md5};

use crate::config::{
    MAX_PACKET_SIZE, MESSAGE_HEADER_SIZE, MESSAGE_TYPE_DATA, MESSAGE_TYPE_DISCOVERY,
    PACKET_CHECKSUM_SIZE, PACKET_HEADER_SIZE,
};
use crate::core::ser::{Buffer, CodecError, CodecResult};

use super::message::{DataMessage, DiscoveryMessage, Message, NodeEntry, Packet};

/// Per-message envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Encoded size of the whole message, header included.
    pub size: u32,
    /// Wire type tag.
    pub kind: u16,
}

impl MessageHeader {
    pub fn encode(&self, buffer: &mut Buffer) -> CodecResult<()> {
        buffer.append(self.size)?;
        buffer.append(self.kind)
    }

    pub fn decode(buffer: &mut Buffer) -> CodecResult<Self> {
        let size = buffer.read::<u32>()?;
        let kind = buffer.read::<u16>()?;
        Ok(Self { size, kind })
    }
}

/// Encoding of one message kind (body only; the header is handled by [`encode_message`]).
pub trait MessageCodec: Sized {
    /// Wire type tag.
    const KIND: u16;

    /// Encoded body size in bytes.
    fn body_size(&self) -> usize;

    fn encode_body(&self, buffer: &mut Buffer) -> CodecResult<()>;

    fn decode_body(buffer: &mut Buffer) -> CodecResult<Self>;

    /// Encoded size including the message header.
    fn encoded_size(&self) -> usize {
        MESSAGE_HEADER_SIZE + self.body_size()
    }
}

impl MessageCodec for DiscoveryMessage {
    const KIND: u16 = MESSAGE_TYPE_DISCOVERY;

    fn body_size(&self) -> usize {
        4 + self.nodes.iter().map(NodeEntry::encoded_size).sum::<usize>()
    }

    fn encode_body(&self, buffer: &mut Buffer) -> CodecResult<()> {
        buffer.append(self.identifier)?;
        buffer.append(wire_count(self.nodes.len(), "node count")?)?;
        for node in &self.nodes {
            buffer.append(node.identifier)?;
            buffer.append(u32::from(node.address))?;
            buffer.append(wire_count(node.jumps.len(), "jump count")?)?;
            for &jump in &node.jumps {
                buffer.append(jump)?;
            }
        }
        Ok(())
    }

    fn decode_body(buffer: &mut Buffer) -> CodecResult<Self> {
        let identifier = buffer.read::<u16>()?;
        let node_count = buffer.read::<u16>()? as usize;

        // Smallest node entry is 8 bytes; cap the allocation by what is present.
        let mut nodes = Vec::with_capacity(node_count.min(buffer.bytes_left_to_read() / 8));
        for _ in 0..node_count {
            let node_id = buffer.read::<u16>()?;
            let address = Ipv4Addr::from(buffer.read::<u32>()?);
            let jump_count = buffer.read::<u16>()? as usize;
            let jump_bytes = buffer.read_buffer(jump_count * 2)?;
            let jumps = jump_bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            nodes.push(NodeEntry::new(node_id, address, jumps));
        }

        Ok(Self { identifier, nodes })
    }
}

impl MessageCodec for DataMessage {
    const KIND: u16 = MESSAGE_TYPE_DATA;

    fn body_size(&self) -> usize {
        4 + self.payload.len()
    }

    fn encode_body(&self, buffer: &mut Buffer) -> CodecResult<()> {
        buffer.append(self.identifier)?;
        buffer.append(wire_count(self.payload.len(), "payload length")?)?;
        buffer.append_bytes(&self.payload)
    }

    fn decode_body(buffer: &mut Buffer) -> CodecResult<Self> {
        let identifier = buffer.read::<u16>()?;
        let len = buffer.read::<u16>()? as usize;
        let payload = buffer.read_buffer(len)?.to_vec();
        Ok(Self {
            identifier,
            payload,
        })
    }
}

/// Encoded size of a message, header included.
pub fn message_size(message: &Message) -> usize {
    match message {
        Message::Discovery(discovery) => discovery.encoded_size(),
        Message::Data(data) => data.encoded_size(),
    }
}

/// Encoded size of a packet: envelope fields plus every message.
pub fn packet_size(packet: &Packet) -> usize {
    PACKET_HEADER_SIZE + packet.messages.iter().map(message_size).sum::<usize>()
}

/// Encode header and body of one message.
pub fn encode_message(message: &Message, buffer: &mut Buffer) -> CodecResult<()> {
    match message {
        Message::Discovery(discovery) => encode_with_header(discovery, buffer),
        Message::Data(data) => encode_with_header(data, buffer),
    }
}

fn encode_with_header<M: MessageCodec>(message: &M, buffer: &mut Buffer) -> CodecResult<()> {
    let size = message.encoded_size();
    let header = MessageHeader {
        size: u32::try_from(size).map_err(|_| CodecError::TooLarge {
            what: "message",
            len: size,
        })?,
        kind: M::KIND,
    };
    header.encode(buffer)?;
    message.encode_body(buffer)
}

/// Decode one message: header, then the body selected by the header type.
///
/// The bytes consumed must match the size declared in the header.
pub fn decode_message(buffer: &mut Buffer) -> CodecResult<Message> {
    let start = buffer.read_offset();
    let header = MessageHeader::decode(buffer)?;
    let message = match header.kind {
        MESSAGE_TYPE_DISCOVERY => Message::Discovery(DiscoveryMessage::decode_body(buffer)?),
        MESSAGE_TYPE_DATA => Message::Data(DataMessage::decode_body(buffer)?),
        other => return Err(CodecError::UnknownMessageType(other)),
    };

    let consumed = buffer.read_offset() - start;
    if consumed != header.size as usize {
        return Err(CodecError::SizeMismatch {
            declared: header.size as usize,
            actual: consumed,
        });
    }
    Ok(message)
}

/// Packet checksum over `bytes` (size field through the last message byte).
pub fn checksum(bytes: &[u8]) -> u32 {
    let digest = Md5::digest(bytes);
    u32::from_le_bytes([digest[12], digest[13], digest[14], digest[15]])
}

/// Encode `packet` at the write cursor.
///
/// Fails without touching the buffer when the packet does not fit.
/// Returns the encoded size.
pub fn encode_packet(packet: &Packet, buffer: &mut Buffer) -> CodecResult<usize> {
    let total = packet_size(packet);
    if total > buffer.remaining_capacity() {
        return Err(CodecError::BufferFull {
            needed: total,
            available: buffer.remaining_capacity(),
        });
    }
    let total_field = u32::try_from(total).map_err(|_| CodecError::TooLarge {
        what: "packet",
        len: total,
    })?;
    let count = wire_count(packet.messages.len(), "message count")?;
    for message in &packet.messages {
        check_field_ranges(message)?;
    }
    if total > MAX_PACKET_SIZE {
        return Err(CodecError::TooLarge {
            what: "packet",
            len: total,
        });
    }

    let start = buffer.len();
    buffer.append(total_field)?;
    buffer.append(count)?;
    for message in &packet.messages {
        encode_message(message, buffer)?;
    }
    let sum = checksum(buffer.written_since(start));
    buffer.append(sum)?;

    log::trace!(
        "[codec] encoded packet: {} messages, {} bytes, checksum {:#010x}",
        packet.messages.len(),
        total,
        sum
    );
    Ok(total)
}

/// Encode `packet` into a freshly sized vector.
pub fn encode_packet_to_vec(packet: &Packet) -> CodecResult<Vec<u8>> {
    let mut buffer = Buffer::new(packet_size(packet));
    encode_packet(packet, &mut buffer)?;
    Ok(buffer.into_vec())
}

/// Declared `total_size` of the packet starting at the read cursor, without consuming it.
pub fn peek_packet_size(buffer: &Buffer) -> CodecResult<usize> {
    Ok(buffer.peek::<u32>()? as usize)
}

/// Check size and checksum of the packet at the read cursor.
///
/// The read cursor is restored afterwards so decoding can re-scan from the top.
pub fn validate_packet(buffer: &mut Buffer) -> CodecResult<()> {
    let start = buffer.read_offset();
    let result = validate_at_cursor(buffer);
    buffer.set_read_offset(start);
    result
}

fn validate_at_cursor(buffer: &mut Buffer) -> CodecResult<()> {
    let declared = peek_packet_size(buffer)?;
    if declared < PACKET_HEADER_SIZE {
        return Err(CodecError::SizeMismatch {
            declared,
            actual: PACKET_HEADER_SIZE,
        });
    }
    if declared > MAX_PACKET_SIZE {
        return Err(CodecError::TooLarge {
            what: "packet",
            len: declared,
        });
    }
    let available = buffer.bytes_left_to_read();
    if declared > available {
        return Err(CodecError::Truncated {
            offset: buffer.read_offset(),
            needed: declared,
            available,
        });
    }

    let computed = checksum(buffer.read_buffer(declared - PACKET_CHECKSUM_SIZE)?);
    let carried = buffer.read::<u32>()?;
    if carried != computed {
        return Err(CodecError::ChecksumMismatch { carried, computed });
    }
    Ok(())
}

/// Validate, then decode the packet at the read cursor.
///
/// On success the read cursor sits just past the checksum. On failure no
/// partial packet is returned and the cursor is restored.
pub fn decode_packet(buffer: &mut Buffer) -> CodecResult<Packet> {
    let start = buffer.read_offset();
    validate_packet(buffer)?;
    let result = decode_validated(buffer, start);
    if result.is_err() {
        buffer.set_read_offset(start);
    }
    result
}

fn decode_validated(buffer: &mut Buffer, start: usize) -> CodecResult<Packet> {
    let declared = buffer.read::<u32>()? as usize;
    let count = buffer.read::<u16>()? as usize;

    let mut messages = Vec::with_capacity(count.min(declared / MESSAGE_HEADER_SIZE));
    for index in 0..count {
        match decode_message(buffer) {
            Ok(message) => messages.push(message),
            Err(err) => {
                log::debug!(
                    "[codec] message {}/{} failed to decode, dropping packet: {}",
                    index + 1,
                    count,
                    err
                );
                return Err(err);
            }
        }
    }

    let consumed = buffer.read_offset() - start + PACKET_CHECKSUM_SIZE;
    if consumed != declared {
        return Err(CodecError::SizeMismatch {
            declared,
            actual: consumed,
        });
    }
    // Already verified by validate_packet.
    buffer.read::<u32>()?;

    Ok(Packet { messages })
}

/// Decode one packet from a byte slice that holds exactly that packet.
pub fn decode_packet_bytes(bytes: &[u8]) -> CodecResult<Packet> {
    let mut buffer = Buffer::from_bytes(bytes);
    let packet = decode_packet(&mut buffer)?;
    if buffer.bytes_left_to_read() != 0 {
        return Err(CodecError::SizeMismatch {
            declared: buffer.read_offset(),
            actual: bytes.len(),
        });
    }
    Ok(packet)
}

/// Every length that travels as a `u16` must fit one.
fn check_field_ranges(message: &Message) -> CodecResult<()> {
    match message {
        Message::Discovery(discovery) => {
            wire_count(discovery.nodes.len(), "node count")?;
            for node in &discovery.nodes {
                wire_count(node.jumps.len(), "jump count")?;
            }
        }
        Message::Data(data) => {
            wire_count(data.payload.len(), "payload length")?;
        }
    }
    Ok(())
}

fn wire_count(len: usize, what: &'static str) -> CodecResult<u16> {
    u16::try_from(len).map_err(|_| CodecError::TooLarge { what, len })
}
