// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Big-endian byte buffer and the error type shared by every codec.

pub mod buffer;

pub use buffer::{Buffer, WireScalar};

use std::fmt;

/// Codec error used by the buffer, message and packet layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Append would exceed the remaining capacity.
    BufferFull { needed: usize, available: usize },
    /// Fewer unread bytes than a declared field requires.
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// Carried checksum differs from the recomputed one.
    ChecksumMismatch { carried: u32, computed: u32 },
    /// A declared size disagrees with the bytes actually consumed.
    SizeMismatch { declared: usize, actual: usize },
    /// Message header carries a type tag this codec does not know.
    UnknownMessageType(u16),
    /// A length does not fit its wire field.
    TooLarge { what: &'static str, len: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::BufferFull { needed, available } => {
                write!(f, "buffer full: need {} bytes, {} available", needed, available)
            }
            CodecError::Truncated {
                offset,
                needed,
                available,
            } => write!(
                f,
                "truncated at offset {}: need {} bytes, {} available",
                offset, needed, available
            ),
            CodecError::ChecksumMismatch { carried, computed } => write!(
                f,
                "checksum mismatch: carried {:#010x}, computed {:#010x}",
                carried, computed
            ),
            CodecError::SizeMismatch { declared, actual } => {
                write!(f, "size mismatch: declared {}, actual {}", declared, actual)
            }
            CodecError::UnknownMessageType(kind) => write!(f, "unknown message type {}", kind),
            CodecError::TooLarge { what, len } => {
                write!(f, "{} too large for its wire field: {}", what, len)
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl CodecError {
    /// True when more bytes could turn this failure into a success.
    pub fn is_truncation(&self) -> bool {
        matches!(self, CodecError::Truncated { .. })
    }
}

pub type CodecResult<T> = core::result::Result<T, CodecError>;
