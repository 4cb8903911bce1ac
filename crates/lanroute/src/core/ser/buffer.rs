// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity byte buffer with independent write and read cursors.
//!
//! All scalars travel in network (big-endian) byte order. The buffer never
//! grows implicitly: an append that does not fit fails with
//! [`CodecError::BufferFull`] and leaves the buffer untouched, a read past
//! the written bytes fails with [`CodecError::Truncated`] and leaves the read
//! cursor where it was.
//!
//! ```text
//! 0            read_offset        write_offset        capacity
//! |---consumed---|------unread--------|-----free---------|
//! ```

use super::{CodecError, CodecResult};

/// Fixed-width scalar with a big-endian wire representation.
pub trait WireScalar: Sized + Copy {
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Write `self` into `out` (exactly `SIZE` bytes).
    fn put_be(self, out: &mut [u8]);

    /// Read a value from `bytes` (exactly `SIZE` bytes).
    fn get_be(bytes: &[u8]) -> Self;
}

/// Generate `WireScalar` for primitive integers
macro_rules! impl_wire_scalar {
    ($($type:ty),*) => {
        $(
            impl WireScalar for $type {
                const SIZE: usize = std::mem::size_of::<$type>();

                #[inline]
                fn put_be(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_be_bytes());
                }

                #[inline]
                fn get_be(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$type>()];
                    raw.copy_from_slice(bytes);
                    <$type>::from_be_bytes(raw)
                }
            }
        )*
    };
}

impl_wire_scalar!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Growable-on-request, offset-tracked byte container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    write_offset: usize,
    read_offset: usize,
}

impl Buffer {
    /// Empty buffer able to hold `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity],
            write_offset: 0,
            read_offset: 0,
        }
    }

    /// Wrap already-written bytes; the buffer is full and fully unread.
    pub fn from_vec(data: Vec<u8>) -> Self {
        let write_offset = data.len();
        Self {
            data,
            write_offset,
            read_offset: 0,
        }
    }

    /// Copy of `bytes` as a full, unread buffer.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::from_vec(bytes.to_vec())
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.write_offset
    }

    pub fn is_empty(&self) -> bool {
        self.write_offset == 0
    }

    pub fn remaining_capacity(&self) -> usize {
        self.data.len() - self.write_offset
    }

    pub fn bytes_left_to_read(&self) -> usize {
        self.write_offset - self.read_offset
    }

    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Move the read cursor, clamped to the written region.
    pub fn set_read_offset(&mut self, offset: usize) {
        self.read_offset = offset.min(self.write_offset);
    }

    /// Rewind the read cursor to the start; written bytes are kept.
    pub fn reset_read(&mut self) {
        self.read_offset = 0;
    }

    /// Change capacity and discard everything written (both cursors reset).
    pub fn resize(&mut self, capacity: usize) {
        self.data.resize(capacity, 0);
        self.write_offset = 0;
        self.read_offset = 0;
    }

    /// Append a big-endian scalar.
    pub fn append<T: WireScalar>(&mut self, value: T) -> CodecResult<()> {
        let end = self.reserve(T::SIZE)?;
        value.put_be(&mut self.data[self.write_offset..end]);
        self.write_offset = end;
        Ok(())
    }

    /// Append raw bytes.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let end = self.reserve(bytes.len())?;
        self.data[self.write_offset..end].copy_from_slice(bytes);
        self.write_offset = end;
        Ok(())
    }

    /// Read a big-endian scalar and advance.
    pub fn read<T: WireScalar>(&mut self) -> CodecResult<T> {
        let value = self.peek::<T>()?;
        self.read_offset += T::SIZE;
        Ok(value)
    }

    /// Read a big-endian scalar without advancing.
    pub fn peek<T: WireScalar>(&self) -> CodecResult<T> {
        self.check_readable(T::SIZE)?;
        Ok(T::get_be(
            &self.data[self.read_offset..self.read_offset + T::SIZE],
        ))
    }

    /// Borrow the next `len` unread bytes and advance past them.
    pub fn read_buffer(&mut self, len: usize) -> CodecResult<&[u8]> {
        self.check_readable(len)?;
        let start = self.read_offset;
        self.read_offset += len;
        Ok(&self.data[start..start + len])
    }

    /// Written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.write_offset]
    }

    /// Written bytes from `start` (clamped) up to the write cursor.
    pub fn written_since(&self, start: usize) -> &[u8] {
        &self.data[start.min(self.write_offset)..self.write_offset]
    }

    /// Bytes written but not yet read.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read_offset..self.write_offset]
    }

    /// Written bytes, dropping the unused capacity.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.data.truncate(self.write_offset);
        self.data
    }

    fn reserve(&self, len: usize) -> CodecResult<usize> {
        let available = self.remaining_capacity();
        if len > available {
            return Err(CodecError::BufferFull {
                needed: len,
                available,
            });
        }
        Ok(self.write_offset + len)
    }

    fn check_readable(&self, len: usize) -> CodecResult<()> {
        let available = self.bytes_left_to_read();
        if len > available {
            return Err(CodecError::Truncated {
                offset: self.read_offset,
                needed: len,
                available,
            });
        }
        Ok(())
    }
}
