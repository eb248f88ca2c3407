//! Bounds-checked byte cursors
//!
//! [`WriteCursor`] owns a fixed-capacity buffer that is reused for every
//! outbound PDU. [`ReadCursor`] walks the valid prefix of a receive buffer.
//! Neither grows: an access past the end sets the overrun flag and returns an
//! error instead of wrapping or truncating.
//!
//! All multi-byte integers are little-endian (NDR with `drep[0] = 0x10`)
//! unless the method name says otherwise.

use crate::error::{NdrError, Result};
use bytes::{Bytes, BytesMut};

/// Default capacity of a send or receive buffer, the largest PDU this client
/// ever exchanges.
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Number of padding bytes needed to bring `position` up to `alignment`
#[inline]
pub fn align_padding(position: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return 0;
    }
    let remainder = position % alignment;
    if remainder == 0 {
        0
    } else {
        alignment - remainder
    }
}

/// Write cursor over an owned, fixed-capacity buffer
#[derive(Debug)]
pub struct WriteCursor {
    buf: BytesMut,
    offset: usize,
    length: usize,
    overrun: bool,
}

impl WriteCursor {
    /// Allocate a zeroed buffer of exactly `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::zeroed(capacity),
            offset: 0,
            length: 0,
            overrun: false,
        }
    }

    /// Fixed capacity in bytes
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Rewind to the start and forget everything written so far
    pub fn reset(&mut self) {
        self.offset = 0;
        self.length = 0;
        self.overrun = false;
    }

    /// Current write offset
    pub fn tell(&self) -> usize {
        self.offset
    }

    /// Move the write offset, e.g. back to a length field that has to be
    /// patched once the body is known.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.capacity() {
            return Err(NdrError::SeekOutOfRange {
                offset,
                limit: self.capacity(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Number of bytes written (high-water mark, unaffected by seeking back)
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// True once any write has been discarded for lack of space
    pub fn is_overrun(&self) -> bool {
        self.overrun
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        if self.offset >= self.capacity() {
            self.overrun = true;
            return Err(NdrError::WriteOverrun {
                offset: self.offset,
                capacity: self.capacity(),
            });
        }
        self.buf[self.offset] = value;
        self.offset += 1;
        self.length = self.length.max(self.offset);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Big-endian u16 (tower port floors)
    pub fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            self.write_u8(b)?;
        }
        Ok(())
    }

    /// Write zero bytes up to the next multiple of `alignment`
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        for _ in 0..align_padding(self.offset, alignment) {
            self.write_u8(0)?;
        }
        Ok(())
    }

    /// The bytes written so far
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.length]
    }

    /// Copy the written bytes out
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_slice())
    }
}

/// Read cursor over the valid bytes of a received PDU
#[derive(Debug, Clone)]
pub struct ReadCursor<'a> {
    data: &'a [u8],
    offset: usize,
    overrun: bool,
}

impl<'a> ReadCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            overrun: false,
        }
    }

    /// Valid length of the underlying data
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn tell(&self) -> usize {
        self.offset
    }

    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(NdrError::SeekOutOfRange {
                offset,
                limit: self.data.len(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    /// True once any read has run past the valid length
    pub fn is_overrun(&self) -> bool {
        self.overrun
    }

    fn out_of_bounds(&mut self) -> NdrError {
        self.overrun = true;
        NdrError::ReadOverrun {
            offset: self.offset,
            length: self.data.len(),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        match self.data.get(self.offset) {
            Some(&b) => {
                self.offset += 1;
                Ok(b)
            }
            None => Err(self.out_of_bounds()),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Big-endian u16 (tower port floors)
    pub fn read_u16_be(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.out_of_bounds());
        }
        let data = self.data;
        let slice = &data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Advance `len` bytes without looking at them
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_slice(len).map(|_| ())
    }

    /// Consume padding up to the next multiple of `alignment`. Padding bytes
    /// are not required to be zero and are not inspected.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        self.skip(align_padding(self.offset, alignment))
    }
}
