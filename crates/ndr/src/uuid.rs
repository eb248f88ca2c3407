//! DCE UUID value and its NDR wire form

use crate::cursor::{ReadCursor, WriteCursor};
use crate::error::{NdrError, Result};
use crate::primitives::{NdrDecode, NdrEncode};
use std::fmt;
use std::str::FromStr;

/// Length of the canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form
const UUID_STRING_LEN: usize = 36;
const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];

/// UUID structure (128 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Uuid {
    pub time_low: u32,
    pub time_mid: u16,
    pub time_hi_and_version: u16,
    pub clock_seq_hi_and_reserved: u8,
    pub clock_seq_low: u8,
    pub node: [u8; 6],
}

impl Uuid {
    /// Wire size in bytes
    pub const SIZE: usize = 16;

    /// Nil UUID (all zeros)
    pub const NIL: Self = Self::from_fields(0, 0, 0, [0; 8]);

    /// Build from the three leading fields and the trailing 8 bytes
    /// (`clock_seq_hi_and_reserved`, `clock_seq_low`, then the node).
    pub const fn from_fields(time_low: u32, time_mid: u16, time_hi_and_version: u16, tail: [u8; 8]) -> Self {
        Self {
            time_low,
            time_mid,
            time_hi_and_version,
            clock_seq_hi_and_reserved: tail[0],
            clock_seq_low: tail[1],
            node: [tail[2], tail[3], tail[4], tail[5], tail[6], tail[7]],
        }
    }

    /// Parse the canonical hyphenated form. Hex digits may be either case;
    /// anything else (length, hyphen placement, non-hex characters) is rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || NdrError::InvalidUuid(s.to_string());
        let bytes = s.as_bytes();
        if bytes.len() != UUID_STRING_LEN {
            return Err(invalid());
        }
        for (i, &b) in bytes.iter().enumerate() {
            let ok = if HYPHEN_POSITIONS.contains(&i) {
                b == b'-'
            } else {
                b.is_ascii_hexdigit()
            };
            if !ok {
                return Err(invalid());
            }
        }

        let hex_u32 = |range: std::ops::Range<usize>| u32::from_str_radix(&s[range], 16).map_err(|_| invalid());
        let hex_u8 = |at: usize| u8::from_str_radix(&s[at..at + 2], 16).map_err(|_| invalid());

        let mut node = [0u8; 6];
        for (i, byte) in node.iter_mut().enumerate() {
            *byte = hex_u8(24 + i * 2)?;
        }

        Ok(Self {
            time_low: hex_u32(0..8)?,
            time_mid: hex_u32(9..13)? as u16,
            time_hi_and_version: hex_u32(14..18)? as u16,
            clock_seq_hi_and_reserved: hex_u8(19)?,
            clock_seq_low: hex_u8(21)?,
            node,
        })
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }

    /// The 16-byte NDR wire form
    pub fn to_bytes_le(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.time_low.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.time_mid.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.time_hi_and_version.to_le_bytes());
        bytes[8] = self.clock_seq_hi_and_reserved;
        bytes[9] = self.clock_seq_low;
        bytes[10..16].copy_from_slice(&self.node);
        bytes
    }
}

impl FromStr for Uuid {
    type Err = NdrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.time_low,
            self.time_mid,
            self.time_hi_and_version,
            self.clock_seq_hi_and_reserved,
            self.clock_seq_low,
            self.node[0],
            self.node[1],
            self.node[2],
            self.node[3],
            self.node[4],
            self.node[5]
        )
    }
}

/// Wire form: the three leading fields little-endian, the clock sequence bytes
/// and node bytes copied verbatim.
impl NdrEncode for Uuid {
    fn ndr_encode(&self, dst: &mut WriteCursor) -> Result<()> {
        dst.write_bytes(&self.to_bytes_le())
    }

    fn ndr_size(&self) -> usize {
        Self::SIZE
    }
}

impl NdrDecode for Uuid {
    fn ndr_decode(src: &mut ReadCursor<'_>) -> Result<Self> {
        if src.remaining() < Self::SIZE {
            // Surface the overrun without consuming a partial UUID
            src.skip(Self::SIZE)?;
        }
        Ok(Self {
            time_low: src.read_u32()?,
            time_mid: src.read_u16()?,
            time_hi_and_version: src.read_u16()?,
            clock_seq_hi_and_reserved: src.read_u8()?,
            clock_seq_low: src.read_u8()?,
            node: src.read_array()?,
        })
    }
}
