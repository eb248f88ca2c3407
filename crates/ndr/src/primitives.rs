//! NDR primitive codec
//!
//! The endpoint mapper exchange only needs unsigned little-endian integers and
//! the UUID wire form. Alignment is explicit at each call site: the PDU layouts
//! are fixed, so the cursor never pads on its own.
//!
//! | IDL Type       | Rust Type | Size |
//! |----------------|-----------|------|
//! | byte / small   | u8        | 1    |
//! | unsigned short | u16       | 2    |
//! | unsigned long  | u32       | 4    |
//! | uuid_t         | Uuid      | 16   |

use crate::cursor::{ReadCursor, WriteCursor};
use crate::Result;

/// Types that can be written in NDR form
pub trait NdrEncode {
    fn ndr_encode(&self, dst: &mut WriteCursor) -> Result<()>;

    /// Encoded size in bytes
    fn ndr_size(&self) -> usize;
}

/// Types that can be read from NDR form
pub trait NdrDecode: Sized {
    fn ndr_decode(src: &mut ReadCursor<'_>) -> Result<Self>;
}

macro_rules! impl_ndr_primitive {
    ($ty:ty, $size:expr, $write:ident, $read:ident) => {
        impl NdrEncode for $ty {
            fn ndr_encode(&self, dst: &mut WriteCursor) -> Result<()> {
                dst.$write(*self)
            }

            fn ndr_size(&self) -> usize {
                $size
            }
        }

        impl NdrDecode for $ty {
            fn ndr_decode(src: &mut ReadCursor<'_>) -> Result<Self> {
                src.$read()
            }
        }
    };
}

impl_ndr_primitive!(u8, 1, write_u8, read_u8);
impl_ndr_primitive!(u16, 2, write_u16, read_u16);
impl_ndr_primitive!(u32, 4, write_u32, read_u32);
