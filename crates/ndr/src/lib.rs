//! NDR (Network Data Representation) runtime for the endpoint mapper client
//!
//! Bounds-checked cursors plus the small set of NDR types the lookup exchange
//! needs: little-endian unsigned integers and DCE UUIDs.
//!
//! # NDR Wire Format
//!
//! - Integers are little-endian (`drep[0] = 0x10`)
//! - Alignment is applied explicitly by the caller
//! - Padding is zero on write and ignored on read

mod cursor;
mod error;
mod primitives;
mod uuid;

pub use cursor::{align_padding, ReadCursor, WriteCursor, DEFAULT_BUFFER_SIZE};
pub use error::{NdrError, Result};
pub use primitives::{NdrDecode, NdrEncode};
pub use uuid::Uuid;

/// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};
