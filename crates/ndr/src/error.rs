//! NDR error types

use thiserror::Error;

/// Cursor and NDR codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NdrError {
    /// Write past the fixed capacity of the buffer
    #[error("write out of bounds: offset {offset}, capacity {capacity}")]
    WriteOverrun { offset: usize, capacity: usize },

    /// Read past the valid length of the buffer
    #[error("read out of bounds: offset {offset}, length {length}")]
    ReadOverrun { offset: usize, length: usize },

    /// Seek target outside the buffer
    #[error("seek out of range: offset {offset}, limit {limit}")]
    SeekOutOfRange { offset: usize, limit: usize },

    /// UUID string not in canonical 8-4-4-4-12 form
    #[error("invalid UUID string: {0:?}")]
    InvalidUuid(String),
}

/// Result type for NDR operations
pub type Result<T> = std::result::Result<T, NdrError>;
