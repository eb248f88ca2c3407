//! Error types for the endpoint mapper client

use crate::pdu::{PacketType, RejectReason};
use epmap_ndr::NdrError;
use std::io;
use thiserror::Error;

/// Endpoint mapper client errors
#[derive(Debug, Error)]
pub enum EpmError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    #[error("could not initialize transport: {0}")]
    TransportInit(#[source] io::Error),

    #[error("could not resolve host name {host:?}: {source}")]
    NameResolution {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("could not connect to the endpoint mapper at {target}: {source}")]
    ConnectionFailure {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("error while sending: {0}")]
    SendFailure(#[source] io::Error),

    #[error("error while receiving: {0}")]
    ReceiveFailure(#[source] io::Error),

    #[error("protocol error: {0}")]
    ProtocolViolation(#[from] ProtocolError),

    #[error("the endpoint mapper did not acknowledge the bind request (reason: {0})")]
    BindRejected(RejectReason),

    #[error("the endpoint mapper rejected the call request: status 0x{0:08x}")]
    RemoteFault(u32),
}

impl EpmError {
    /// Reject reason for a refused bind
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::BindRejected(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Fault status for a call the server refused
    pub fn fault_status(&self) -> Option<u32> {
        match self {
            Self::RemoteFault(status) => Some(*status),
            _ => None,
        }
    }
}

/// Malformed or unexpected data from the server
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("DCE RPC version mismatch: got {major}.{minor}")]
    VersionMismatch { major: u8, minor: u8 },

    #[error("unknown packet type {0}")]
    UnknownPacketType(u8),

    #[error("unexpected packet type {got} (expected {expected:?})")]
    UnexpectedPacketType { expected: PacketType, got: u8 },

    #[error("fragment length {declared} does not match {received} received bytes")]
    FragLengthMismatch { declared: u16, received: usize },

    #[error("call ID mismatch: expected {expected}, got {got}")]
    CallIdMismatch { expected: u32, got: u32 },

    #[error("no presentation context was accepted")]
    NoContextAccepted,

    #[error("floor {index} overruns its tower")]
    FloorOverrun { index: u16 },

    #[error("floor {index} (protocol 0x{protocol_id:02x}) has a malformed {side} of {len} bytes")]
    MalformedFloor {
        index: u16,
        protocol_id: u8,
        side: &'static str,
        len: u16,
    },

    #[error("unexpected entry count {0}")]
    UnexpectedEntryCount(u32),

    #[error("lookup reported success without an entry")]
    MissingEntry,

    #[error("unexpected lookup status 0x{0:08x}")]
    UnexpectedStatus(u32),

    #[error("malformed NDR data: {0}")]
    Ndr(#[from] NdrError),
}

impl From<NdrError> for EpmError {
    fn from(err: NdrError) -> Self {
        Self::ProtocolViolation(ProtocolError::Ndr(err))
    }
}

pub type Result<T> = std::result::Result<T, EpmError>;
