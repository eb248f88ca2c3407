//! DCE RPC Endpoint Mapper (EPM) lookup client
//!
//! Enumerates the endpoints a remote host has registered with its endpoint
//! mapper on TCP port 135, using the connection-oriented DCE RPC protocol
//! with the NDR transfer syntax.
//!
//! The crate is split into:
//!
//! - [`pdu`]: encoding of BIND and `ept_lookup` REQUEST PDUs, decoding of the
//!   BIND_ACK, BIND_NAK, RESPONSE and FAULT replies
//! - [`tower`]: protocol tower decoding into a normalized endpoint record
//! - [`transport`]: the byte transport under a session, TCP by default
//! - [`session`]: the bind and lookup state machine
//!
//! # Example
//!
//! ```no_run
//! use epmap::{LookupSessionBuilder, EPM_PORT};
//!
//! #[tokio::main]
//! async fn main() -> epmap::Result<()> {
//!     let mut session = LookupSessionBuilder::new().connect("192.0.2.10", EPM_PORT).await?;
//!     session.bind().await?;
//!
//!     for entry in session.enumerate().await? {
//!         if let (Some(interface), Some(endpoint)) = (entry.tower.interface, entry.tower.endpoint()) {
//!             println!("{} {}", interface, endpoint.binding("192.0.2.10"));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod pdu;
pub mod session;
pub mod tower;
pub mod transport;

// Re-export error types
pub use error::{EpmError, ProtocolError, Result};

// PDU exports
pub use pdu::{
    BindAckPdu, BindNakPdu, BindPdu, ContextResult, ContinuationHandle, EncodePdu, EptLookupRequest,
    EptLookupResponse, FaultPdu, FaultStatus, LookupEntry, LookupStatus, PacketFlags, PacketType, PduHeader,
    PresentationResult, RejectReason, ShutdownPdu, SyntaxId, DEFAULT_MAX_FRAG, EPM_INTERFACE_UUID,
    EPM_INTERFACE_VERSION, EPM_PORT, EPT_S_NOT_REGISTERED,
};
pub use session::{LookupSession, LookupSessionBuilder, LookupStep, SessionConfig, SessionState};
pub use tower::{Endpoint, Floor, ProtocolTag, Tower};
pub use transport::{StreamTransport, TcpTransport, Transport};

pub use epmap_ndr::Uuid;
