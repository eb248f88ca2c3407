//! DCE RPC connection-oriented PDUs used by the endpoint mapper lookup
//!
//! Wire format per DCE 1.1 RPC (C706) chapter 12, little-endian NDR only.
//!
//! Common header:
//! ```text
//! +--------+--------+--------+--------+
//! |  vers  |vers_min| ptype  | pflags |
//! +--------+--------+--------+--------+
//! |        data representation        |
//! +--------+--------+--------+--------+
//! |   frag_len      |   auth_len      |
//! +--------+--------+--------+--------+
//! |             call_id               |
//! +--------+--------+--------+--------+
//! ```
//!
//! Outbound PDUs are encoded into a reused [`WriteCursor`]: the header goes
//! out with a zero fragment length that is patched once the body is known.
//! Inbound PDUs are validated (packet type, fragment length against the bytes
//! actually received, call ID) before any body field is read.

use crate::error::ProtocolError;
use crate::tower::Tower;
use bytes::Bytes;
use epmap_ndr::{NdrDecode, NdrEncode, ReadCursor, Uuid, WriteCursor, DEFAULT_BUFFER_SIZE};
use std::fmt;

/// DCE RPC protocol version
pub const DCE_RPC_VERSION: u8 = 5;
/// DCE RPC protocol minor version
pub const DCE_RPC_VERSION_MINOR: u8 = 0;
/// Little-endian integers, ASCII, IEEE floats
pub const NDR_DATA_REPRESENTATION: [u8; 4] = [0x10, 0x00, 0x00, 0x00];

/// Well-known port for the Endpoint Mapper
pub const EPM_PORT: u16 = 135;
/// Endpoint Mapper interface UUID (e1af8308-5d1f-11c9-91a4-08002b14a0fa)
pub const EPM_INTERFACE_UUID: Uuid =
    Uuid::from_fields(0xe1af8308, 0x5d1f, 0x11c9, [0x91, 0xa4, 0x08, 0x00, 0x2b, 0x14, 0xa0, 0xfa]);
pub const EPM_INTERFACE_VERSION: u16 = 3;

/// NDR transfer syntax (8a885d04-1ceb-11c9-9fe8-08002b104860)
pub const NDR_SYNTAX_UUID: Uuid =
    Uuid::from_fields(0x8a885d04, 0x1ceb, 0x11c9, [0x9f, 0xe8, 0x08, 0x00, 0x2b, 0x10, 0x48, 0x60]);
pub const NDR_SYNTAX_VERSION: u32 = 2;

/// Bind time feature negotiation (6cb71c2c-9812-4540-0300-000000000000)
pub const BIND_TIME_FEATURE_UUID: Uuid = Uuid::from_fields(0x6cb71c2c, 0x9812, 0x4540, [0x03, 0, 0, 0, 0, 0, 0, 0]);
pub const BIND_TIME_FEATURE_VERSION: u32 = 1;

/// Fragment size offered in both directions
pub const DEFAULT_MAX_FRAG: u16 = 5840;

/// `ept_lookup` operation number
pub const EPT_LOOKUP: u16 = 2;
/// Inquiry type returning every element
pub const RPC_C_EP_ALL_ELTS: u32 = 0;
/// Filler for the object and interface UUIDs, which the server ignores for
/// `RPC_C_EP_ALL_ELTS` but which must be present
pub const LOOKUP_PLACEHOLDER_UUID: Uuid =
    Uuid::from_fields(0xcafebabe, 0xcafe, 0xbabe, [0xca, 0xfe, 0xba, 0xbe, 0xca, 0xfe, 0xba, 0xbe]);
/// Largest annotation that is kept; longer ones are dropped
pub const EPT_MAX_ANNOTATION_SIZE: usize = 64;
/// `ept_lookup` status: no more elements
pub const EPT_S_NOT_REGISTERED: u32 = 0x16c9a0d6;

/// `ept_lookup` request stub size: inquiry type, two referenced UUIDs,
/// versions, version option, handle, max entries
pub const EPT_LOOKUP_STUB_SIZE: usize = 4 + (4 + Uuid::SIZE) * 2 + 2 + 2 + 4 + ContinuationHandle::SIZE + 4;

const FRAG_LENGTH_OFFSET: usize = 8;

type DecodeResult<T> = std::result::Result<T, ProtocolError>;

/// Packet types of the connection-oriented exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Request = 0,
    Response = 2,
    Fault = 3,
    Bind = 11,
    BindAck = 12,
    BindNak = 13,
    Shutdown = 17,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Fault),
            11 => Some(Self::Bind),
            12 => Some(Self::BindAck),
            13 => Some(Self::BindNak),
            17 => Some(Self::Shutdown),
            _ => None,
        }
    }
}

/// Packet flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// First fragment
    pub const FIRST_FRAG: u8 = 0x01;
    /// Last fragment
    pub const LAST_FRAG: u8 = 0x02;

    /// Flags for a complete (non-fragmented) PDU
    pub fn complete() -> Self {
        Self(Self::FIRST_FRAG | Self::LAST_FRAG)
    }

    pub fn is_first_frag(&self) -> bool {
        (self.0 & Self::FIRST_FRAG) != 0
    }

    pub fn is_last_frag(&self) -> bool {
        (self.0 & Self::LAST_FRAG) != 0
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn from_u8(value: u8) -> Self {
        Self(value)
    }
}

/// Common PDU header (16 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduHeader {
    pub version: u8,
    pub version_minor: u8,
    pub packet_type: PacketType,
    pub packet_flags: PacketFlags,
    pub data_rep: [u8; 4],
    /// Total length of the PDU fragment
    pub frag_length: u16,
    pub auth_length: u16,
    pub call_id: u32,
}

impl PduHeader {
    /// PDU header size in bytes
    pub const SIZE: usize = 16;

    pub fn new(packet_type: PacketType, call_id: u32) -> Self {
        Self {
            version: DCE_RPC_VERSION,
            version_minor: DCE_RPC_VERSION_MINOR,
            packet_type,
            packet_flags: PacketFlags::complete(),
            data_rep: NDR_DATA_REPRESENTATION,
            frag_length: 0, // patched after the body
            auth_length: 0,
            call_id,
        }
    }

    pub fn encode(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u8(self.version)?;
        dst.write_u8(self.version_minor)?;
        dst.write_u8(self.packet_type as u8)?;
        dst.write_u8(self.packet_flags.as_u8())?;
        dst.write_bytes(&self.data_rep)?;
        dst.write_u16(self.frag_length)?;
        dst.write_u16(self.auth_length)?;
        dst.write_u32(self.call_id)
    }

    pub fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let version = src.read_u8()?;
        let version_minor = src.read_u8()?;
        if version != DCE_RPC_VERSION {
            return Err(ProtocolError::VersionMismatch {
                major: version,
                minor: version_minor,
            });
        }
        let ptype = src.read_u8()?;
        let packet_type = PacketType::from_u8(ptype).ok_or(ProtocolError::UnknownPacketType(ptype))?;
        let packet_flags = PacketFlags::from_u8(src.read_u8()?);
        let data_rep = src.read_array()?;

        Ok(Self {
            version,
            version_minor,
            packet_type,
            packet_flags,
            data_rep,
            frag_length: src.read_u16()?,
            auth_length: src.read_u16()?,
            call_id: src.read_u32()?,
        })
    }

    /// Decode just the header of a received PDU, e.g. to dispatch on its type
    pub fn peek(data: &[u8]) -> DecodeResult<Self> {
        Self::decode(&mut ReadCursor::new(data))
    }
}

/// Decode and validate the header of a received PDU, leaving the cursor at
/// the first body byte
fn open_pdu(data: &[u8], expected: PacketType, call_id: Option<u32>) -> DecodeResult<(PduHeader, ReadCursor<'_>)> {
    let mut src = ReadCursor::new(data);
    let header = PduHeader::decode(&mut src)?;
    if header.packet_type != expected {
        return Err(ProtocolError::UnexpectedPacketType {
            expected,
            got: header.packet_type as u8,
        });
    }
    if header.frag_length as usize != data.len() {
        return Err(ProtocolError::FragLengthMismatch {
            declared: header.frag_length,
            received: data.len(),
        });
    }
    if let Some(expected) = call_id {
        if header.call_id != expected {
            return Err(ProtocolError::CallIdMismatch {
                expected,
                got: header.call_id,
            });
        }
    }
    Ok((header, src))
}

/// An outbound PDU: a header plus a body
pub trait EncodePdu {
    fn header(&self) -> &PduHeader;

    /// Everything after the common header
    fn encode_body(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()>;

    /// Encode into `dst`, replacing its contents, and patch the fragment
    /// length at offset 8
    fn encode(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.reset();
        self.header().encode(dst)?;
        self.encode_body(dst)?;

        let length = dst.len();
        dst.seek(FRAG_LENGTH_OFFSET)?;
        dst.write_u16(length as u16)?;
        dst.seek(length)
    }

    /// Encode into a fresh buffer
    fn to_bytes(&self) -> epmap_ndr::Result<Bytes> {
        let mut dst = WriteCursor::with_capacity(DEFAULT_BUFFER_SIZE);
        self.encode(&mut dst)?;
        Ok(dst.to_bytes())
    }
}

/// Syntax ID - interface UUID with version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxId {
    pub uuid: Uuid,
    pub version: u32, // major in lower 16 bits, minor in upper 16 bits
}

impl SyntaxId {
    pub const fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self {
            uuid,
            version: (major as u32) | ((minor as u32) << 16),
        }
    }

    pub fn major_version(&self) -> u16 {
        self.version as u16
    }

    pub fn minor_version(&self) -> u16 {
        (self.version >> 16) as u16
    }

    /// Endpoint mapper interface, v3.0
    pub const fn endpoint_mapper() -> Self {
        Self::new(EPM_INTERFACE_UUID, EPM_INTERFACE_VERSION, 0)
    }

    /// NDR transfer syntax, v2
    pub const fn ndr() -> Self {
        Self {
            uuid: NDR_SYNTAX_UUID,
            version: NDR_SYNTAX_VERSION,
        }
    }

    /// Bind time feature negotiation, v1
    pub const fn bind_time_features() -> Self {
        Self {
            uuid: BIND_TIME_FEATURE_UUID,
            version: BIND_TIME_FEATURE_VERSION,
        }
    }
}

impl NdrEncode for SyntaxId {
    fn ndr_encode(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        self.uuid.ndr_encode(dst)?;
        dst.write_u32(self.version)
    }

    fn ndr_size(&self) -> usize {
        Uuid::SIZE + 4
    }
}

impl NdrDecode for SyntaxId {
    fn ndr_decode(src: &mut ReadCursor<'_>) -> epmap_ndr::Result<Self> {
        Ok(Self {
            uuid: Uuid::ndr_decode(src)?,
            version: src.read_u32()?,
        })
    }
}

/// Presentation context offered in a bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextElement {
    pub context_id: u16,
    pub abstract_syntax: SyntaxId,
    pub transfer_syntaxes: Vec<SyntaxId>,
}

impl ContextElement {
    pub fn new(context_id: u16, abstract_syntax: SyntaxId, transfer_syntax: SyntaxId) -> Self {
        Self {
            context_id,
            abstract_syntax,
            transfer_syntaxes: vec![transfer_syntax],
        }
    }
}

impl NdrEncode for ContextElement {
    fn ndr_encode(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u16(self.context_id)?;
        dst.write_u8(self.transfer_syntaxes.len() as u8)?;
        dst.write_u8(0)?; // reserved
        self.abstract_syntax.ndr_encode(dst)?;
        for syntax in &self.transfer_syntaxes {
            syntax.ndr_encode(dst)?;
        }
        Ok(())
    }

    fn ndr_size(&self) -> usize {
        4 + self.abstract_syntax.ndr_size() + self.transfer_syntaxes.len() * (Uuid::SIZE + 4)
    }
}

impl NdrDecode for ContextElement {
    fn ndr_decode(src: &mut ReadCursor<'_>) -> epmap_ndr::Result<Self> {
        let context_id = src.read_u16()?;
        let count = src.read_u8()?;
        let _reserved = src.read_u8()?;
        let abstract_syntax = SyntaxId::ndr_decode(src)?;
        let transfer_syntaxes = (0..count)
            .map(|_| SyntaxId::ndr_decode(src))
            .collect::<epmap_ndr::Result<Vec<_>>>()?;
        Ok(Self {
            context_id,
            abstract_syntax,
            transfer_syntaxes,
        })
    }
}

/// Bind PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindPdu {
    pub header: PduHeader,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    pub assoc_group_id: u32,
    pub contexts: Vec<ContextElement>,
}

impl BindPdu {
    /// Bind to the endpoint mapper, offering NDR on context 0 and bind
    /// time feature negotiation on context 1
    pub fn endpoint_mapper(call_id: u32, max_xmit_frag: u16, max_recv_frag: u16) -> Self {
        Self {
            header: PduHeader::new(PacketType::Bind, call_id),
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id: 0,
            contexts: vec![
                ContextElement::new(0, SyntaxId::endpoint_mapper(), SyntaxId::ndr()),
                ContextElement::new(1, SyntaxId::endpoint_mapper(), SyntaxId::bind_time_features()),
            ],
        }
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let (header, mut src) = open_pdu(data, PacketType::Bind, None)?;
        let max_xmit_frag = src.read_u16()?;
        let max_recv_frag = src.read_u16()?;
        let assoc_group_id = src.read_u32()?;
        let count = src.read_u8()?;
        let _reserved = src.read_u8()?;
        let _reserved2 = src.read_u16()?;
        let contexts = (0..count)
            .map(|_| ContextElement::ndr_decode(&mut src))
            .collect::<epmap_ndr::Result<Vec<_>>>()?;
        Ok(Self {
            header,
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id,
            contexts,
        })
    }
}

impl EncodePdu for BindPdu {
    fn header(&self) -> &PduHeader {
        &self.header
    }

    fn encode_body(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u16(self.max_xmit_frag)?;
        dst.write_u16(self.max_recv_frag)?;
        dst.write_u32(self.assoc_group_id)?;
        dst.write_u8(self.contexts.len() as u8)?;
        dst.write_u8(0)?; // reserved
        dst.write_u16(0)?; // reserved2
        for context in &self.contexts {
            context.ndr_encode(dst)?;
        }
        Ok(())
    }
}

/// Per-context outcome in a bind acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextResult {
    Acceptance,
    UserRejection,
    ProviderRejection,
    /// Reply to a bind time feature negotiation context
    NegotiateAck,
    Other(u16),
}

impl ContextResult {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Acceptance,
            1 => Self::UserRejection,
            2 => Self::ProviderRejection,
            3 => Self::NegotiateAck,
            other => Self::Other(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::Acceptance => 0,
            Self::UserRejection => 1,
            Self::ProviderRejection => 2,
            Self::NegotiateAck => 3,
            Self::Other(value) => *value,
        }
    }
}

/// One entry of the bind acknowledgment result list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentationResult {
    pub result: ContextResult,
    /// Only meaningful when the context was rejected
    pub reason: u16,
    pub transfer_syntax: SyntaxId,
}

impl PresentationResult {
    pub fn accepted(transfer_syntax: SyntaxId) -> Self {
        Self {
            result: ContextResult::Acceptance,
            reason: 0,
            transfer_syntax,
        }
    }

    pub fn rejected(result: ContextResult, reason: u16) -> Self {
        Self {
            result,
            reason,
            transfer_syntax: SyntaxId {
                uuid: Uuid::NIL,
                version: 0,
            },
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.result == ContextResult::Acceptance
    }
}

/// Bind acknowledgment PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAckPdu {
    pub header: PduHeader,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    pub assoc_group_id: u32,
    /// Secondary address as sent, NUL included
    pub secondary_addr: Vec<u8>,
    pub results: Vec<PresentationResult>,
}

impl BindAckPdu {
    pub fn new(call_id: u32, assoc_group_id: u32, secondary_addr: &str, results: Vec<PresentationResult>) -> Self {
        let mut addr = secondary_addr.as_bytes().to_vec();
        addr.push(0);
        Self {
            header: PduHeader::new(PacketType::BindAck, call_id),
            max_xmit_frag: DEFAULT_MAX_FRAG,
            max_recv_frag: DEFAULT_MAX_FRAG,
            assoc_group_id,
            secondary_addr: addr,
            results,
        }
    }

    /// Decode a bind acknowledgment for the bind sent with `call_id`. At
    /// least one presentation context has to be accepted; the others are
    /// reported as they are.
    pub fn decode(data: &[u8], call_id: u32) -> DecodeResult<Self> {
        let (header, mut src) = open_pdu(data, PacketType::BindAck, Some(call_id))?;
        let max_xmit_frag = src.read_u16()?;
        let max_recv_frag = src.read_u16()?;
        let assoc_group_id = src.read_u32()?;

        let addr_len = src.read_u16()?;
        let secondary_addr = src.read_slice(addr_len as usize)?.to_vec();
        src.align(4)?;

        let count = src.read_u8()?;
        let _reserved = src.read_u8()?;
        let _reserved2 = src.read_u16()?;
        let mut results = Vec::with_capacity(count as usize);
        for _ in 0..count {
            results.push(PresentationResult {
                result: ContextResult::from_u16(src.read_u16()?),
                reason: src.read_u16()?,
                transfer_syntax: SyntaxId::ndr_decode(&mut src)?,
            });
        }

        let ack = Self {
            header,
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id,
            secondary_addr,
            results,
        };
        if ack.accepted_context().is_none() {
            return Err(ProtocolError::NoContextAccepted);
        }
        Ok(ack)
    }

    /// Context ID of the first accepted presentation context. Results are
    /// listed in the order the contexts were offered.
    pub fn accepted_context(&self) -> Option<u16> {
        self.results.iter().position(PresentationResult::is_accepted).map(|i| i as u16)
    }

    /// Secondary address without its NUL terminator
    pub fn secondary_addr(&self) -> String {
        let end = self
            .secondary_addr
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.secondary_addr.len());
        String::from_utf8_lossy(&self.secondary_addr[..end]).into_owned()
    }
}

impl EncodePdu for BindAckPdu {
    fn header(&self) -> &PduHeader {
        &self.header
    }

    fn encode_body(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u16(self.max_xmit_frag)?;
        dst.write_u16(self.max_recv_frag)?;
        dst.write_u32(self.assoc_group_id)?;
        dst.write_u16(self.secondary_addr.len() as u16)?;
        dst.write_bytes(&self.secondary_addr)?;
        dst.align(4)?;

        dst.write_u8(self.results.len() as u8)?;
        dst.write_u8(0)?; // reserved
        dst.write_u16(0)?; // reserved2
        for result in &self.results {
            dst.write_u16(result.result.as_u16())?;
            dst.write_u16(result.reason)?;
            result.transfer_syntax.ndr_encode(dst)?;
        }
        Ok(())
    }
}

/// Provider reject reason carried by a bind NAK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotSpecified,
    TemporaryCongestion,
    LocalLimitExceeded,
    CalledPaddrUnknown,
    ProtocolVersionNotSupported,
    DefaultContextNotSupported,
    UserDataNotReadable,
    NoPsapAvailable,
    Unknown(u16),
}

impl RejectReason {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::NotSpecified,
            1 => Self::TemporaryCongestion,
            2 => Self::LocalLimitExceeded,
            3 => Self::CalledPaddrUnknown,
            4 => Self::ProtocolVersionNotSupported,
            5 => Self::DefaultContextNotSupported,
            6 => Self::UserDataNotReadable,
            7 => Self::NoPsapAvailable,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::NotSpecified => 0,
            Self::TemporaryCongestion => 1,
            Self::LocalLimitExceeded => 2,
            Self::CalledPaddrUnknown => 3,
            Self::ProtocolVersionNotSupported => 4,
            Self::DefaultContextNotSupported => 5,
            Self::UserDataNotReadable => 6,
            Self::NoPsapAvailable => 7,
            Self::Unknown(value) => *value,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotSpecified => "reason not specified",
            Self::TemporaryCongestion => "temporary congestion",
            Self::LocalLimitExceeded => "local limit exceeded",
            Self::CalledPaddrUnknown => "called presentation address unknown",
            Self::ProtocolVersionNotSupported => "protocol version not supported",
            Self::DefaultContextNotSupported => "default context not supported",
            Self::UserDataNotReadable => "user data not readable",
            Self::NoPsapAvailable => "no PSAP available",
            Self::Unknown(value) => return write!(f, "{}", value),
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}

/// Bind negative acknowledgment PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindNakPdu {
    pub header: PduHeader,
    pub reject_reason: RejectReason,
}

impl BindNakPdu {
    pub fn new(call_id: u32, reject_reason: RejectReason) -> Self {
        Self {
            header: PduHeader::new(PacketType::BindNak, call_id),
            reject_reason,
        }
    }

    /// The supported protocol versions that follow the reason are not read
    pub fn decode(data: &[u8], call_id: u32) -> DecodeResult<Self> {
        let (header, mut src) = open_pdu(data, PacketType::BindNak, Some(call_id))?;
        Ok(Self {
            header,
            reject_reason: RejectReason::from_u16(src.read_u16()?),
        })
    }
}

impl EncodePdu for BindNakPdu {
    fn header(&self) -> &PduHeader {
        &self.header
    }

    fn encode_body(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u16(self.reject_reason.as_u16())?;
        // One supported version: 5.0
        dst.write_u8(1)?;
        dst.write_u8(DCE_RPC_VERSION)?;
        dst.write_u8(DCE_RPC_VERSION_MINOR)
    }
}

/// Lookup context handle returned by the first response and echoed on every
/// later request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinuationHandle {
    pub attributes: u32,
    pub uuid: Uuid,
}

impl ContinuationHandle {
    pub const SIZE: usize = 4 + Uuid::SIZE;

    pub fn is_nil(&self) -> bool {
        self.uuid.is_nil()
    }
}

impl NdrEncode for ContinuationHandle {
    fn ndr_encode(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u32(self.attributes)?;
        self.uuid.ndr_encode(dst)
    }

    fn ndr_size(&self) -> usize {
        Self::SIZE
    }
}

impl NdrDecode for ContinuationHandle {
    fn ndr_decode(src: &mut ReadCursor<'_>) -> epmap_ndr::Result<Self> {
        Ok(Self {
            attributes: src.read_u32()?,
            uuid: Uuid::ndr_decode(src)?,
        })
    }
}

/// `ept_lookup` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EptLookupRequest {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub opnum: u16,
    pub inquiry_type: u32,
    pub object: Uuid,
    pub interface: Uuid,
    pub version_major: u16,
    pub version_minor: u16,
    pub vers_option: u32,
    pub handle: ContinuationHandle,
    pub max_entries: u32,
}

impl EptLookupRequest {
    /// Ask for the next single element of the whole map
    pub fn new(call_id: u32, handle: ContinuationHandle) -> Self {
        Self {
            header: PduHeader::new(PacketType::Request, call_id),
            alloc_hint: EPT_LOOKUP_STUB_SIZE as u32,
            context_id: 0,
            opnum: EPT_LOOKUP,
            inquiry_type: RPC_C_EP_ALL_ELTS,
            object: LOOKUP_PLACEHOLDER_UUID,
            interface: LOOKUP_PLACEHOLDER_UUID,
            version_major: 0,
            version_minor: 0,
            vers_option: 0,
            handle,
            max_entries: 1,
        }
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let (header, mut src) = open_pdu(data, PacketType::Request, None)?;
        let alloc_hint = src.read_u32()?;
        let context_id = src.read_u16()?;
        let opnum = src.read_u16()?;
        let inquiry_type = src.read_u32()?;
        let object = decode_unique_uuid(&mut src)?;
        let interface = decode_unique_uuid(&mut src)?;
        Ok(Self {
            header,
            alloc_hint,
            context_id,
            opnum,
            inquiry_type,
            object,
            interface,
            version_major: src.read_u16()?,
            version_minor: src.read_u16()?,
            vers_option: src.read_u32()?,
            handle: ContinuationHandle::ndr_decode(&mut src)?,
            max_entries: src.read_u32()?,
        })
    }
}

/// Unique pointer to a UUID: referent ID, then the UUID if non-null
fn decode_unique_uuid(src: &mut ReadCursor<'_>) -> epmap_ndr::Result<Uuid> {
    match src.read_u32()? {
        0 => Ok(Uuid::NIL),
        _ => Uuid::ndr_decode(src),
    }
}

impl EncodePdu for EptLookupRequest {
    fn header(&self) -> &PduHeader {
        &self.header
    }

    fn encode_body(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u32(self.alloc_hint)?;
        dst.write_u16(self.context_id)?;
        dst.write_u16(self.opnum)?;

        dst.write_u32(self.inquiry_type)?;
        dst.write_u32(1)?; // object referent
        self.object.ndr_encode(dst)?;
        dst.write_u32(2)?; // interface referent
        self.interface.ndr_encode(dst)?;
        dst.write_u16(self.version_major)?;
        dst.write_u16(self.version_minor)?;
        dst.write_u32(self.vers_option)?;
        self.handle.ndr_encode(dst)?;
        dst.write_u32(self.max_entries)
    }
}

/// `ept_lookup` completion status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    /// An element was returned
    Ok,
    /// No (more) elements
    NotRegistered,
    Other(u32),
}

impl LookupStatus {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Ok,
            EPT_S_NOT_REGISTERED => Self::NotRegistered,
            other => Self::Other(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::NotRegistered => EPT_S_NOT_REGISTERED,
            Self::Other(value) => *value,
        }
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::NotRegistered => write!(f, "no more elements (0x{:08x})", EPT_S_NOT_REGISTERED),
            Self::Other(value) => write!(f, "0x{:08x}", value),
        }
    }
}

/// One element of the endpoint map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    pub object: Uuid,
    /// Empty when absent or too long to keep
    pub annotation: String,
    pub tower: Tower,
}

impl LookupEntry {
    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let object = Uuid::ndr_decode(src)?;
        let _tower_referent = src.read_u32()?;

        let _annotation_offset = src.read_u32()?;
        let annotation_len = src.read_u32()? as usize;
        let raw = src.read_slice(annotation_len)?;
        let annotation = if annotation_len <= EPT_MAX_ANNOTATION_SIZE {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            String::from_utf8_lossy(&raw[..end]).into_owned()
        } else {
            String::new()
        };
        src.align(4)?;

        let _max_count = src.read_u32()?;
        let tower_length = src.read_u32()? as usize;
        let tower = Tower::decode(src.read_slice(tower_length)?)?;

        Ok(Self {
            object,
            annotation,
            tower,
        })
    }

    fn encode(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        self.object.ndr_encode(dst)?;
        dst.write_u32(3)?; // tower referent

        dst.write_u32(0)?; // annotation offset
        dst.write_u32(self.annotation.len() as u32 + 1)?;
        dst.write_bytes(self.annotation.as_bytes())?;
        dst.write_u8(0)?;
        dst.align(4)?;

        let tower_length = self.tower.ndr_size() as u32;
        dst.write_u32(tower_length)?; // max_count
        dst.write_u32(tower_length)?;
        self.tower.ndr_encode(dst)
    }
}

/// `ept_lookup` response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EptLookupResponse {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    pub handle: ContinuationHandle,
    pub entries: Vec<LookupEntry>,
    pub status: u32,
}

impl EptLookupResponse {
    pub fn new(call_id: u32, handle: ContinuationHandle, entries: Vec<LookupEntry>, status: u32) -> Self {
        Self {
            header: PduHeader::new(PacketType::Response, call_id),
            alloc_hint: 0, // computed while encoding
            context_id: 0,
            cancel_count: 0,
            handle,
            entries,
            status,
        }
    }

    /// Final response of an enumeration
    pub fn exhausted(call_id: u32, handle: ContinuationHandle) -> Self {
        Self::new(call_id, handle, Vec::new(), EPT_S_NOT_REGISTERED)
    }

    /// Decode the response to the request sent with `call_id`. The server is
    /// asked for one element at a time, so at most one entry is accepted.
    pub fn decode(data: &[u8], call_id: u32) -> DecodeResult<Self> {
        let (header, mut src) = open_pdu(data, PacketType::Response, Some(call_id))?;
        let alloc_hint = src.read_u32()?;
        let context_id = src.read_u16()?;
        let cancel_count = src.read_u8()?;
        let _reserved = src.read_u8()?;

        let handle = ContinuationHandle::ndr_decode(&mut src)?;
        let count = src.read_u32()?;
        let _max_count = src.read_u32()?;
        let _offset = src.read_u32()?;
        let _actual_count = src.read_u32()?;
        if count > 1 {
            return Err(ProtocolError::UnexpectedEntryCount(count));
        }
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(LookupEntry::decode(&mut src)?);
        }

        src.align(4)?;
        let status = src.read_u32()?;

        Ok(Self {
            header,
            alloc_hint,
            context_id,
            cancel_count,
            handle,
            entries,
            status,
        })
    }

    pub fn lookup_status(&self) -> LookupStatus {
        LookupStatus::from_u32(self.status)
    }
}

impl EncodePdu for EptLookupResponse {
    fn header(&self) -> &PduHeader {
        &self.header
    }

    fn encode_body(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        let hint_at = dst.tell();
        dst.write_u32(0)?; // alloc_hint, patched below
        dst.write_u16(self.context_id)?;
        dst.write_u8(self.cancel_count)?;
        dst.write_u8(0)?; // reserved
        let stub_start = dst.tell();

        self.handle.ndr_encode(dst)?;
        let count = self.entries.len() as u32;
        dst.write_u32(count)?;
        dst.write_u32(count)?; // max_count
        dst.write_u32(0)?; // offset
        dst.write_u32(count)?; // actual_count
        for entry in &self.entries {
            entry.encode(dst)?;
        }
        dst.align(4)?;
        dst.write_u32(self.status)?;

        let end = dst.tell();
        dst.seek(hint_at)?;
        dst.write_u32((end - stub_start) as u32)?;
        dst.seek(end)
    }
}

/// Run-time fault codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FaultStatus {
    /// Access denied
    AccessDenied = 0x00000005,
    /// Bad stub data
    BadStubData = 0x000006f7,
    /// Context mismatch
    ContextMismatch = 0x1c00001a,
    /// Operation not implemented
    OpRngError = 0x1c010002,
    /// Unknown interface
    UnkIf = 0x1c010003,
    /// Wrong boot time
    WrongBootTime = 0x1c010006,
    /// Server crashed
    YouCrashed = 0x1c010009,
    /// Protocol error
    ProtoError = 0x1c01000b,
    /// Output arguments too big
    OutArgsTooBig = 0x1c010013,
    /// Server too busy
    ServerTooBusy = 0x1c010014,
    /// Unsupported type
    UnsupportedType = 0x1c010017,
}

impl FaultStatus {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x00000005 => Some(Self::AccessDenied),
            0x000006f7 => Some(Self::BadStubData),
            0x1c00001a => Some(Self::ContextMismatch),
            0x1c010002 => Some(Self::OpRngError),
            0x1c010003 => Some(Self::UnkIf),
            0x1c010006 => Some(Self::WrongBootTime),
            0x1c010009 => Some(Self::YouCrashed),
            0x1c01000b => Some(Self::ProtoError),
            0x1c010013 => Some(Self::OutArgsTooBig),
            0x1c010014 => Some(Self::ServerTooBusy),
            0x1c010017 => Some(Self::UnsupportedType),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access denied",
            Self::BadStubData => "bad stub data",
            Self::ContextMismatch => "context mismatch",
            Self::OpRngError => "operation range error",
            Self::UnkIf => "unknown interface",
            Self::WrongBootTime => "wrong boot time",
            Self::YouCrashed => "server crashed",
            Self::ProtoError => "protocol error",
            Self::OutArgsTooBig => "output arguments too big",
            Self::ServerTooBusy => "server too busy",
            Self::UnsupportedType => "unsupported type",
        }
    }

    /// Name and code, or just the code when it is not a known fault
    pub fn describe(status: u32) -> String {
        match Self::from_u32(status) {
            Some(known) => format!("{} (0x{:08x})", known.name(), status),
            None => format!("status 0x{:08x}", status),
        }
    }
}

/// Fault PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultPdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    pub status: u32,
}

impl FaultPdu {
    pub fn new(call_id: u32, status: u32) -> Self {
        Self {
            header: PduHeader::new(PacketType::Fault, call_id),
            alloc_hint: 0,
            context_id: 0,
            cancel_count: 0,
            status,
        }
    }

    pub fn decode(data: &[u8], call_id: u32) -> DecodeResult<Self> {
        let (header, mut src) = open_pdu(data, PacketType::Fault, Some(call_id))?;
        let alloc_hint = src.read_u32()?;
        let context_id = src.read_u16()?;
        let cancel_count = src.read_u8()?;
        let _reserved = src.read_u8()?;
        Ok(Self {
            header,
            alloc_hint,
            context_id,
            cancel_count,
            status: src.read_u32()?,
        })
    }
}

impl EncodePdu for FaultPdu {
    fn header(&self) -> &PduHeader {
        &self.header
    }

    fn encode_body(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u32(self.alloc_hint)?;
        dst.write_u16(self.context_id)?;
        dst.write_u8(self.cancel_count)?;
        dst.write_u8(0)?; // reserved
        dst.write_u32(self.status)?;
        dst.write_u32(0) // reserved
    }
}

/// Shutdown PDU: header only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownPdu {
    pub header: PduHeader,
}

impl ShutdownPdu {
    pub fn new(call_id: u32) -> Self {
        Self {
            header: PduHeader::new(PacketType::Shutdown, call_id),
        }
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let (header, _) = open_pdu(data, PacketType::Shutdown, None)?;
        Ok(Self { header })
    }
}

impl EncodePdu for ShutdownPdu {
    fn header(&self) -> &PduHeader {
        &self.header
    }

    fn encode_body(&self, _dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        Ok(())
    }
}
