//! Endpoint mapper lookup session
//!
//! ```text
//! Disconnected -> Connected -> Bound <-> Querying
//!                     |          |          |
//!                     +--------> Failed <---+---> Exhausted
//!                                  |                  |
//!                                  +----> Closed <----+
//! ```
//!
//! One `ept_lookup` round trip per [`LookupSession::next_endpoint`] call. The
//! continuation handle from the first response is echoed on every later
//! request until the server reports that no elements remain.

use crate::error::{EpmError, ProtocolError, Result};
use crate::pdu::{
    BindAckPdu, BindNakPdu, BindPdu, ContinuationHandle, EncodePdu, EptLookupRequest, EptLookupResponse, FaultPdu,
    LookupEntry, LookupStatus, PacketType, PduHeader, RejectReason, ShutdownPdu, DEFAULT_MAX_FRAG,
};
use crate::transport::{TcpTransport, Transport};
use bytes::BytesMut;
use epmap_ndr::{WriteCursor, DEFAULT_BUFFER_SIZE};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Call ID of the bind; requests count up from here
const BIND_CALL_ID: u32 = 1;

/// Lookup session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Bound,
    /// A lookup request is in flight
    Querying,
    /// The server has no more elements
    Exhausted,
    Failed,
    Closed,
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    /// Capacity of each of the send and receive buffers
    pub buffer_size: usize,
    /// Bound on each TCP connection attempt
    pub connect_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_xmit_frag: DEFAULT_MAX_FRAG,
            max_recv_frag: DEFAULT_MAX_FRAG,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: None,
        }
    }
}

/// Builder for lookup sessions
#[derive(Debug, Clone, Default)]
pub struct LookupSessionBuilder {
    config: SessionConfig,
}

impl LookupSessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragment sizes offered in the bind
    pub fn max_frag(mut self, max_xmit_frag: u16, max_recv_frag: u16) -> Self {
        self.config.max_xmit_frag = max_xmit_frag;
        self.config.max_recv_frag = max_recv_frag;
        self
    }

    /// Capacity of the send and receive buffers. The fragment length field is
    /// 16 bits wide, so larger values are clamped.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.buffer_size = size.clamp(PduHeader::SIZE, u16::MAX as usize);
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect to the endpoint mapper at `host`:`port`. The session is
    /// connected but not yet bound.
    pub async fn connect(self, host: &str, port: u16) -> Result<LookupSession<TcpTransport>> {
        let transport = TcpTransport::connect(host, port, self.config.connect_timeout).await?;
        Ok(self.with_transport(transport))
    }

    /// Start a session over an already connected transport
    pub fn with_transport<T: Transport>(self, transport: T) -> LookupSession<T> {
        LookupSession::new(transport, self.config)
    }
}

/// Outcome of one lookup round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStep {
    /// The server returned an element
    Endpoint(LookupEntry),
    /// No elements remain; the enumeration completed normally
    EnumerationExhausted,
}

/// Endpoint mapper lookup session
pub struct LookupSession<T> {
    transport: Option<T>,
    config: SessionConfig,
    state: SessionState,
    send_buf: WriteCursor,
    recv_buf: BytesMut,
    call_id: u32,
    handle: ContinuationHandle,
    assoc_group_id: u32,
    last_reject_reason: Option<RejectReason>,
    last_status: Option<u32>,
    last_fault: Option<u32>,
}

impl<T: Transport> LookupSession<T> {
    /// Session over a connected transport
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport: Some(transport),
            send_buf: WriteCursor::with_capacity(config.buffer_size),
            recv_buf: BytesMut::zeroed(config.buffer_size),
            config,
            state: SessionState::Connected,
            call_id: 0,
            handle: ContinuationHandle::default(),
            assoc_group_id: 0,
            last_reject_reason: None,
            last_status: None,
            last_fault: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Call ID of the most recent request
    pub fn call_id(&self) -> u32 {
        self.call_id
    }

    /// Continuation handle; nil until the first response
    pub fn handle(&self) -> &ContinuationHandle {
        &self.handle
    }

    /// Association group assigned in the bind acknowledgment
    pub fn assoc_group_id(&self) -> u32 {
        self.assoc_group_id
    }

    pub fn last_reject_reason(&self) -> Option<RejectReason> {
        self.last_reject_reason
    }

    /// Status of the most recent lookup response
    pub fn last_status(&self) -> Option<u32> {
        self.last_status
    }

    pub fn last_fault(&self) -> Option<u32> {
        self.last_fault
    }

    /// Bind to the endpoint mapper interface
    pub async fn bind(&mut self) -> Result<()> {
        self.expect_state(SessionState::Connected, "bind")?;
        let result = self.bind_exchange().await;
        self.settle(result)
    }

    /// Request the next element of the endpoint map
    pub async fn next_endpoint(&mut self) -> Result<LookupStep> {
        self.expect_state(SessionState::Bound, "lookup")?;
        self.state = SessionState::Querying;
        let result = self.lookup_exchange().await;
        self.settle(result)
    }

    /// Run the lookup loop to the end and return every entry that has a
    /// reportable endpoint. The session is closed afterwards, whether the
    /// enumeration completed or failed.
    pub async fn enumerate(&mut self) -> Result<Vec<LookupEntry>> {
        let mut entries = Vec::new();
        let result = loop {
            match self.next_endpoint().await {
                Ok(LookupStep::Endpoint(entry)) => {
                    if entry.tower.endpoint().is_some() {
                        entries.push(entry);
                    }
                }
                Ok(LookupStep::EnumerationExhausted) => break Ok(entries),
                Err(err) => break Err(err),
            }
        };
        self.close().await;
        result
    }

    /// Send a best-effort shutdown if the association was started, then
    /// release the transport and buffers. Idempotent.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        let send_shutdown = !matches!(self.state, SessionState::Disconnected | SessionState::Connected);

        if let Some(mut transport) = self.transport.take() {
            if send_shutdown {
                match ShutdownPdu::new(self.call_id).encode(&mut self.send_buf) {
                    Ok(()) => {
                        if let Err(err) = transport.send(self.send_buf.as_slice()).await {
                            debug!("Shutdown not delivered: {}", err);
                        }
                    }
                    Err(err) => debug!("Shutdown not encoded: {}", err),
                }
            }
            if let Err(err) = transport.close().await {
                debug!("Transport close failed: {}", err);
            }
        }

        self.send_buf = WriteCursor::with_capacity(0);
        self.recv_buf = BytesMut::new();
        self.state = SessionState::Closed;
        debug!("Lookup session closed");
    }

    async fn bind_exchange(&mut self) -> Result<()> {
        self.call_id = BIND_CALL_ID;
        let bind = BindPdu::endpoint_mapper(self.call_id, self.config.max_xmit_frag, self.config.max_recv_frag);

        debug!(
            "Sending bind request: call_id={}, max_xmit={}, max_recv={}",
            self.call_id, bind.max_xmit_frag, bind.max_recv_frag
        );
        self.encode(&bind)?;
        let received = self.round_trip().await?;
        let data = &self.recv_buf[..received];

        match PduHeader::peek(data)?.packet_type {
            PacketType::BindAck => {
                let ack = BindAckPdu::decode(data, self.call_id)?;
                if ack.accepted_context() != Some(0) {
                    warn!(
                        "Endpoint mapper rejected the NDR context, accepted context {:?}",
                        ack.accepted_context()
                    );
                }
                self.assoc_group_id = ack.assoc_group_id;
                self.state = SessionState::Bound;
                debug!(
                    "Bind acknowledged: assoc_group=0x{:08x}, max_xmit={}, max_recv={}",
                    ack.assoc_group_id, ack.max_xmit_frag, ack.max_recv_frag
                );
                Ok(())
            }
            PacketType::BindNak => {
                let nak = BindNakPdu::decode(data, self.call_id)?;
                self.last_reject_reason = Some(nak.reject_reason);
                debug!("Bind rejected: {}", nak.reject_reason);
                Err(EpmError::BindRejected(nak.reject_reason))
            }
            other => Err(ProtocolError::UnexpectedPacketType {
                expected: PacketType::BindAck,
                got: other as u8,
            }
            .into()),
        }
    }

    async fn lookup_exchange(&mut self) -> Result<LookupStep> {
        self.call_id = self.call_id.wrapping_add(1);
        let request = EptLookupRequest::new(self.call_id, self.handle);

        debug!("Sending ept_lookup: call_id={}, handle={}", self.call_id, self.handle.uuid);
        self.encode(&request)?;
        let received = self.round_trip().await?;
        let data = &self.recv_buf[..received];

        match PduHeader::peek(data)?.packet_type {
            PacketType::Response => {
                let mut response = EptLookupResponse::decode(data, self.call_id)?;
                if self.handle.is_nil() {
                    self.handle = response.handle;
                }
                self.last_status = Some(response.status);
                trace!(
                    "Lookup response: call_id={}, entries={}, status={}",
                    self.call_id,
                    response.entries.len(),
                    response.lookup_status()
                );

                match response.lookup_status() {
                    LookupStatus::Ok => {
                        let entry = response.entries.pop().ok_or(ProtocolError::MissingEntry)?;
                        debug!(
                            "Lookup entry: interface={:?}, protocol={}, annotation={:?}",
                            entry.tower.interface.map(|uuid| uuid.to_string()),
                            entry.tower.protocol,
                            entry.annotation
                        );
                        self.state = SessionState::Bound;
                        Ok(LookupStep::Endpoint(entry))
                    }
                    LookupStatus::NotRegistered => {
                        debug!("Endpoint map exhausted after call_id={}", self.call_id);
                        self.state = SessionState::Exhausted;
                        Ok(LookupStep::EnumerationExhausted)
                    }
                    LookupStatus::Other(status) => Err(ProtocolError::UnexpectedStatus(status).into()),
                }
            }
            PacketType::Fault => {
                let fault = FaultPdu::decode(data, self.call_id)?;
                self.last_fault = Some(fault.status);
                debug!("Lookup fault: status=0x{:08x}", fault.status);
                Err(EpmError::RemoteFault(fault.status))
            }
            other => Err(ProtocolError::UnexpectedPacketType {
                expected: PacketType::Response,
                got: other as u8,
            }
            .into()),
        }
    }

    fn encode<P: EncodePdu>(&mut self, pdu: &P) -> Result<()> {
        pdu.encode(&mut self.send_buf)
            .map_err(|err| EpmError::ResourceExhaustion(format!("send buffer: {}", err)))
    }

    /// Send the encoded PDU and perform one receive
    async fn round_trip(&mut self) -> Result<usize> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| EpmError::InvalidArgument("session has no transport".to_string()))?;

        trace!("Sending {} bytes", self.send_buf.len());
        transport.send(self.send_buf.as_slice()).await?;
        let received = transport.recv(&mut self.recv_buf[..]).await?;
        trace!("Received {} bytes", received);
        Ok(received)
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(EpmError::InvalidArgument(format!(
                "cannot {} in state {:?}",
                operation, self.state
            )));
        }
        Ok(())
    }

    /// Any failure is terminal
    fn settle<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            debug!("Lookup session failed: {}", err);
            self.state = SessionState::Failed;
        }
        result
    }
}
