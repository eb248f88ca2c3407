//! Common test utilities: a scripted endpoint mapper on a loopback port

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Once;

use bytes::Bytes;
use epmap::{
    BindAckPdu, BindNakPdu, ContextResult, ContinuationHandle, EncodePdu, EptLookupRequest, EptLookupResponse,
    FaultPdu, LookupEntry, PacketType, PduHeader, PresentationResult, RejectReason, SyntaxId, Tower, Uuid,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Security account manager interface
pub const SAMR_UUID: &str = "12345778-1234-abcd-ef00-0123456789ac";
/// Local security authority interface
pub const LSARPC_UUID: &str = "12345778-1234-abcd-ef00-0123456789ab";
/// Netlogon interface
pub const NETLOGON_UUID: &str = "12345678-1234-abcd-ef00-01234567cffb";

/// Handle the server hands out on the first response
pub const SERVER_HANDLE: ContinuationHandle = ContinuationHandle {
    attributes: 0,
    uuid: Uuid::from_fields(0x8c2a4f10, 0x1d2e, 0x4b3c, [0x9a, 0x1b, 0x00, 0x50, 0x56, 0xc0, 0x00, 0x08]),
};

static INIT: Once = Once::new();

/// Route library logs through the test writer; `RUST_LOG` selects the level
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn uuid(s: &str) -> Uuid {
    Uuid::parse(s).expect("valid UUID")
}

pub fn tcp_entry(interface: &str, port: u16, annotation: &str) -> LookupEntry {
    LookupEntry {
        object: Uuid::NIL,
        annotation: annotation.to_string(),
        tower: Tower::tcp(uuid(interface), 1, 0, port, Ipv4Addr::new(192, 0, 2, 10)),
    }
}

pub fn udp_entry(interface: &str, port: u16) -> LookupEntry {
    LookupEntry {
        object: Uuid::NIL,
        annotation: String::new(),
        tower: Tower::udp(uuid(interface), 1, 0, port, Ipv4Addr::new(192, 0, 2, 10)),
    }
}

pub fn pipe_entry(interface: &str, pipe: &str, annotation: &str) -> LookupEntry {
    LookupEntry {
        object: Uuid::NIL,
        annotation: annotation.to_string(),
        tower: Tower::named_pipe(uuid(interface), 1, 0, pipe, "\\\\DC01"),
    }
}

/// How the scripted endpoint mapper behaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Map elements returned in order, one per lookup
    pub entries: Vec<LookupEntry>,
    /// Refuse the bind with this reason
    pub reject_bind: Option<RejectReason>,
    /// Answer the lookup with this index with a fault instead
    pub fault_at: Option<(usize, u32)>,
    /// Drop the connection instead of answering the lookup with this index
    pub hang_up_at: Option<usize>,
}

impl Script {
    pub fn entries(entries: Vec<LookupEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }
}

/// What the server saw on one connection
#[derive(Debug, Default)]
pub struct ConnectionLog {
    pub packet_types: Vec<PacketType>,
    pub call_ids: Vec<u32>,
    pub request_handles: Vec<ContinuationHandle>,
}

impl ConnectionLog {
    pub fn lookups(&self) -> usize {
        self.request_handles.len()
    }

    pub fn saw_shutdown(&self) -> bool {
        self.packet_types.contains(&PacketType::Shutdown)
    }
}

/// Scripted endpoint mapper listening on `127.0.0.1:0`
pub struct ScriptedServer {
    pub addr: SocketAddr,
    logs: mpsc::UnboundedReceiver<ConnectionLog>,
    task: JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("local address");
        let (tx, logs) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!("Scripted server accepted {}", peer);
                let script = script.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let log = serve_connection(stream, &script).await;
                    let _ = tx.send(log);
                });
            }
        });

        Self { addr, logs, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Wait for the next connection to finish
    pub async fn next_log(&mut self) -> ConnectionLog {
        self.logs.recv().await.expect("server connection log")
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Read one complete PDU, using the fragment length to find its end
async fn read_pdu(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut pdu = vec![0u8; PduHeader::SIZE];
    stream.read_exact(&mut pdu).await.ok()?;
    let frag_length = u16::from_le_bytes([pdu[8], pdu[9]]) as usize;
    if frag_length < PduHeader::SIZE {
        return None;
    }
    pdu.resize(frag_length, 0);
    stream.read_exact(&mut pdu[PduHeader::SIZE..]).await.ok()?;
    Some(pdu)
}

async fn serve_connection(mut stream: TcpStream, script: &Script) -> ConnectionLog {
    let mut log = ConnectionLog::default();
    let mut next = 0usize;

    while let Some(pdu) = read_pdu(&mut stream).await {
        let Ok(header) = PduHeader::peek(&pdu) else {
            break;
        };
        log.packet_types.push(header.packet_type);
        log.call_ids.push(header.call_id);

        let reply: Bytes = match header.packet_type {
            PacketType::Bind => match script.reject_bind {
                Some(reason) => encode(&BindNakPdu::new(header.call_id, reason)),
                None => encode(&BindAckPdu::new(
                    header.call_id,
                    0x1f2e,
                    "135",
                    vec![
                        PresentationResult::accepted(SyntaxId::ndr()),
                        PresentationResult::rejected(ContextResult::NegotiateAck, 3),
                    ],
                )),
            },
            PacketType::Request => {
                let Ok(request) = EptLookupRequest::decode(&pdu) else {
                    break;
                };
                log.request_handles.push(request.handle);
                let index = next;
                next += 1;

                if script.hang_up_at == Some(index) {
                    break;
                }
                match script.fault_at {
                    Some((at, status)) if at == index => encode(&FaultPdu::new(header.call_id, status)),
                    _ => match script.entries.get(index) {
                        Some(entry) => encode(&EptLookupResponse::new(
                            header.call_id,
                            SERVER_HANDLE,
                            vec![entry.clone()],
                            0,
                        )),
                        None => encode(&EptLookupResponse::exhausted(header.call_id, SERVER_HANDLE)),
                    },
                }
            }
            PacketType::Shutdown => continue,
            _ => break,
        };

        if stream.write_all(&reply).await.is_err() {
            break;
        }
    }
    log
}

fn encode<P: EncodePdu>(pdu: &P) -> Bytes {
    pdu.to_bytes().expect("scripted reply fits the buffer")
}
