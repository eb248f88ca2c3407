//! Protocol tower decoding
//!
//! A tower is a floor count followed by that many floors. Each floor is a
//! length-prefixed LHS whose first byte is the protocol identifier and a
//! length-prefixed RHS holding the protocol-specific address data:
//!
//! ```text
//! +-----------+---------------------+-----------+-------------+
//! | lhs_len   | protocol_id | lhs.. | rhs_len   | rhs..       |
//! | u16 (LE)  | u8          |       | u16 (LE)  |             |
//! +-----------+---------------------+-----------+-------------+
//! ```
//!
//! Typical layout for `ncacn_ip_tcp`: interface UUID, transfer syntax,
//! RPC connection-oriented, TCP port, IP host address.

use crate::error::ProtocolError;
use epmap_ndr::{NdrDecode, NdrEncode, ReadCursor, Uuid, WriteCursor};
use std::fmt;
use std::net::Ipv4Addr;

/// Protocol tower floor identifiers
pub mod protocol_id {
    /// TCP port
    pub const TCP: u8 = 0x07;
    /// UDP port
    pub const UDP: u8 = 0x08;
    /// IPv4 host address
    pub const IP: u8 = 0x09;
    /// RPC connectionless
    pub const RPC_CL: u8 = 0x0a;
    /// RPC connection-oriented
    pub const RPC_CO: u8 = 0x0b;
    /// Interface or transfer syntax UUID
    pub const UUID: u8 = 0x0d;
    /// SMB named pipe
    pub const NAMED_PIPE: u8 = 0x0f;
    /// Local pipe path
    pub const LOCAL_PIPE: u8 = 0x10;
    /// NetBIOS host name
    pub const NETBIOS: u8 = 0x11;
}

/// Capacity of the pipe path field
pub const MAX_PIPE_PATH: usize = 128;

type DecodeResult<T> = std::result::Result<T, ProtocolError>;

/// One decoded tower floor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Floor {
    /// Interface or transfer syntax identifier
    Uuid { uuid: Uuid, major: u16, minor: u16 },
    RpcConnectionless,
    RpcConnectionOriented,
    /// TCP port
    Tcp(u16),
    /// UDP port
    Udp(u16),
    /// IPv4 host address
    Ip(Ipv4Addr),
    /// SMB named pipe path (`0x0f`)
    NamedPipe(String),
    /// Pipe path variant (`0x10`); fills the pipe path but never selects
    /// the named pipe protocol
    LocalPipe(String),
    /// Anything else, NetBIOS included, kept opaque
    Other { protocol_id: u8, lhs: Vec<u8>, rhs: Vec<u8> },
}

impl Floor {
    pub fn protocol_id(&self) -> u8 {
        match self {
            Self::Uuid { .. } => protocol_id::UUID,
            Self::RpcConnectionless => protocol_id::RPC_CL,
            Self::RpcConnectionOriented => protocol_id::RPC_CO,
            Self::Tcp(_) => protocol_id::TCP,
            Self::Udp(_) => protocol_id::UDP,
            Self::Ip(_) => protocol_id::IP,
            Self::NamedPipe(_) => protocol_id::NAMED_PIPE,
            Self::LocalPipe(_) => protocol_id::LOCAL_PIPE,
            Self::Other { protocol_id, .. } => *protocol_id,
        }
    }

    /// Decode the floor at the cursor. `index` is only used for error reports.
    pub fn decode(src: &mut ReadCursor<'_>, index: u16) -> DecodeResult<Self> {
        let overrun = |_| ProtocolError::FloorOverrun { index };

        let lhs_len = src.read_u16().map_err(overrun)?;
        let lhs = src.read_slice(lhs_len as usize).map_err(overrun)?;
        let rhs_len = src.read_u16().map_err(overrun)?;
        let rhs = src.read_slice(rhs_len as usize).map_err(overrun)?;

        let Some((&id, lhs_rest)) = lhs.split_first() else {
            return Err(ProtocolError::MalformedFloor {
                index,
                protocol_id: 0,
                side: "LHS",
                len: lhs_len,
            });
        };
        let malformed = |side: &'static str, len: u16| ProtocolError::MalformedFloor {
            index,
            protocol_id: id,
            side,
            len,
        };

        let floor = match id {
            protocol_id::TCP | protocol_id::UDP => {
                let port: [u8; 2] = rhs.try_into().map_err(|_| malformed("RHS", rhs_len))?;
                let port = u16::from_be_bytes(port);
                if id == protocol_id::TCP {
                    Self::Tcp(port)
                } else {
                    Self::Udp(port)
                }
            }
            protocol_id::IP => {
                let addr: [u8; 4] = rhs.try_into().map_err(|_| malformed("RHS", rhs_len))?;
                Self::Ip(Ipv4Addr::from(addr))
            }
            protocol_id::RPC_CL => Self::RpcConnectionless,
            protocol_id::RPC_CO => Self::RpcConnectionOriented,
            protocol_id::UUID => {
                if lhs_rest.len() < Uuid::SIZE + 2 {
                    return Err(malformed("LHS", lhs_len));
                }
                let mut lhs_cursor = ReadCursor::new(lhs_rest);
                let uuid = Uuid::ndr_decode(&mut lhs_cursor)?;
                let major = lhs_cursor.read_u16()?;
                let minor = match rhs {
                    [lo, hi, ..] => u16::from_le_bytes([*lo, *hi]),
                    _ => 0,
                };
                Self::Uuid { uuid, major, minor }
            }
            protocol_id::NAMED_PIPE => Self::NamedPipe(pipe_path(rhs)),
            protocol_id::LOCAL_PIPE => Self::LocalPipe(pipe_path(rhs)),
            _ => Self::Other {
                protocol_id: id,
                lhs: lhs_rest.to_vec(),
                rhs: rhs.to_vec(),
            },
        };
        Ok(floor)
    }

    fn lhs(&self) -> Vec<u8> {
        let mut lhs = vec![self.protocol_id()];
        match self {
            Self::Uuid { uuid, major, .. } => {
                lhs.extend_from_slice(&uuid.to_bytes_le());
                lhs.extend_from_slice(&major.to_le_bytes());
            }
            Self::Other { lhs: rest, .. } => lhs.extend_from_slice(rest),
            _ => {}
        }
        lhs
    }

    fn rhs(&self) -> Vec<u8> {
        match self {
            Self::Uuid { minor, .. } => minor.to_le_bytes().to_vec(),
            Self::RpcConnectionless | Self::RpcConnectionOriented => vec![0, 0],
            Self::Tcp(port) | Self::Udp(port) => port.to_be_bytes().to_vec(),
            Self::Ip(addr) => addr.octets().to_vec(),
            Self::NamedPipe(path) | Self::LocalPipe(path) => {
                let mut rhs = path.as_bytes().to_vec();
                rhs.push(0);
                rhs
            }
            Self::Other { rhs, .. } => rhs.clone(),
        }
    }
}

impl NdrEncode for Floor {
    fn ndr_encode(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        let lhs = self.lhs();
        let rhs = self.rhs();
        dst.write_u16(lhs.len() as u16)?;
        dst.write_bytes(&lhs)?;
        dst.write_u16(rhs.len() as u16)?;
        dst.write_bytes(&rhs)
    }

    fn ndr_size(&self) -> usize {
        4 + self.lhs().len() + self.rhs().len()
    }
}

/// Pipe path: at most [`MAX_PIPE_PATH`] bytes, cut at the first NUL
fn pipe_path(rhs: &[u8]) -> String {
    let bounded = &rhs[..rhs.len().min(MAX_PIPE_PATH)];
    let end = bounded.iter().position(|&b| b == 0).unwrap_or(bounded.len());
    String::from_utf8_lossy(&bounded[..end]).into_owned()
}

/// Transport selected by a tower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolTag {
    Tcp,
    Udp,
    Ip,
    NamedPipe,
    #[default]
    Unknown,
}

impl ProtocolTag {
    /// Protocol sequence string used in string bindings
    pub fn protseq(&self) -> &'static str {
        match self {
            Self::Tcp => "ncacn_ip_tcp",
            Self::Udp => "ncacn_ip_udp",
            Self::Ip => "ncacn_ip_ip",
            Self::NamedPipe => "ncacn_np",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protseq())
    }
}

/// Normalized view of one protocol tower
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tower {
    pub protocol: ProtocolTag,
    pub tcp_port: Option<u16>,
    pub udp_port: Option<u16>,
    pub host: Option<Ipv4Addr>,
    pub pipe: Option<String>,
    /// UUID of the first UUID floor
    pub interface: Option<Uuid>,
    pub floors: Vec<Floor>,
}

impl Tower {
    /// Build the normalized record from a floor list
    pub fn from_floors(floors: Vec<Floor>) -> Self {
        let mut tower = Self::default();
        for floor in &floors {
            match floor {
                Floor::Uuid { uuid, .. } => {
                    if tower.interface.is_none() {
                        tower.interface = Some(*uuid);
                    }
                }
                Floor::Tcp(port) => {
                    tower.tcp_port = Some(*port);
                    tower.protocol = ProtocolTag::Tcp;
                }
                Floor::Udp(port) => {
                    tower.udp_port = Some(*port);
                    tower.protocol = ProtocolTag::Udp;
                }
                Floor::Ip(addr) => {
                    tower.host = Some(*addr);
                    if tower.protocol == ProtocolTag::Unknown {
                        tower.protocol = ProtocolTag::Ip;
                    }
                }
                Floor::NamedPipe(path) => {
                    tower.pipe = Some(path.clone());
                    tower.protocol = ProtocolTag::NamedPipe;
                }
                Floor::LocalPipe(path) => tower.pipe = Some(path.clone()),
                Floor::RpcConnectionless | Floor::RpcConnectionOriented | Floor::Other { .. } => {}
            }
        }
        tower.floors = floors;
        tower
    }

    /// Decode the tower octet string: floor count then floors. Every floor
    /// must lie within `data`.
    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut src = ReadCursor::new(data);
        let floor_count = src.read_u16()?;
        let mut floors = Vec::with_capacity(floor_count as usize);
        for index in 0..floor_count {
            floors.push(Floor::decode(&mut src, index)?);
        }
        Ok(Self::from_floors(floors))
    }

    /// Tower for a TCP endpoint: interface, NDR, RPC CO, port, host
    pub fn tcp(interface: Uuid, major: u16, minor: u16, port: u16, host: Ipv4Addr) -> Self {
        Self::from_floors(vec![
            Floor::Uuid { uuid: interface, major, minor },
            ndr_floor(),
            Floor::RpcConnectionOriented,
            Floor::Tcp(port),
            Floor::Ip(host),
        ])
    }

    /// Tower for a UDP endpoint: interface, NDR, RPC CL, port, host
    pub fn udp(interface: Uuid, major: u16, minor: u16, port: u16, host: Ipv4Addr) -> Self {
        Self::from_floors(vec![
            Floor::Uuid { uuid: interface, major, minor },
            ndr_floor(),
            Floor::RpcConnectionless,
            Floor::Udp(port),
            Floor::Ip(host),
        ])
    }

    /// Tower for an SMB named pipe endpoint
    pub fn named_pipe(interface: Uuid, major: u16, minor: u16, pipe: &str, netbios_name: &str) -> Self {
        let mut netbios = netbios_name.as_bytes().to_vec();
        netbios.push(0);
        Self::from_floors(vec![
            Floor::Uuid { uuid: interface, major, minor },
            ndr_floor(),
            Floor::RpcConnectionOriented,
            Floor::NamedPipe(pipe.to_string()),
            Floor::Other {
                protocol_id: protocol_id::NETBIOS,
                lhs: Vec::new(),
                rhs: netbios,
            },
        ])
    }

    /// How this tower is reported. TCP wins over UDP, UDP over a named
    /// pipe; a pipe path only counts when it starts with a backslash.
    pub fn endpoint(&self) -> Option<Endpoint> {
        if let Some(port) = self.tcp_port.filter(|&p| p != 0) {
            return Some(Endpoint::Tcp(port));
        }
        if let Some(port) = self.udp_port.filter(|&p| p != 0) {
            return Some(Endpoint::Udp(port));
        }
        self.pipe
            .as_ref()
            .filter(|path| path.starts_with('\\'))
            .map(|path| Endpoint::NamedPipe(path.clone()))
    }
}

impl NdrEncode for Tower {
    fn ndr_encode(&self, dst: &mut WriteCursor) -> epmap_ndr::Result<()> {
        dst.write_u16(self.floors.len() as u16)?;
        for floor in &self.floors {
            floor.ndr_encode(dst)?;
        }
        Ok(())
    }

    fn ndr_size(&self) -> usize {
        2 + self.floors.iter().map(NdrEncode::ndr_size).sum::<usize>()
    }
}

fn ndr_floor() -> Floor {
    Floor::Uuid {
        uuid: crate::pdu::NDR_SYNTAX_UUID,
        major: crate::pdu::NDR_SYNTAX_VERSION as u16,
        minor: 0,
    }
}

/// A reportable endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(u16),
    Udp(u16),
    NamedPipe(String),
}

impl Endpoint {
    pub fn protocol(&self) -> ProtocolTag {
        match self {
            Self::Tcp(_) => ProtocolTag::Tcp,
            Self::Udp(_) => ProtocolTag::Udp,
            Self::NamedPipe(_) => ProtocolTag::NamedPipe,
        }
    }

    /// `<protseq>:<host>[<port-or-pipe>]`; pipe paths get one extra
    /// leading backslash.
    pub fn binding(&self, host: &str) -> String {
        match self {
            Self::Tcp(port) | Self::Udp(port) => {
                format!("{}:{}[{}]", self.protocol().protseq(), host, port)
            }
            Self::NamedPipe(path) => format!("{}:{}[\\{}]", self.protocol().protseq(), host, path),
        }
    }
}
