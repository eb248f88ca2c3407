//! Byte transport under the lookup session
//!
//! The session only needs to send a complete PDU, receive whatever one read
//! returns, and close. There is no reassembly: a PDU split across reads fails
//! frame validation further up.

use crate::error::{EpmError, Result};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};
use tracing::debug;

/// Longest host name accepted for a connection
pub const MAX_HOST_LEN: usize = 128;

/// Transport used by a lookup session
#[async_trait]
pub trait Transport: Send {
    /// Send one complete PDU
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Perform a single read into `buf` and return the number of bytes
    /// received. A closed connection is an error.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Close the connection
    async fn close(&mut self) -> Result<()>;
}

/// [`Transport`] over any async byte stream
#[derive(Debug)]
pub struct StreamTransport<T> {
    inner: T,
}

impl<T> StreamTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for StreamTransport<T> {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data).await.map_err(EpmError::SendFailure)?;
        self.inner.flush().await.map_err(EpmError::SendFailure)
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf).await.map_err(EpmError::ReceiveFailure)?;
        if n == 0 {
            return Err(EpmError::ReceiveFailure(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )));
        }
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(EpmError::SendFailure)
    }
}

/// TCP transport to an endpoint mapper
pub type TcpTransport = StreamTransport<TcpStream>;

impl TcpTransport {
    /// Resolve `host` and connect to the first address that accepts.
    /// `timeout` bounds each connection attempt.
    pub async fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<Self> {
        validate_host(host)?;

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| EpmError::NameResolution {
                host: host.to_string(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(EpmError::NameResolution {
                host: host.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            });
        }
        debug!("Resolved {} to {} address(es)", host, addrs.len());

        let mut last_error = None;
        for addr in addrs {
            let socket = match addr {
                SocketAddr::V4(_) => TcpSocket::new_v4(),
                SocketAddr::V6(_) => TcpSocket::new_v6(),
            };
            let socket = socket.map_err(EpmError::TransportInit)?;

            let attempt = socket.connect(addr);
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
                },
                None => attempt.await,
            };

            match result {
                Ok(stream) => {
                    debug!("Connected to endpoint mapper at {}", addr);
                    return Ok(Self::new(stream));
                }
                Err(err) => {
                    debug!("Connection to {} failed: {}", addr, err);
                    last_error = Some(err);
                }
            }
        }

        Err(EpmError::ConnectionFailure {
            target: format!("{}[{}]", host, port),
            source: last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address tried")),
        })
    }
}

fn validate_host(host: &str) -> Result<()> {
    if host.is_empty() {
        return Err(EpmError::InvalidArgument("host name is empty".to_string()));
    }
    if host.len() > MAX_HOST_LEN {
        return Err(EpmError::InvalidArgument(format!(
            "host name is longer than {} bytes",
            MAX_HOST_LEN
        )));
    }
    Ok(())
}
