use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::endpoint::{Endpoint, DEFAULT_MAX_RECV_SIZE};
use crate::error::{ReceptionDecodeError, Result, SendError, TransportError};
use crate::traits::ComInterface;

/// Configuration for a [`UdpClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Interface identifier.
    pub id: String,
    /// Destination of every sent datagram.
    pub send_addr: Endpoint,
    /// Local address to bind. An ephemeral port is used when unset.
    #[serde(default)]
    pub recv_addr: Option<Endpoint>,
    /// Largest datagram read in one call; longer datagrams are truncated.
    #[serde(default = "default_max_recv_size")]
    pub max_recv_size: usize,
}

fn default_max_recv_size() -> usize {
    DEFAULT_MAX_RECV_SIZE
}

impl UdpConfig {
    pub fn new(id: impl Into<String>, send_addr: Endpoint) -> Self {
        Self {
            id: id.into(),
            send_addr,
            recv_addr: None,
            max_recv_size: DEFAULT_MAX_RECV_SIZE,
        }
    }

    /// Bind the receive side to an explicit local address.
    pub fn with_recv_addr(mut self, recv_addr: Endpoint) -> Self {
        self.recv_addr = Some(recv_addr);
        self
    }
}

/// Datagram interface over a non-blocking UDP socket.
///
/// Datagram boundaries are packet boundaries, so no framing is applied.
pub struct UdpClient {
    config: UdpConfig,
    socket: Option<UdpSocket>,
    dest: Option<SocketAddr>,
    recv_buf: Vec<u8>,
}

impl UdpClient {
    pub fn new(config: UdpConfig) -> Self {
        Self {
            recv_buf: vec![0u8; config.max_recv_size.max(1)],
            config,
            socket: None,
            dest: None,
        }
    }

    /// Local address of the open socket.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    fn open_error(&self, source: std::io::Error) -> TransportError {
        TransportError::Open {
            target: self.config.send_addr.to_string(),
            source,
        }
    }
}

impl ComInterface for UdpClient {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn open(&mut self) -> Result<()> {
        if self.socket.is_some() {
            return Err(TransportError::AlreadyOpen(self.config.id.clone()));
        }

        let dest = self
            .config
            .send_addr
            .to_socket_addrs()
            .map_err(|e| self.open_error(e))?
            .next()
            .ok_or_else(|| {
                self.open_error(std::io::Error::new(
                    ErrorKind::AddrNotAvailable,
                    "send address did not resolve",
                ))
            })?;

        let socket = match &self.config.recv_addr {
            Some(recv_addr) => {
                info!(id = %self.config.id, addr = %recv_addr, "binding UDP socket");
                UdpSocket::bind(recv_addr).map_err(|e| TransportError::Open {
                    target: recv_addr.to_string(),
                    source: e,
                })?
            }
            None => {
                let any: SocketAddr = if dest.is_ipv6() {
                    (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
                } else {
                    (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
                };
                UdpSocket::bind(any).map_err(|e| self.open_error(e))?
            }
        };
        socket.set_nonblocking(true)?;

        debug!(id = %self.config.id, %dest, "UDP interface open");
        self.socket = Some(socket);
        self.dest = Some(dest);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(id = %self.config.id, "UDP interface closed");
        }
        self.dest = None;
    }

    fn send(&mut self, data: &[u8]) -> std::result::Result<(), SendError> {
        let (Some(socket), Some(dest)) = (&self.socket, self.dest) else {
            return Err(SendError::NotOpen(self.config.id.clone()));
        };

        let sent = socket.send_to(data, dest)?;
        if sent != data.len() {
            warn!(
                id = %self.config.id,
                sent,
                expected = data.len(),
                "not all bytes were sent"
            );
        }
        Ok(())
    }

    fn receive(&mut self) -> std::result::Result<Vec<Bytes>, ReceptionDecodeError> {
        let Some(socket) = &self.socket else {
            return Err(ReceptionDecodeError::NotOpen(self.config.id.clone()));
        };

        let mut packets = Vec::new();
        loop {
            match socket.recv_from(&mut self.recv_buf) {
                Ok((n, from)) => {
                    debug!(id = %self.config.id, %from, bytes = n, "datagram received");
                    packets.push(Bytes::copy_from_slice(&self.recv_buf[..n]));
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(packets),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::ConnectionReset => {
                    warn!(id = %self.config.id, "connection reset while receiving");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn packets_available(&mut self) -> std::result::Result<usize, ReceptionDecodeError> {
        let Some(socket) = &self.socket else {
            return Err(ReceptionDecodeError::NotOpen(self.config.id.clone()));
        };

        let mut probe = [0u8; 1];
        match socket.peek_from(&mut probe) {
            Ok(_) => Ok(1),
            Err(err) if is_truncated_peek(&err) => Ok(1),
            Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(err) if err.kind() == ErrorKind::ConnectionReset => {
                warn!(id = %self.config.id, "connection reset while polling");
                Ok(0)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Windows fails a peek into a buffer shorter than the datagram with `WSAEMSGSIZE`.
const WSAEMSGSIZE: i32 = 10040;

fn is_truncated_peek(err: &std::io::Error) -> bool {
    cfg!(windows) && err.raw_os_error() == Some(WSAEMSGSIZE)
}

impl Drop for UdpClient {
    fn drop(&mut self) {
        self.close();
    }
}
