//! Transport contract for packet communication interfaces.
//!
//! Every interface exposes the same capability set through [`ComInterface`]:
//! identity, open/close lifecycle, sending one packet, and pulling the packets
//! that have arrived. This crate provides the contract, its error types, and the
//! plain transports:
//! - UDP datagrams ([`UdpClient`]), where datagram boundaries are packet boundaries
//! - raw serial lines ([`TtyPort`], Unix), the byte handle beneath framed serial interfaces

pub mod endpoint;
pub mod error;
pub mod traits;
pub mod udp;

#[cfg(unix)]
pub mod tty;

pub use endpoint::{Endpoint, EndpointParseError, DEFAULT_MAX_RECV_SIZE};
pub use error::{ReceptionDecodeError, Result, SendError, TransportError};
pub use traits::ComInterface;
pub use udp::{UdpClient, UdpConfig};

#[cfg(unix)]
pub use tty::TtyPort;
