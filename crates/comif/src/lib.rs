//! Transport-agnostic packet communication interfaces.
//!
//! comif gives every transport the same small contract: open it, send one
//! packet, pull whatever packets have arrived, close it. Stream transports get
//! packet boundaries from COBS framing; datagram transports use the datagram.
//!
//! # Crate Structure
//!
//! - [`transport`]: the [`transport::ComInterface`] contract, errors, endpoints, UDP and tty handles
//! - [`frame`]: COBS codec and the incremental deframer
//! - [`serial`]: COBS framed serial interface with a background reader (behind `serial` feature)

/// Re-export transport types.
pub mod transport {
    pub use comif_transport::*;
}

/// Re-export framing types.
pub mod frame {
    pub use comif_frame::*;
}

/// Re-export serial interface types (requires `serial` feature).
#[cfg(feature = "serial")]
pub mod serial {
    pub use comif_serial::*;
}

pub use comif_transport::ComInterface;
