//! Serial communication interface with COBS framing.
//!
//! [`SerialCobsComIF`] owns a serial line, a reception thread that stages raw
//! bytes, and a packet store filled on demand by [`comif_frame::CobsDeframer`].

pub mod config;
pub mod error;
pub mod ingest;
pub mod serial_cobs;

pub use config::{FramingScheme, SerialConfig, DEFAULT_BAUD_RATE, DEFAULT_POLLING_INTERVAL};
pub use error::{ConfigError, Result};
pub use ingest::Ingestor;
pub use serial_cobs::{PortHalves, PortOpener, SerialCobsComIF};
