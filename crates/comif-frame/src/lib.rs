//! COBS byte stuffing and delimiter-based packet framing.
//!
//! Every packet goes on the wire as:
//! - a leading `0x00` delimiter
//! - the COBS-encoded payload, which never contains `0x00`
//! - a trailing `0x00` delimiter
//!
//! [`CobsDeframer`] turns an arbitrarily chunked byte stream back into packets.
//! Partial frames are kept across calls and corrupt frames are counted, not raised.

pub mod cobs;
pub mod deframer;
pub mod error;

pub use cobs::{decode, encode, encode_frame, max_encoded_len, DELIMITER};
pub use deframer::CobsDeframer;
pub use error::{CobsError, Result};
