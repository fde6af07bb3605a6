/// Errors raised while setting up or opening a communication interface.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The physical transport could not be opened (port busy, address unavailable).
    #[error("failed to open {target}: {source}")]
    Open {
        target: String,
        source: std::io::Error,
    },

    /// `open` was called on an interface that is already open.
    #[error("interface {0} is already open")]
    AlreadyOpen(String),

    /// The background ingestion thread could not be started.
    #[error("failed to spawn reception thread for {id}: {source}")]
    ThreadSpawn {
        id: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport handle.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sending a packet failed. Wraps the lower-level cause where there is one.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The interface has not been opened.
    #[error("interface {0} is not open")]
    NotOpen(String),

    /// The underlying write failed.
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),

    /// The transport accepted fewer bytes than requested.
    #[error("incomplete send ({written} of {expected} bytes)")]
    Incomplete { written: usize, expected: usize },
}

/// Receiving or decoding packets failed at the protocol level.
///
/// The COBS serial interface never returns [`ReceptionDecodeError::Decode`]; corrupt
/// frames are counted and dropped instead.
#[derive(Debug, thiserror::Error)]
pub enum ReceptionDecodeError {
    /// The interface has not been opened.
    #[error("interface {0} is not open")]
    NotOpen(String),

    /// The underlying read failed.
    #[error("receive failed: {0}")]
    Io(#[from] std::io::Error),

    /// A received packet could not be decoded.
    #[error("decode failed: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ReceptionDecodeError {
    /// Build a decode error wrapping a library-specific cause.
    pub fn decode(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Decode {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn decode_error_keeps_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad code byte");
        let err = ReceptionDecodeError::decode("frame 3", cause);

        assert_eq!(err.to_string(), "decode failed: frame 3");
        assert!(err.source().is_some());
    }

    #[test]
    fn send_error_wraps_io() {
        let err: SendError = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, SendError::Io(ref e) if e.kind() == std::io::ErrorKind::BrokenPipe));
    }
}
