/// Errors that can occur while reversing COBS byte stuffing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CobsError {
    /// A zero byte appeared inside the encoded body.
    #[error("zero byte found in encoded input at offset {offset}")]
    ZeroByte { offset: usize },

    /// A length code points past the end of the input.
    #[error("not enough input bytes for length code {code:#04x} at offset {offset}")]
    Truncated { offset: usize, code: u8 },
}

pub type Result<T> = std::result::Result<T, CobsError>;
