use std::fmt;
use std::io;

use comif_serial::ConfigError;
use comif_transport::{ReceptionDecodeError, SendError, TransportError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

/// Error carrying the process exit code it maps to.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CliError {}

fn io_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    }
}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(err.kind()), format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { ref source, .. } => {
            CliError::new(io_code(source.kind()), format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::AlreadyOpen(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn send_error(context: &str, err: SendError) -> CliError {
    match err {
        SendError::Io(source) => io_error(context, source),
        SendError::Incomplete { .. } => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SendError::NotOpen(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn reception_error(context: &str, err: ReceptionDecodeError) -> CliError {
    match err {
        ReceptionDecodeError::Io(source) => io_error(context, source),
        ReceptionDecodeError::Decode { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ReceptionDecodeError::NotOpen(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Io { ref source, .. } => {
            CliError::new(io_code(source.kind()), format!("{context}: {err}"))
        }
        ConfigError::Json(_) | ConfigError::Invalid(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
    }
}
