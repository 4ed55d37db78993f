use std::io;
use thiserror::Error;

/// Main error type for Modbus TCP transport operations
#[derive(Error, Debug)]
pub enum ModbusError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection refused")]
    ConnectionRefused,

    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("Bad socket descriptor")]
    BadDescriptor,

    #[error("Timeout")]
    Timeout,

    #[error("Too many data: {length} bytes exceed the maximum ADU length of {max}")]
    TooMuchData { length: usize, max: usize },

    #[error("Invalid transaction ID received 0x{received:04X} (not 0x{expected:04X})")]
    TransactionIdMismatch { expected: u16, received: u16 },

    #[error("Connection closed by peer")]
    PeerClosed,

    #[error("Name resolution failed: {0}")]
    Resolution(String),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl ModbusError {
    /// Whether the error means the socket is unusable and the link may be repaired
    /// by reconnecting
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            ModbusError::ConnectionReset
                | ModbusError::ConnectionRefused
                | ModbusError::BadDescriptor
                | ModbusError::PeerClosed
        )
    }
}

impl From<io::Error> for ModbusError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => ModbusError::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ModbusError::ConnectionReset,
            io::ErrorKind::NotConnected => ModbusError::BadDescriptor,
            io::ErrorKind::TimedOut => ModbusError::Timeout,
            io::ErrorKind::UnexpectedEof => ModbusError::PeerClosed,
            _ => ModbusError::Io(e),
        }
    }
}

/// Result type alias for Modbus TCP transport operations
pub type ModbusResult<T> = Result<T, ModbusError>;
