use std::io;
use thiserror::Error;

/// The primary error type for the `mrx24` protocol stack.
#[derive(Error, Debug)]
pub enum RadarError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("transport is not open")]
    NotOpen,

    #[error("transmit fault: {0}")]
    TransmitFault(String),

    #[error("truncated response: expected {expected} bytes, got {actual}")]
    TruncatedResponse { expected: usize, actual: usize },

    #[error("CRC16 residue nonzero over received frame")]
    CrcError,

    #[error("unexpected response: sent opcode {sent:#06x}, device echoed {received:#06x}")]
    UnexpectedResponse { sent: u16, received: u16 },

    #[error("device does not support opcode {opcode:#06x}")]
    UnsupportedCommand { opcode: u16 },

    #[error("measurement timeout reported for opcode {opcode:#06x}")]
    MeasurementTimeout { opcode: u16 },

    #[error("firmware update error reported for opcode {opcode:#06x}")]
    FirmwareUpdateError { opcode: u16 },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Raised when a decoder tries to read past the bytes actually received.
    /// Always a bug in length arithmetic, never silently tolerated.
    #[error("read past received data: needed {needed} bytes, {available} available")]
    RxUnderrun { needed: usize, available: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, RadarError>;
