//! Core types shared by every part of the protocol.

use thiserror::Error;

use crate::transform::TransformError;

/// Fixed size of the frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Largest metadata block the 2-byte length field can describe.
pub const MAX_METADATA_LEN: u64 = u16::MAX as u64;

/// Largest media type string the 1-byte length field can describe.
pub const MAX_MEDIA_TYPE_LEN: u64 = u8::MAX as u64;

/// Largest payload the 5-byte length field can describe (2^40 - 1).
pub const MAX_PAYLOAD_LEN: u64 = (1 << 40) - 1;

/// Read/write granularity used when none is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1400;

/// Identifier the server assigns to each accepted connection, for logging.
pub type SessionId = u64;

/// Status byte returned by the receiving side of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ack {
    /// The whole payload was written to storage.
    Stored = 0x00,
    /// Storage failed; no transform will run.
    Rejected = 0x01,
}

impl TryFrom<u8> for Ack {
    type Error = MediaWireError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Ack::Stored),
            0x01 => Ok(Ack::Rejected),
            other => Err(MediaWireError::ProtocolViolation(format!(
                "unexpected ack byte 0x{:02x}",
                other
            ))),
        }
    }
}

/// Errors that can occur anywhere in a transfer.
#[derive(Debug, Error)]
pub enum MediaWireError {
    #[error("Connection closed before the expected bytes arrived")]
    ConnectionClosed,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Header field {field} value {value} exceeds maximum {max}")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// Local disk read or write failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket failure other than an early close.
    #[error("Transport error: {0}")]
    Transport(std::io::Error),

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("No data to read from client")]
    NoData,

    #[error("Upload rejected by remote storage")]
    UploadRejected,

    #[error("Remote error: {0}")]
    RemoteError(String),

    #[error("Timed out during {0}")]
    TimedOut(&'static str),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, MediaWireError>;
