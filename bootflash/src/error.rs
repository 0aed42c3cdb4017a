//! Error types for bootflash.

use std::io;
use thiserror::Error;

/// Result type for bootflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for bootflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No recognized response arrived within the allotted window.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The bootloader rejected a frame.
    #[error("NAK received for sequence {seq}")]
    Nak {
        /// Sequence number carried by the NAK frame.
        seq: u16,
    },

    /// A frame could not be decoded or was not the one expected.
    #[error("Unexpected frame: {0}")]
    UnexpectedFrame(String),

    /// A data chunk was not acknowledged within the retry budget.
    #[error("Failed to send chunk {index} after {attempts} attempts: {source}")]
    ChunkFailed {
        /// Zero-based chunk index.
        index: usize,
        /// Number of transmissions made for this chunk.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: Box<Error>,
    },

    /// The firmware image cannot be transferred.
    #[error("Invalid firmware: {0}")]
    InvalidFirmware(String),

    /// Another session currently owns the link.
    #[error("Link busy: another session is in progress")]
    Busy,

    /// The embedding application asked the operation to stop.
    #[error("Operation interrupted")]
    Interrupted,

    /// Protocol misuse (for example an oversized payload).
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether this error comes from the transport rather than the device.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}
