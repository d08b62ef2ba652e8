//! Error types for streamproxy-ts.

use std::io;
use thiserror::Error;

/// Result type for streamproxy-ts operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for streamproxy-ts operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file does not look like a 188-byte transport stream.
    #[error("Not a transport stream: {0}")]
    NotTransportStream(String),

    /// A required PSI table was not found near the start of the file.
    #[error("Missing table: {0}")]
    MissingTable(&'static str),

    /// The PMT does not declare a required elementary stream.
    #[error("Missing stream: {0}")]
    MissingStream(&'static str),

    /// No usable PCR range was indexed at open time.
    #[error("Stream is not time-seekable")]
    NotTimeSeekable,
}

impl Error {
    /// Create a not-a-transport-stream error.
    pub fn not_transport_stream(msg: impl Into<String>) -> Self {
        Self::NotTransportStream(msg.into())
    }

    /// Convert into the shared error type for a failed seek.
    pub fn into_seek_error(self) -> streamproxy_common::Error {
        match self {
            Error::Io(e) => streamproxy_common::Error::Io(e),
            other => streamproxy_common::Error::seek(other.to_string()),
        }
    }
}
