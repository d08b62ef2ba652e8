//! Error types shared across streamproxy.
//!
//! The variants follow the life of a transcoding session: opening and
//! seeking the source, configuring the hardware encoder, and moving bytes
//! between descriptors.

use std::io;
use std::path::PathBuf;

/// Common error type for streamproxy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The source file is missing, unreadable, or not a recognised container.
    #[error("Cannot open {}: {reason}", path.display())]
    Open {
        /// Path that was opened.
        path: PathBuf,
        /// Human-readable reason.
        reason: String,
    },

    /// A seek could not be performed.
    #[error("Seek error: {0}")]
    Seek(String),

    /// A hardware configuration, start, or stop call failed.
    #[error("Device control error [{op}]: {message}")]
    DeviceControl {
        /// The control operation or property that failed.
        op: String,
        /// Diagnostic string.
        message: String,
    },

    /// A poll, read, or write on a descriptor failed.
    #[error("Descriptor error [{context}]: {source}")]
    Descriptor {
        /// Which descriptor operation failed.
        context: &'static str,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// An append did not fit into the bounded queue.
    #[error("Queue capacity exceeded: need {need} bytes, {free} free")]
    QueueCapacityExceeded {
        /// Bytes the caller tried to append.
        need: usize,
        /// Bytes of free space at the time.
        free: usize,
    },

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a new Open error.
    pub fn open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Open {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new Seek error.
    pub fn seek<S: Into<String>>(msg: S) -> Self {
        Self::Seek(msg.into())
    }

    /// Create a new DeviceControl error.
    pub fn device_control(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeviceControl {
            op: op.into(),
            message: message.into(),
        }
    }

    /// Create a new Descriptor error.
    pub fn descriptor(context: &'static str, source: io::Error) -> Self {
        Self::Descriptor { context, source }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
