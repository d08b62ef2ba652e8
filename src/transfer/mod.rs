//! Moving a recording through the hardware encoder to a client.
//!
//! A [`Transfer`] runs one client session on the calling thread: it seeks
//! the source, queues the response head, drives the encoder through startup
//! and then multiplexes the encoder and client descriptors until the stream
//! ends or either side goes away. [`stream_passthrough`] serves the same
//! request without the encoder.

mod orchestrator;
mod passthrough;
mod preamble;
mod queue;
pub mod seek;

pub use orchestrator::{SocketWriter, Transfer, TransferOutcome, TransferReport};
pub use passthrough::{stream_passthrough, PassthroughReport};
pub use preamble::ResponsePreamble;
pub use queue::ByteQueue;

use crate::config::Config;

/// Tunables for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Bytes buffered between encoder output and the client.
    pub queue_capacity: usize,
    /// Bytes per source read and encoder write.
    pub transfer_unit: usize,
    /// Poll timeout while the encoder is starting.
    pub startup_poll_ms: u16,
    /// `Server:` header value.
    pub server_identity: String,
}

impl TransferSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            queue_capacity: config.transfer.queue_capacity,
            transfer_unit: config.transfer.transfer_unit,
            startup_poll_ms: config.transfer.startup_poll_ms,
            server_identity: config.server.identity.clone(),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
