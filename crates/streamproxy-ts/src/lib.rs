//! Streamproxy-TS: MPEG transport-stream recordings as stream sources.
//!
//! # Modules
//!
//! - `packet` - 188-byte packet headers, adaptation fields and PCRs
//! - `psi` - PAT/PMT section parsing
//! - `file` - [`TsFile`], the seekable [`StreamSource`] implementation
//!
//! # Seeking
//!
//! All seeks land on packet boundaries, so the offset a client asked for and
//! the offset it gets may differ by up to 187 bytes. Time seeks binary-search
//! the file for the packet whose next PCR precedes the requested time.
//!
//! [`StreamSource`]: streamproxy_common::StreamSource

pub mod error;
pub mod file;
pub mod packet;
pub mod psi;

pub use error::{Error, Result};
pub use file::TsFile;
pub use packet::{PACKET_SIZE, SYNC_BYTE};
