//! Streamproxy-Common: Shared types, errors, and contracts.
//!
//! This crate provides the pieces shared between the transfer engine and
//! the container implementations:
//!
//! - **Error Handling**: The error taxonomy of a transcoding session
//! - **PID Maps**: Logical stream names mapped to transport-stream PIDs
//! - **Request Types**: Encoding parameters and seek requests
//! - **Stream Sources**: The contract a seekable container file satisfies
//!
//! # Examples
//!
//! ```
//! use streamproxy_common::{PidKind, PidMap};
//!
//! let mut pids = PidMap::new();
//! pids.insert(PidKind::Video, 0x100);
//! pids.insert(PidKind::Audio, 0x101);
//!
//! assert_eq!(pids.get(PidKind::Video), Some(0x100));
//! assert_eq!(pids.get(PidKind::Pmt), None);
//! ```

pub mod error;
pub mod pids;
pub mod source;
pub mod types;

pub use error::{Error, Result};
pub use pids::{PidKind, PidMap};
pub use source::StreamSource;
pub use types::{EncodingParams, SeekRequest, StreamAction};
