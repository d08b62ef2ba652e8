//! The contract a seekable recording satisfies for the transfer engine.

use std::io::Read;

use crate::{PidMap, Result};

/// A container file positioned for sequential reads.
///
/// Seeks are best-effort: implementations move to the nearest container
/// boundary at or before the requested position and return the offset they
/// actually landed on. After any seek, [`Read`] continues from that offset.
pub trait StreamSource: Read {
    /// Total logical length in bytes.
    fn stream_length(&self) -> u64;

    /// PMT, video and audio PIDs declared by the container.
    fn pids(&self) -> PidMap;

    /// First PCR in the file, in milliseconds.
    fn first_pcr_ms(&self) -> u64;

    /// True when [`StreamSource::seek_time`] can be used.
    fn is_time_seekable(&self) -> bool;

    /// Reposition near `byte_offset`.
    fn seek_absolute(&mut self, byte_offset: u64) -> Result<u64>;

    /// Reposition at `part / total` of the stream length.
    fn seek_relative(&mut self, part: u64, total: u64) -> Result<u64>;

    /// Reposition at the last container unit whose PCR is at or before
    /// `pcr_ms`. Fails with a seek error when the source is not time-seekable.
    fn seek_time(&mut self, pcr_ms: u64) -> Result<u64>;
}
