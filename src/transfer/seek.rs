//! Resolving a [`SeekRequest`] against a [`StreamSource`].

use streamproxy_common::{Error, Result, SeekRequest, StreamSource};

/// Position `source` for `seek` and return the offset to report to the
/// client.
///
/// A byte offset is reported exactly as requested even though the source
/// rounds it to its own alignment. A percentage is resolved next, then a
/// time offset when the source can seek by time. A time offset the source
/// cannot honour leaves the stream at the start.
pub fn resolve<S: StreamSource + ?Sized>(source: &mut S, seek: &SeekRequest) -> Result<u64> {
    if seek.byte_offset > 0 {
        let aligned = source.seek_absolute(seek.byte_offset)?;
        tracing::info!(
            requested = seek.byte_offset,
            aligned,
            "Seeking to byte offset; reported position is approximate"
        );
        return Ok(seek.byte_offset);
    }

    if seek.pct_offset > 0 {
        let offset = source.seek_relative(u64::from(seek.pct_offset), 100)?;
        tracing::info!(pct = seek.pct_offset, offset, "Seeking to percentage");
        return Ok(offset);
    }

    if seek.wants_time_seek() {
        if !source.is_time_seekable() {
            tracing::warn!(
                secs = seek.time_offset_s,
                "Source is not time-seekable; starting from the beginning"
            );
            return Ok(0);
        }

        let target_ms = u64::from(seek.time_offset_s) * 1000 + source.first_pcr_ms();
        return match source.seek_time(target_ms) {
            Ok(offset) => {
                tracing::info!(secs = seek.time_offset_s, target_ms, offset, "Seeking to time");
                Ok(offset)
            }
            Err(Error::Seek(reason)) => {
                tracing::warn!(secs = seek.time_offset_s, "Time seek failed ({reason}); starting from the beginning");
                source.seek_absolute(0)?;
                Ok(0)
            }
            Err(e) => Err(e),
        };
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Read};
    use streamproxy_common::PidMap;

    /// Records the last seek and aligns to 188-byte packets.
    #[derive(Default)]
    struct ScriptedSource {
        length: u64,
        time_seekable: bool,
        first_pcr_ms: u64,
        position: u64,
        last_time_target: Option<u64>,
    }

    impl Read for ScriptedSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }
    }

    impl StreamSource for ScriptedSource {
        fn stream_length(&self) -> u64 {
            self.length
        }

        fn pids(&self) -> PidMap {
            PidMap::new()
        }

        fn first_pcr_ms(&self) -> u64 {
            self.first_pcr_ms
        }

        fn is_time_seekable(&self) -> bool {
            self.time_seekable
        }

        fn seek_absolute(&mut self, byte_offset: u64) -> Result<u64> {
            self.position = byte_offset / 188 * 188;
            Ok(self.position)
        }

        fn seek_relative(&mut self, part: u64, total: u64) -> Result<u64> {
            self.seek_absolute(self.length * part / total)
        }

        fn seek_time(&mut self, pcr_ms: u64) -> Result<u64> {
            if !self.time_seekable {
                return Err(Error::seek("not time-seekable"));
            }
            self.last_time_target = Some(pcr_ms);
            self.seek_absolute(pcr_ms * 100)
        }
    }

    fn source(length: u64) -> ScriptedSource {
        ScriptedSource {
            length,
            ..Default::default()
        }
    }

    #[test]
    fn no_request_starts_at_zero() {
        let mut src = source(1_000_000);
        assert_eq!(resolve(&mut src, &SeekRequest::default()).unwrap(), 0);
    }

    #[test]
    fn byte_offset_is_reported_as_requested() {
        let mut src = source(1_000_000);
        let offset = resolve(&mut src, &SeekRequest::bytes(500_000)).unwrap();

        assert_eq!(offset, 500_000);
        assert_eq!(src.position, 499_892, "source still aligns internally");
    }

    #[test]
    fn percentage_resolves_through_source() {
        let mut src = source(1_000_000);
        let offset = resolve(&mut src, &SeekRequest::percent(50)).unwrap();

        assert!(offset > 0);
        assert_eq!(offset % 188, 0);
        assert_eq!(offset, src.position);
    }

    #[test]
    fn byte_offset_wins_over_percentage_and_time() {
        let mut src = source(1_000_000);
        src.time_seekable = true;
        let seek = SeekRequest {
            byte_offset: 1_000,
            pct_offset: 90,
            time_offset_s: 30,
        };

        assert_eq!(resolve(&mut src, &seek).unwrap(), 1_000);
        assert_eq!(src.last_time_target, None);
    }

    #[test]
    fn time_offset_adds_first_pcr() {
        let mut src = source(10_000_000);
        src.time_seekable = true;
        src.first_pcr_ms = 5_000;

        let offset = resolve(&mut src, &SeekRequest::time(3)).unwrap();

        assert_eq!(src.last_time_target, Some(8_000));
        assert_eq!(offset, 799_940);
    }

    #[test]
    fn time_offset_on_unseekable_source_is_ignored() {
        let mut src = source(1_000_000);
        let offset = resolve(&mut src, &SeekRequest::time(30)).unwrap();

        assert_eq!(offset, 0);
        assert_eq!(src.last_time_target, None);
    }
}
