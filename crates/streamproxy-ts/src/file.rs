//! Seekable transport-stream recordings.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use streamproxy_common::{PidKind, PidMap, StreamSource};

use crate::packet::{self, PacketHeader, PACKET_SIZE, PAT_PID, SYNC_BYTE};
use crate::psi::{self, ProgramMap};
use crate::{Error, Result};

/// How far into the file PSI tables and the first PCR are searched for.
const PROBE_LIMIT: u64 = 16 * 1024 * 1024;

/// Window read from the end of the file when looking for the last PCR.
const TAIL_WINDOW: u64 = 4 * 1024 * 1024;

/// Window read per binary-search step when looking for the next PCR.
const PCR_SEARCH_WINDOW: u64 = 512 * PACKET_SIZE as u64;

/// Chunk size for sequential scans.
const SCAN_CHUNK: usize = 1024 * PACKET_SIZE;

/// A transport-stream file opened for streaming.
#[derive(Debug)]
pub struct TsFile {
    file: File,
    path: PathBuf,
    length: u64,
    pids: PidMap,
    pcr_pid: u16,
    first_pcr_ms: Option<u64>,
    last_pcr_ms: Option<u64>,
}

impl TsFile {
    /// Open `path`, locate its PMT, video and audio PIDs, and position it at
    /// offset 0.
    ///
    /// With `scan_pcr` the first and last PCR are also located, which makes
    /// the file time-seekable. This costs two extra reads and is only worth
    /// doing when a time offset was requested.
    pub fn open(path: impl AsRef<Path>, scan_pcr: bool) -> streamproxy_common::Result<Self> {
        let path = path.as_ref();
        Self::open_inner(path, scan_pcr)
            .map_err(|e| streamproxy_common::Error::open(path, e.to_string()))
    }

    fn open_inner(path: &Path, scan_pcr: bool) -> Result<Self> {
        let file = File::open(path)?;
        let length = file.metadata()?.len();

        if length < PACKET_SIZE as u64 {
            return Err(Error::not_transport_stream(format!(
                "{length} bytes is shorter than one packet"
            )));
        }

        let mut head = [0u8; PACKET_SIZE + 1];
        let head_len = read_full_at(&file, &mut head, 0)?;
        if head[0] != SYNC_BYTE || (head_len > PACKET_SIZE && head[PACKET_SIZE] != SYNC_BYTE) {
            return Err(Error::not_transport_stream("missing sync byte"));
        }

        let mut ts = Self {
            file,
            path: path.to_path_buf(),
            length,
            pids: PidMap::new(),
            pcr_pid: 0,
            first_pcr_ms: None,
            last_pcr_ms: None,
        };

        let (pmt_pid, pmt) = ts.find_program()?;
        let video = pmt.video().ok_or(Error::MissingStream("video"))?;

        ts.pids.insert(PidKind::Pmt, pmt_pid);
        ts.pids.insert(PidKind::Video, video.pid);
        ts.pids.insert_opt(PidKind::Audio, pmt.audio().map(|a| a.pid));
        ts.pcr_pid = pmt.pcr_pid;

        if scan_pcr {
            ts.first_pcr_ms = ts.first_pcr()?;
            ts.last_pcr_ms = ts.last_pcr()?;
        }

        tracing::debug!(
            path = %ts.path.display(),
            length = ts.length,
            pids = %ts.pids,
            pcr_pid = ts.pcr_pid,
            first_pcr_ms = ?ts.first_pcr_ms,
            last_pcr_ms = ?ts.last_pcr_ms,
            "Opened transport stream"
        );

        ts.file.seek(SeekFrom::Start(0))?;
        Ok(ts)
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID carrying the program clock reference.
    pub fn pcr_pid(&self) -> u16 {
        self.pcr_pid
    }

    /// Last PCR in the file in milliseconds, when indexed.
    pub fn last_pcr_ms(&self) -> Option<u64> {
        self.last_pcr_ms
    }

    /// Offset of the last whole packet.
    fn last_packet_offset(&self) -> u64 {
        packet::align_down(self.length) - PACKET_SIZE as u64
    }

    /// Walk PAT then PMT within the probe limit.
    fn find_program(&self) -> Result<(u16, ProgramMap)> {
        let mut pmt_pid = None;
        let mut found = None;

        self.scan(0, PROBE_LIMIT, |pkt| {
            let Some(header) = PacketHeader::parse(pkt) else {
                return false;
            };
            if !header.payload_unit_start {
                return false;
            }

            let current = pmt_pid;
            match current {
                None if header.pid == PAT_PID => {
                    pmt_pid = packet::payload(pkt)
                        .and_then(psi::section)
                        .and_then(psi::parse_pat)
                        .and_then(|programs| programs.first().map(|p| p.pmt_pid));
                }
                Some(pid) if header.pid == pid => {
                    found = packet::payload(pkt)
                        .and_then(psi::section)
                        .and_then(psi::parse_pmt);
                }
                _ => {}
            }

            found.is_some()
        })?;

        let pmt_pid = pmt_pid.ok_or(Error::MissingTable("PAT"))?;
        let pmt = found.ok_or(Error::MissingTable("PMT"))?;
        Ok((pmt_pid, pmt))
    }

    fn first_pcr(&self) -> Result<Option<u64>> {
        self.next_pcr_ms(0, PROBE_LIMIT)
    }

    fn last_pcr(&self) -> Result<Option<u64>> {
        let start = packet::align_down(self.length.saturating_sub(TAIL_WINDOW));
        let pcr_pid = self.pcr_pid;
        let mut last = None;

        self.scan(start, self.length - start, |pkt| {
            if let Some(base) = pcr_on(pkt, pcr_pid) {
                last = Some(packet::pcr_base_to_ms(base));
            }
            false
        })?;

        Ok(last)
    }

    /// First PCR at or after `offset`, searching at most `limit` bytes.
    fn next_pcr_ms(&self, offset: u64, limit: u64) -> Result<Option<u64>> {
        let pcr_pid = self.pcr_pid;
        let mut pcr = None;

        self.scan(offset, limit, |pkt| {
            pcr = pcr_on(pkt, pcr_pid).map(packet::pcr_base_to_ms);
            pcr.is_some()
        })?;

        Ok(pcr)
    }

    /// Feed whole packets from `[offset, offset + limit)` to `visit` until it
    /// returns true or the range is exhausted. Does not move the read cursor.
    fn scan<F>(&self, offset: u64, limit: u64, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let end = self.length.min(offset.saturating_add(limit));
        let mut pos = offset;
        let mut chunk = vec![0u8; SCAN_CHUNK];

        while pos < end {
            let want = ((end - pos) as usize).min(SCAN_CHUNK);
            let got = read_full_at(&self.file, &mut chunk[..want], pos)?;

            for pkt in chunk[..got].chunks_exact(PACKET_SIZE) {
                if visit(pkt) {
                    return Ok(());
                }
            }

            if got < want {
                break;
            }
            pos += got as u64;
        }

        Ok(())
    }

    fn seek_time_inner(&mut self, pcr_ms: u64) -> Result<u64> {
        if !self.is_time_seekable() {
            return Err(Error::NotTimeSeekable);
        }

        let packets = self.length / PACKET_SIZE as u64;
        let mut lo = 0u64;
        let mut hi = packets;

        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            match self.next_pcr_ms(mid * PACKET_SIZE as u64, PCR_SEARCH_WINDOW)? {
                Some(pcr) if pcr <= pcr_ms => lo = mid,
                _ => hi = mid,
            }
        }

        Ok(self.seek_aligned(lo * PACKET_SIZE as u64)?)
    }

    fn seek_aligned(&mut self, byte_offset: u64) -> io::Result<u64> {
        let offset = packet::align_down(byte_offset).min(self.last_packet_offset());
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(offset)
    }
}

impl StreamSource for TsFile {
    fn stream_length(&self) -> u64 {
        self.length
    }

    fn pids(&self) -> PidMap {
        self.pids.clone()
    }

    fn first_pcr_ms(&self) -> u64 {
        self.first_pcr_ms.unwrap_or(0)
    }

    fn is_time_seekable(&self) -> bool {
        matches!(
            (self.first_pcr_ms, self.last_pcr_ms),
            (Some(first), Some(last)) if last > first
        )
    }

    fn seek_absolute(&mut self, byte_offset: u64) -> streamproxy_common::Result<u64> {
        Ok(self.seek_aligned(byte_offset)?)
    }

    fn seek_relative(&mut self, part: u64, total: u64) -> streamproxy_common::Result<u64> {
        if total == 0 {
            return Err(streamproxy_common::Error::seek("relative seek with zero total"));
        }
        let target = (u128::from(self.length) * u128::from(part.min(total)) / u128::from(total)) as u64;
        self.seek_absolute(target)
    }

    fn seek_time(&mut self, pcr_ms: u64) -> streamproxy_common::Result<u64> {
        self.seek_time_inner(pcr_ms).map_err(Error::into_seek_error)
    }
}

impl Read for TsFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl AsFd for TsFile {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

fn pcr_on(pkt: &[u8], pcr_pid: u16) -> Option<u64> {
    match PacketHeader::parse(pkt) {
        Some(header) if header.pid == pcr_pid => packet::pcr_base(pkt),
        _ => None,
    }
}

/// Positioned read that keeps going until `buf` is full or EOF.
fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
