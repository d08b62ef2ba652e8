//! Shared test harness for integration tests.
//!
//! Provides a [`FakeEncoder`] backed by a socket pair whose far end echoes
//! every byte back, a [`FakeSource`] over an in-memory recording, and
//! helpers for client sockets and synthetic transport-stream files.

#![allow(dead_code)]

use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::net::Shutdown;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use streamproxy::encoder::{ControlOp, TranscoderDevice};
use streamproxy::transfer::TransferSettings;
use streamproxy_common::{Error, PidKind, PidMap, Result, StreamSource};

pub const PACKET_SIZE: usize = 188;

/// Small transfer unit so tests move many units quickly.
pub const TEST_UNIT: usize = 16 * PACKET_SIZE;

pub fn test_settings(queue_capacity: usize) -> TransferSettings {
    TransferSettings {
        queue_capacity,
        transfer_unit: TEST_UNIT,
        startup_poll_ms: 10,
        server_identity: "Streamproxy".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// How the fake device answers the start command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBehavior {
    /// Start returns at once.
    Immediate,
    /// Start blocks until the stop command arrives.
    BlockUntilStop,
    /// Start fails.
    Fail,
}

/// What the fake device saw.
pub struct EncoderSpy {
    ops: Mutex<Vec<ControlOp>>,
    stopped: Mutex<bool>,
    stop_cv: Condvar,
    released: AtomicBool,
}

impl EncoderSpy {
    pub fn ops(&self) -> Vec<ControlOp> {
        self.ops.lock().unwrap().clone()
    }

    /// True once the session dropped its last handle to the device.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// A transcoder that passes data through unchanged.
pub struct FakeEncoder {
    file: File,
    behavior: StartBehavior,
    spy: Arc<EncoderSpy>,
}

impl FakeEncoder {
    /// Every byte written comes back out unchanged.
    pub fn echo(behavior: StartBehavior) -> (Self, Arc<EncoderSpy>) {
        let (device_end, loop_end) = UnixStream::pair().expect("failed to create socket pair");

        thread::spawn(move || {
            let mut reader = loop_end.try_clone().expect("failed to clone loop end");
            let mut writer = loop_end;
            let _ = io::copy(&mut reader, &mut writer);
        });

        Self::over(File::from(OwnedFd::from(device_end)), behavior)
    }

    /// The driver side is already gone, so the device reports a hangup.
    pub fn detached(behavior: StartBehavior) -> (Self, Arc<EncoderSpy>) {
        let (device_end, driver_end) = UnixStream::pair().expect("failed to create socket pair");
        drop(driver_end);
        Self::over(File::from(OwnedFd::from(device_end)), behavior)
    }

    /// Accepts input but closes its output without producing anything.
    pub fn mute(behavior: StartBehavior) -> (Self, Arc<EncoderSpy>) {
        let (device_end, mut driver_end) = UnixStream::pair().expect("failed to create socket pair");
        driver_end
            .shutdown(Shutdown::Write)
            .expect("failed to shut down driver output");

        thread::spawn(move || {
            let _ = io::copy(&mut driver_end, &mut io::sink());
        });

        Self::over(File::from(OwnedFd::from(device_end)), behavior)
    }

    /// A device backed by an arbitrary file.
    pub fn over(file: File, behavior: StartBehavior) -> (Self, Arc<EncoderSpy>) {
        let spy = Arc::new(EncoderSpy {
            ops: Mutex::new(Vec::new()),
            stopped: Mutex::new(false),
            stop_cv: Condvar::new(),
            released: AtomicBool::new(false),
        });

        let encoder = FakeEncoder {
            file,
            behavior,
            spy: spy.clone(),
        };
        (encoder, spy)
    }
}

impl TranscoderDevice for FakeEncoder {
    fn file(&self) -> &File {
        &self.file
    }

    fn control(&self, op: ControlOp, _arg: u32) -> Result<()> {
        self.spy.ops.lock().unwrap().push(op);
        match op {
            ControlOp::StartTranscoding => match self.behavior {
                StartBehavior::Immediate => Ok(()),
                StartBehavior::Fail => Err(Error::device_control(op.as_str(), "no signal")),
                StartBehavior::BlockUntilStop => {
                    let mut stopped = self.spy.stopped.lock().unwrap();
                    while !*stopped {
                        stopped = self.spy.stop_cv.wait(stopped).unwrap();
                    }
                    Err(Error::device_control(op.as_str(), "interrupted"))
                }
            },
            ControlOp::StopTranscoding => {
                *self.spy.stopped.lock().unwrap() = true;
                self.spy.stop_cv.notify_all();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn property(&self, name: &str) -> Result<String> {
        Err(Error::device_control(format!("getprop {name}"), "unsupported"))
    }

    fn set_property(&self, _name: &str, _value: &str) -> Result<()> {
        Ok(())
    }
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        self.spy.released.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// In-memory recording aligned to 188-byte packets.
pub struct FakeSource {
    data: Cursor<Vec<u8>>,
    pids: PidMap,
    fail_reads: bool,
}

impl FakeSource {
    /// A recording of `len` bytes with a recognisable byte pattern.
    pub fn patterned(len: usize) -> Self {
        let data = (0..len).map(|i| (i % 251) as u8).collect();
        let pids = [
            (PidKind::Pmt, 0x64),
            (PidKind::Video, 0x65),
            (PidKind::Audio, 0x66),
        ]
        .into_iter()
        .collect();
        Self {
            data: Cursor::new(data),
            pids,
            fail_reads: false,
        }
    }

    /// A recording whose every read fails.
    pub fn unreadable(len: usize) -> Self {
        Self {
            fail_reads: true,
            ..Self::patterned(len)
        }
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.get_ref()
    }
}

impl Read for FakeSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads {
            return Err(io::Error::other("medium error"));
        }
        self.data.read(buf)
    }
}

impl StreamSource for FakeSource {
    fn stream_length(&self) -> u64 {
        self.data.get_ref().len() as u64
    }

    fn pids(&self) -> PidMap {
        self.pids.clone()
    }

    fn first_pcr_ms(&self) -> u64 {
        0
    }

    fn is_time_seekable(&self) -> bool {
        false
    }

    fn seek_absolute(&mut self, byte_offset: u64) -> Result<u64> {
        let aligned = byte_offset / PACKET_SIZE as u64 * PACKET_SIZE as u64;
        self.data.set_position(aligned.min(self.stream_length()));
        Ok(self.data.position())
    }

    fn seek_relative(&mut self, part: u64, total: u64) -> Result<u64> {
        self.seek_absolute(self.stream_length() * part / total)
    }

    fn seek_time(&mut self, _pcr_ms: u64) -> Result<u64> {
        Err(Error::seek("not time-seekable"))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A non-blocking client socket and its peer.
pub fn client_pair() -> (UnixStream, UnixStream) {
    let (ours, peer) = UnixStream::pair().expect("failed to create socket pair");
    ours.set_nonblocking(true).unwrap();
    (ours, peer)
}

/// The write end of a pipe whose reader is gone. Polling it reports an
/// error without a hangup.
pub fn broken_pipe() -> OwnedFd {
    let mut fds = [0; 2];
    // SAFETY: `fds` has room for the two descriptors `pipe` writes.
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0, "pipe failed");
    // SAFETY: both descriptors were just created and are owned by nobody else.
    let (reader, writer) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    drop(reader);
    writer
}

/// Read everything the peer receives until the other end closes.
pub fn spawn_reader(mut peer: UnixStream) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut received = Vec::new();
        let _ = peer.read_to_end(&mut received);
        received
    })
}

// ---------------------------------------------------------------------------
// Transport stream files
// ---------------------------------------------------------------------------

fn ts_header(pid: u16, pusi: bool) -> Vec<u8> {
    vec![
        0x47,
        (if pusi { 0x40 } else { 0 }) | ((pid >> 8) as u8 & 0x1F),
        pid as u8,
        0x10,
    ]
}

fn psi_packet(pid: u16, section: &[u8]) -> Vec<u8> {
    let mut p = ts_header(pid, true);
    p.push(0);
    p.extend_from_slice(section);
    p.resize(PACKET_SIZE, 0xFF);
    p
}

/// A minimal recording: PAT, PMT with one H.264 video stream, then padding.
pub fn write_recording(packets: usize) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::NamedTempFile::new().expect("failed to create temp file");

    let pat = [
        0x00, 0xB0, 13, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE0, 0x64, 0, 0, 0, 0,
    ];
    let pmt = [
        0x02, 0xB0, 18, 0x00, 0x01, 0xC1, 0x00, 0x00, 0xE0, 0x65, 0xF0, 0x00, 0x1B, 0xE0, 0x65,
        0xF0, 0x00, 0, 0, 0, 0,
    ];

    let mut data = psi_packet(0, &pat);
    data.extend(psi_packet(0x64, &pmt));
    for i in 2..packets {
        let mut p = ts_header(0x65, false);
        p.resize(PACKET_SIZE, i as u8);
        data.extend(p);
    }

    tmp.write_all(&data).unwrap();
    tmp.flush().unwrap();
    tmp
}
