//! The poll loop that moves one recording through the encoder to a client.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::ops::ControlFlow;
use std::os::fd::{AsRawFd, BorrowedFd};

use libc::{c_int, c_short, pollfd, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, POLLRDHUP};
use nix::sys::socket::{send, MsgFlags};

use streamproxy_common::{EncodingParams, Error, Result, SeekRequest, StreamSource};

use super::preamble::ResponsePreamble;
use super::queue::ByteQueue;
use super::{seek, TransferSettings};
use crate::encoder::{EncoderSession, EncoderState, TranscoderDevice};

/// Why a transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The source returned less than a full transfer unit.
    EndOfStream,
    /// The client closed or half-closed its socket.
    ClientHangup,
    /// The client socket reported an error or became invalid.
    SocketError,
    /// The encoder descriptor reported an error, hangup or became invalid.
    EncoderError,
    /// The readiness wait itself failed.
    PollFailed,
    /// Reading the source failed.
    SourceReadFailed,
    /// The encoder accepted fewer bytes than written, or the write failed.
    EncoderWriteFailed,
    /// Reading encoder output failed or the encoder closed its output.
    EncoderReadFailed,
    /// Writing to the client failed.
    SocketWriteFailed,
    /// The encoder could not be started.
    DeviceStartFailed,
}

impl TransferOutcome {
    /// End of stream and client hangup are normal ways for a session to end.
    pub fn is_clean(self) -> bool {
        matches!(self, TransferOutcome::EndOfStream | TransferOutcome::ClientHangup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransferOutcome::EndOfStream => "end of stream",
            TransferOutcome::ClientHangup => "client hangup",
            TransferOutcome::SocketError => "socket error",
            TransferOutcome::EncoderError => "encoder error",
            TransferOutcome::PollFailed => "poll failed",
            TransferOutcome::SourceReadFailed => "source read failed",
            TransferOutcome::EncoderWriteFailed => "encoder write failed",
            TransferOutcome::EncoderReadFailed => "encoder read failed",
            TransferOutcome::SocketWriteFailed => "socket write failed",
            TransferOutcome::DeviceStartFailed => "device start failed",
        }
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a finished transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReport {
    pub outcome: TransferOutcome,
    /// Encoder state when the loop exited, before the session was stopped.
    pub encoder_state: EncoderState,
    /// Offset reported to the client in the response head.
    pub offset: u64,
    pub bytes_to_encoder: u64,
    pub bytes_from_encoder: u64,
    pub bytes_to_client: u64,
    pub peak_queue_usage: usize,
    pub peak_queue_percent: f64,
}

/// Writes to a borrowed socket without raising `SIGPIPE`.
pub struct SocketWriter<'a>(pub BorrowedFd<'a>);

impl Write for SocketWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        send(self.0.as_raw_fd(), buf, MsgFlags::MSG_NOSIGNAL).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One client transfer: source to encoder, encoder to queue, queue to client.
///
/// The transfer owns the source, the encoder session and the queue; the
/// client socket is borrowed and stays with the caller. Everything owned is
/// released when [`Transfer::run`] returns.
pub struct Transfer<'a, S: StreamSource, D: TranscoderDevice> {
    source: S,
    encoder: EncoderSession<D>,
    queue: ByteQueue,
    buffer: Vec<u8>,
    client: BorrowedFd<'a>,
    settings: TransferSettings,
    offset: u64,
    bytes_to_encoder: u64,
    bytes_from_encoder: u64,
    bytes_to_client: u64,
}

impl<'a, S: StreamSource, D: TranscoderDevice> Transfer<'a, S, D> {
    /// Seek the source, queue the response head and configure the encoder.
    ///
    /// Nothing is written to `client` here; on error the caller still owns
    /// a clean connection.
    pub fn new(
        mut source: S,
        device: D,
        seek: SeekRequest,
        params: &EncodingParams,
        client: BorrowedFd<'a>,
        settings: TransferSettings,
    ) -> Result<Self> {
        let offset = seek::resolve(&mut source, &seek)?;
        let length = source.stream_length();

        let mut queue = ByteQueue::new(settings.queue_capacity);
        queue.append(&ResponsePreamble::new(offset, length, &settings.server_identity).to_bytes())?;

        let pids = source.pids();
        let encoder = EncoderSession::new(device, &pids, params)?;
        tracing::debug!(
            stream_pids = %pids,
            encoder_pids = %encoder.pids(),
            offset,
            length,
            "Transfer prepared"
        );

        Ok(Self {
            source,
            encoder,
            queue,
            buffer: vec![0; settings.transfer_unit],
            client,
            settings,
            offset,
            bytes_to_encoder: 0,
            bytes_from_encoder: 0,
            bytes_to_client: 0,
        })
    }

    /// Run until the stream ends, the client goes away, or something fails.
    pub fn run(mut self) -> TransferReport {
        let outcome = loop {
            if let Err(e) = self.encoder.advance() {
                tracing::warn!("Encoder start failed: {e}");
                break TransferOutcome::DeviceStartFailed;
            }
            if let ControlFlow::Break(outcome) = self.poll_once() {
                break outcome;
            }
        };

        let encoder_state = self.encoder.state();
        self.encoder.stop();

        let report = TransferReport {
            outcome,
            encoder_state,
            offset: self.offset,
            bytes_to_encoder: self.bytes_to_encoder,
            bytes_from_encoder: self.bytes_from_encoder,
            bytes_to_client: self.bytes_to_client,
            peak_queue_usage: self.queue.peak(),
            peak_queue_percent: self.queue.peak_percent(),
        };

        if outcome.is_clean() {
            tracing::info!(
                reason = %outcome,
                to_client = report.bytes_to_client,
                "Transfer finished"
            );
        } else {
            tracing::warn!(
                reason = %outcome,
                encoder_state = %encoder_state,
                to_client = report.bytes_to_client,
                "Transfer aborted"
            );
        }
        tracing::info!("Peak queue usage {:.1}%", report.peak_queue_percent);

        report
    }

    /// One readiness wait and the I/O it allows.
    fn poll_once(&mut self) -> ControlFlow<TransferOutcome> {
        let state = self.encoder.state();
        let running = state == EncoderState::Running;

        let Some(device) = self.encoder.file() else {
            return ControlFlow::Break(TransferOutcome::EncoderError);
        };

        let mut encoder_interest: c_short = 0;
        if running {
            encoder_interest |= POLLOUT;
            if self.queue.free() > 0 {
                encoder_interest |= POLLIN;
            }
        }

        let mut client_interest = POLLRDHUP;
        if !self.queue.is_empty() {
            client_interest |= POLLOUT;
        }

        // The confirmation cycle after startup completes does not wait.
        let timeout = match state {
            EncoderState::Running => -1,
            EncoderState::Starting => 0,
            _ => c_int::from(self.settings.startup_poll_ms),
        };

        let mut fds = [
            Readiness::interest(device.as_raw_fd(), encoder_interest),
            Readiness::interest(self.client.as_raw_fd(), client_interest),
        ];
        match wait(&mut fds, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return ControlFlow::Continue(()),
            Err(e) => return fail(TransferOutcome::PollFailed, Error::descriptor("poll", e)),
        }
        let encoder_events = Readiness(fds[0].revents);
        let client_events = Readiness(fds[1].revents);

        if encoder_events.any(POLLERR | POLLHUP | POLLNVAL) {
            tracing::debug!(events = ?encoder_events, "Encoder descriptor failed");
            return ControlFlow::Break(TransferOutcome::EncoderError);
        }
        if client_events.any(POLLHUP | POLLRDHUP) {
            tracing::debug!(events = ?client_events, "Client hung up");
            return ControlFlow::Break(TransferOutcome::ClientHangup);
        }
        if client_events.any(POLLERR | POLLNVAL) {
            tracing::debug!(events = ?client_events, "Client socket failed");
            return ControlFlow::Break(TransferOutcome::SocketError);
        }

        if encoder_events.any(POLLOUT) {
            self.feed_encoder()?;
        }
        if encoder_events.any(POLLIN) {
            self.collect_output()?;
        }
        if client_events.any(POLLOUT) {
            self.flush_to_client()?;
        }

        ControlFlow::Continue(())
    }

    /// Copy one transfer unit from the source to the encoder.
    fn feed_encoder(&mut self) -> ControlFlow<TransferOutcome> {
        let n = match read_full(&mut self.source, &mut self.buffer) {
            Ok(n) => n,
            Err(e) => {
                return fail(TransferOutcome::SourceReadFailed, Error::descriptor("source read", e))
            }
        };
        if n < self.buffer.len() {
            tracing::debug!(last_read = n, "Source exhausted");
            return ControlFlow::Break(TransferOutcome::EndOfStream);
        }

        let Some(device) = self.encoder.file() else {
            return ControlFlow::Break(TransferOutcome::EncoderError);
        };
        match write_once(device, &self.buffer) {
            Ok(written) if written == n => {
                self.bytes_to_encoder += written as u64;
                ControlFlow::Continue(())
            }
            Ok(written) => {
                tracing::warn!(written, expected = n, "Short write to encoder");
                ControlFlow::Break(TransferOutcome::EncoderWriteFailed)
            }
            Err(e) => fail(TransferOutcome::EncoderWriteFailed, Error::descriptor("encoder write", e)),
        }
    }

    /// Pull available encoder output into the queue.
    fn collect_output(&mut self) -> ControlFlow<TransferOutcome> {
        let Some(mut device) = self.encoder.file() else {
            return ControlFlow::Break(TransferOutcome::EncoderError);
        };
        match self.queue.fill_from(&mut device, self.settings.transfer_unit) {
            Ok(0) if self.queue.free() > 0 => {
                tracing::warn!("Encoder closed its output");
                ControlFlow::Break(TransferOutcome::EncoderReadFailed)
            }
            Ok(n) => {
                self.bytes_from_encoder += n as u64;
                ControlFlow::Continue(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ControlFlow::Continue(()),
            Err(e) => fail(TransferOutcome::EncoderReadFailed, Error::descriptor("encoder read", e)),
        }
    }

    /// Send as much queued data as the client accepts.
    fn flush_to_client(&mut self) -> ControlFlow<TransferOutcome> {
        match self.queue.drain_to(&mut SocketWriter(self.client)) {
            Ok(n) => {
                self.bytes_to_client += n as u64;
                ControlFlow::Continue(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ControlFlow::Continue(()),
            Err(e) => fail(TransferOutcome::SocketWriteFailed, Error::descriptor("socket write", e)),
        }
    }
}

/// Raw `revents` bits of one descriptor, `POLLRDHUP` included.
#[derive(Clone, Copy, PartialEq, Eq)]
struct Readiness(c_short);

impl Readiness {
    fn interest(fd: c_int, events: c_short) -> pollfd {
        pollfd { fd, events, revents: 0 }
    }

    fn any(self, mask: c_short) -> bool {
        self.0 & mask != 0
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Wait for readiness on `fds`. `timeout_ms` of -1 waits indefinitely.
fn wait(fds: &mut [pollfd], timeout_ms: c_int) -> io::Result<()> {
    // SAFETY: `fds` is an exclusively borrowed, initialised slice whose length
    // is passed alongside it; the kernel only writes `revents`.
    let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn fail(outcome: TransferOutcome, error: Error) -> ControlFlow<TransferOutcome> {
    if outcome == TransferOutcome::SocketWriteFailed {
        tracing::debug!(reason = %outcome, "{error}");
    } else {
        tracing::warn!(reason = %outcome, "{error}");
    }
    ControlFlow::Break(outcome)
}

/// Read until `buf` is full or the reader reports end of file.
pub(super) fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn write_once(mut file: &File, buf: &[u8]) -> io::Result<usize> {
    loop {
        match file.write(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
