//! Sending a recording to the client unchanged.

use std::io::{self, Write};

use streamproxy_common::{Error, Result, SeekRequest, StreamSource};

use super::orchestrator::read_full;
use super::{seek, ResponsePreamble, TransferOutcome, TransferSettings};

/// Summary of a finished passthrough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughReport {
    pub outcome: TransferOutcome,
    /// Offset reported to the client in the response head.
    pub offset: u64,
    pub bytes_to_client: u64,
}

/// Seek `source`, then copy it to `client` one transfer unit at a time.
///
/// Seek errors are returned before anything is written. Once the response
/// head is out, every failure ends the copy and is reported as an outcome.
pub fn stream_passthrough<S, W>(
    mut source: S,
    seek: &SeekRequest,
    client: &mut W,
    settings: &TransferSettings,
) -> Result<PassthroughReport>
where
    S: StreamSource,
    W: Write + ?Sized,
{
    let offset = seek::resolve(&mut source, seek)?;
    let length = source.stream_length();
    let head = ResponsePreamble::new(offset, length, &settings.server_identity).to_bytes();

    let mut bytes_to_client = 0u64;
    let outcome = match client.write_all(&head) {
        Err(e) => write_failure(e),
        Ok(()) => copy_units(&mut source, client, settings.transfer_unit, &mut bytes_to_client),
    };

    let report = PassthroughReport {
        outcome,
        offset,
        bytes_to_client,
    };

    if outcome.is_clean() {
        tracing::info!(reason = %outcome, to_client = bytes_to_client, "Passthrough finished");
    } else {
        tracing::warn!(reason = %outcome, to_client = bytes_to_client, "Passthrough aborted");
    }

    Ok(report)
}

fn copy_units<S, W>(source: &mut S, client: &mut W, unit: usize, sent: &mut u64) -> TransferOutcome
where
    S: StreamSource,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; unit];
    loop {
        let n = match read_full(source, &mut buffer) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("{}", Error::descriptor("source read", e));
                return TransferOutcome::SourceReadFailed;
            }
        };

        if n > 0 {
            if let Err(e) = client.write_all(&buffer[..n]) {
                return write_failure(e);
            }
            *sent += n as u64;
        }

        if n < unit {
            return TransferOutcome::EndOfStream;
        }
    }
}

fn write_failure(e: io::Error) -> TransferOutcome {
    match e.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => TransferOutcome::ClientHangup,
        _ => {
            tracing::debug!("{}", Error::descriptor("socket write", e));
            TransferOutcome::SocketWriteFailed
        }
    }
}
