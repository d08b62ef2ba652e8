//! Integration tests for the transfer loop.
//!
//! Runs real transfers against a pass-through encoder built on a socket
//! pair, so every byte the client receives after the response head is a
//! byte of the source.

mod common;

use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsFd;

use assert_matches::assert_matches;
use common::{
    broken_pipe, client_pair, spawn_reader, test_settings, FakeEncoder, FakeSource, StartBehavior,
    TEST_UNIT,
};
use streamproxy::encoder::{ControlOp, EncoderState};
use streamproxy::transfer::{stream_passthrough, ResponsePreamble, Transfer, TransferOutcome};
use streamproxy_common::{EncodingParams, SeekRequest};

// ---------------------------------------------------------------------------
// End of stream
// ---------------------------------------------------------------------------

#[test]
fn short_source_read_ends_cleanly_after_preamble() {
    let source = FakeSource::patterned(2 * TEST_UNIT + 100);
    let expected = source.bytes().to_vec();
    let (encoder, spy) = FakeEncoder::echo(StartBehavior::Immediate);
    let (client, peer) = client_pair();
    let reader = spawn_reader(peer);

    let transfer = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap();
    let report = transfer.run();

    drop(client);
    let received = reader.join().unwrap();

    assert_eq!(report.outcome, TransferOutcome::EndOfStream);
    assert!(report.outcome.is_clean());
    assert_eq!(report.encoder_state, EncoderState::Running);
    assert_eq!(report.bytes_to_encoder, 2 * TEST_UNIT as u64);

    let preamble = ResponsePreamble::new(0, expected.len() as u64, "Streamproxy").to_bytes();
    assert!(received.starts_with(&preamble), "client must see headers first");
    assert_eq!(report.bytes_to_client, received.len() as u64);

    let payload = &received[preamble.len()..];
    assert!(payload.len() <= 2 * TEST_UNIT);
    assert_eq!(payload, &expected[..payload.len()], "payload is the source in order");

    assert_eq!(spy.ops().last(), Some(&ControlOp::StopTranscoding));
    assert!(spy.released());
}

#[test]
fn long_stream_respects_queue_capacity() {
    let capacity = 2 * TEST_UNIT;
    let source = FakeSource::patterned(64 * TEST_UNIT + 17);
    let expected = source.bytes().to_vec();
    let (encoder, _spy) = FakeEncoder::echo(StartBehavior::Immediate);
    let (client, peer) = client_pair();
    let reader = spawn_reader(peer);

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(capacity),
    )
    .unwrap()
    .run();

    drop(client);
    let received = reader.join().unwrap();

    assert_eq!(report.outcome, TransferOutcome::EndOfStream);
    assert_eq!(report.bytes_to_encoder, 64 * TEST_UNIT as u64);
    assert!(report.peak_queue_usage <= capacity);
    assert!(report.peak_queue_percent <= 100.0);
    assert!(report.bytes_from_encoder <= report.bytes_to_encoder);

    let preamble_len = ResponsePreamble::new(0, expected.len() as u64, "Streamproxy")
        .to_bytes()
        .len();
    let payload = &received[preamble_len..];
    assert_eq!(payload, &expected[..payload.len()]);
}

// ---------------------------------------------------------------------------
// Client hangup
// ---------------------------------------------------------------------------

#[test]
fn hangup_while_initializing_stops_encoder_without_writing() {
    let source = FakeSource::patterned(16 * TEST_UNIT);
    let (encoder, spy) = FakeEncoder::echo(StartBehavior::BlockUntilStop);
    let (client, peer) = client_pair();
    drop(peer);

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();

    assert_eq!(report.outcome, TransferOutcome::ClientHangup);
    assert!(report.encoder_state.is_starting_up(), "never reached Running");
    assert_eq!(report.bytes_to_client, 0, "no write to a closed socket");
    assert_eq!(report.bytes_to_encoder, 0);

    let ops = spy.ops();
    assert!(ops.contains(&ControlOp::StartTranscoding));
    assert!(ops.contains(&ControlOp::StopTranscoding));
    assert!(spy.released(), "start thread joined and device closed");
}

#[test]
fn hangup_mid_stream_is_clean() {
    let source = FakeSource::patterned(4096 * TEST_UNIT);
    let (encoder, spy) = FakeEncoder::echo(StartBehavior::Immediate);
    let (client, peer) = client_pair();

    let closer = std::thread::spawn(move || {
        use std::io::Read;
        let mut peer = peer;
        let mut buf = vec![0u8; 4 * TEST_UNIT];
        let mut total = 0;
        while total < 4 * TEST_UNIT {
            match peer.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => total += n,
            }
        }
        total
    });

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(4 * TEST_UNIT),
    )
    .unwrap()
    .run();
    let read_before_close = closer.join().unwrap();

    assert_matches!(
        report.outcome,
        TransferOutcome::ClientHangup | TransferOutcome::SocketWriteFailed
    );
    assert!(report.bytes_to_client >= read_before_close as u64);
    assert_eq!(spy.ops().last(), Some(&ControlOp::StopTranscoding));
}

// ---------------------------------------------------------------------------
// Startup failures and seeking
// ---------------------------------------------------------------------------

#[test]
fn failed_start_aborts_transfer() {
    let source = FakeSource::patterned(16 * TEST_UNIT);
    let (encoder, spy) = FakeEncoder::echo(StartBehavior::Fail);
    let (client, peer) = client_pair();
    let reader = spawn_reader(peer);

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();

    drop(client);
    let received = reader.join().unwrap();

    assert_eq!(report.outcome, TransferOutcome::DeviceStartFailed);
    assert!(!report.outcome.is_clean());
    assert_eq!(report.bytes_to_encoder, 0);
    assert_eq!(received.len() as u64, report.bytes_to_client);
    assert!(spy.released());
}

#[test]
fn percentage_seek_yields_partial_response() {
    let len = 1_000_000;
    let source = FakeSource::patterned(len);
    let (encoder, _spy) = FakeEncoder::echo(StartBehavior::BlockUntilStop);
    let (client, peer) = client_pair();

    // Hang up once the response head has arrived.
    let head_reader = std::thread::spawn(move || {
        use std::io::Read;
        let mut peer = peer;
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            match peer.read(&mut byte) {
                Ok(0) | Err(_) => break,
                Ok(_) => head.push(byte[0]),
            }
        }
        head
    });

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::percent(50),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();
    let head = String::from_utf8(head_reader.join().unwrap()).unwrap();

    assert_eq!(report.outcome, TransferOutcome::ClientHangup);
    assert!(report.offset > 0);
    assert!(head.starts_with("HTTP/1.1 206 Partial Content\r\n"));
    assert!(head.contains(&format!(
        "Content-Range: bytes {}-{}/{}\r\n",
        report.offset,
        len - 1,
        len
    )));
}

#[test]
fn byte_offset_is_reported_verbatim() {
    let source = FakeSource::patterned(1_000_000);
    let (encoder, _spy) = FakeEncoder::echo(StartBehavior::BlockUntilStop);
    let (client, peer) = client_pair();
    drop(peer);

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::bytes(500_000),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();

    assert_eq!(report.offset, 500_000);
}

// ---------------------------------------------------------------------------
// Descriptor failures
// ---------------------------------------------------------------------------

#[test]
fn encoder_hangup_ends_transfer() {
    let source = FakeSource::patterned(16 * TEST_UNIT);
    let (encoder, spy) = FakeEncoder::detached(StartBehavior::Immediate);
    let (client, peer) = client_pair();
    let reader = spawn_reader(peer);

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();

    drop(client);
    reader.join().unwrap();

    assert_eq!(report.outcome, TransferOutcome::EncoderError);
    assert!(!report.outcome.is_clean());
    assert_eq!(report.bytes_to_encoder, 0);
    assert!(spy.released());
}

#[test]
fn failed_encoder_write_ends_transfer() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"device").unwrap();
    let read_only = File::open(tmp.path()).unwrap();

    let source = FakeSource::patterned(16 * TEST_UNIT);
    let (encoder, spy) = FakeEncoder::over(read_only, StartBehavior::Immediate);
    let (client, peer) = client_pair();
    let reader = spawn_reader(peer);

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();

    drop(client);
    reader.join().unwrap();

    assert_eq!(report.outcome, TransferOutcome::EncoderWriteFailed);
    assert_eq!(report.encoder_state, EncoderState::Running);
    assert_eq!(report.bytes_to_encoder, 0);
    assert_eq!(spy.ops().last(), Some(&ControlOp::StopTranscoding));
}

#[test]
fn failed_source_read_ends_transfer() {
    let source = FakeSource::unreadable(16 * TEST_UNIT);
    let (encoder, spy) = FakeEncoder::echo(StartBehavior::Immediate);
    let (client, peer) = client_pair();
    let reader = spawn_reader(peer);

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();

    drop(client);
    reader.join().unwrap();

    assert_eq!(report.outcome, TransferOutcome::SourceReadFailed);
    assert_eq!(report.encoder_state, EncoderState::Running);
    assert_eq!(report.bytes_to_encoder, 0);
    assert!(spy.released());
}

#[test]
fn encoder_closing_its_output_ends_transfer() {
    let source = FakeSource::patterned(4096 * TEST_UNIT);
    let (encoder, _spy) = FakeEncoder::mute(StartBehavior::Immediate);
    let (client, peer) = client_pair();
    let reader = spawn_reader(peer);

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();

    drop(client);
    reader.join().unwrap();

    assert_eq!(report.outcome, TransferOutcome::EncoderReadFailed);
    assert_eq!(report.bytes_from_encoder, 0);
}

#[test]
fn client_socket_error_ends_transfer_without_writing() {
    let source = FakeSource::patterned(16 * TEST_UNIT);
    let (encoder, spy) = FakeEncoder::echo(StartBehavior::Immediate);
    let client = broken_pipe();

    let report = Transfer::new(
        source,
        encoder,
        SeekRequest::default(),
        &EncodingParams::default(),
        client.as_fd(),
        test_settings(8 * TEST_UNIT),
    )
    .unwrap()
    .run();

    assert_eq!(report.outcome, TransferOutcome::SocketError);
    assert_eq!(report.bytes_to_client, 0);
    assert!(spy.released());
}

// ---------------------------------------------------------------------------
// Passthrough
// ---------------------------------------------------------------------------

/// A client that has already gone away.
struct ClosedClient;

impl Write for ClosedClient {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn passthrough_sends_head_then_whole_source() {
    let source = FakeSource::patterned(3 * TEST_UNIT + 100);
    let expected = source.bytes().to_vec();
    let mut client = Vec::new();

    let report = stream_passthrough(
        source,
        &SeekRequest::default(),
        &mut client,
        &test_settings(8 * TEST_UNIT),
    )
    .unwrap();

    let preamble = ResponsePreamble::new(0, expected.len() as u64, "Streamproxy").to_bytes();
    assert_eq!(report.outcome, TransferOutcome::EndOfStream);
    assert_eq!(report.offset, 0);
    assert_eq!(&client[..preamble.len()], &preamble[..]);
    assert_eq!(&client[preamble.len()..], &expected[..]);
    assert_eq!(report.bytes_to_client, expected.len() as u64);
}

#[test]
fn passthrough_honours_byte_offset() {
    let source = FakeSource::patterned(4 * TEST_UNIT);
    let expected = source.bytes().to_vec();
    let seek = SeekRequest::bytes(1000);
    let mut client = Vec::new();

    let report = stream_passthrough(source, &seek, &mut client, &test_settings(8 * TEST_UNIT))
        .unwrap();

    let preamble = ResponsePreamble::new(1000, expected.len() as u64, "Streamproxy").to_bytes();
    assert_eq!(report.offset, 1000);
    assert!(client.starts_with(b"HTTP/1.1 206 Partial Content\r\n"));
    // The source lands on the packet boundary at or before the offset.
    assert_eq!(&client[preamble.len()..], &expected[940..]);
}

#[test]
fn passthrough_to_closed_client_is_a_hangup() {
    let source = FakeSource::patterned(2 * TEST_UNIT);
    let report = stream_passthrough(
        source,
        &SeekRequest::default(),
        &mut ClosedClient,
        &test_settings(8 * TEST_UNIT),
    )
    .unwrap();

    assert_eq!(report.outcome, TransferOutcome::ClientHangup);
    assert_eq!(report.bytes_to_client, 0);
}

#[test]
fn passthrough_source_failure_ends_after_head() {
    let source = FakeSource::unreadable(2 * TEST_UNIT);
    let mut client = Vec::new();

    let report = stream_passthrough(
        source,
        &SeekRequest::default(),
        &mut client,
        &test_settings(8 * TEST_UNIT),
    )
    .unwrap();

    assert_eq!(report.outcome, TransferOutcome::SourceReadFailed);
    assert!(client.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert_eq!(report.bytes_to_client, 0);
}
