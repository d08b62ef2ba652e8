//! Minimal request-head parsing for stream requests.
//!
//! Only `GET /file?file=<path>` is served. Query values are percent-decoded
//! and a `Range: bytes=<start>-` header supplies the byte offset. An
//! `action` key picks plain streaming or transcoding over the configured
//! default.

use std::io::{self, Read};
use std::path::PathBuf;

use streamproxy_common::{EncodingParams, SeekRequest, StreamAction};

/// Largest request head accepted.
const MAX_HEAD: usize = 8192;

/// A parsed stream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub path: PathBuf,
    pub seek: SeekRequest,
    pub params: EncodingParams,
    /// Delivery asked for by the client, if any.
    pub action: Option<StreamAction>,
}

/// Read up to and including the blank line that ends the request head.
pub fn read_request_head<R: Read>(stream: &mut R) -> io::Result<String> {
    let mut buf = Vec::with_capacity(1024);
    let mut byte = [0u8; 1];

    loop {
        match stream.read(&mut byte) {
            Ok(0) => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed")),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n\r\n") {
                    break;
                }
                if buf.len() > MAX_HEAD {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "headers too large"));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    String::from_utf8(buf).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-UTF-8 headers"))
}

/// Parse a request head. `None` for anything that is not a stream request.
pub fn parse_stream_request(head: &str) -> Option<StreamRequest> {
    let mut lines = head.lines();
    let mut parts = lines.next()?.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;

    let (route, query) = target.split_once('?').unwrap_or((target, ""));
    if route != "/file" {
        return None;
    }

    let mut path = None;
    let mut seek = SeekRequest::default();
    let mut params = EncodingParams::default();
    let mut action = None;

    for (key, value) in query_pairs(query) {
        match key.as_str() {
            "file" => path = Some(PathBuf::from(value)),
            "offset_pct" => seek.pct_offset = value.parse().unwrap_or(0),
            "offset_time" => seek.time_offset_s = value.parse().unwrap_or(0),
            "frame_size" => params.frame_size = value,
            "bitrate" => params.bitrate = value,
            "profile" => params.profile = value,
            "level" => params.level = value,
            "bframes" => params.bframes = value,
            "action" => action = StreamAction::parse(&value),
            _ => {}
        }
    }

    if let Some(range) = header(head, "range") {
        seek.byte_offset = parse_range_start(range).unwrap_or(0);
    }

    let path = path.filter(|p| !p.as_os_str().is_empty())?;
    Some(StreamRequest {
        path,
        seek,
        params,
        action,
    })
}

/// Value of the first header called `name`, matched case-insensitively.
pub fn header<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines()
        .skip(1)
        .map(str::trim)
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
}

/// Decoded `key=value` pairs. Pairs that fail to decode are skipped.
fn query_pairs(query: &str) -> impl Iterator<Item = (String, String)> + '_ {
    query.split('&').filter(|s| !s.is_empty()).filter_map(|pair| {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key).ok()?;
        let value = urlencoding::decode(value).ok()?;
        Some((key.into_owned(), value.into_owned()))
    })
}

/// Start of a `Range: bytes=START-[END]` value. The end is ignored since
/// the stream always runs to the end of the recording.
fn parse_range_start(value: &str) -> Option<u64> {
    let bounds = value.strip_prefix("bytes=")?;
    let (start, _end) = bounds.split_once('-')?;
    start.trim().parse().ok()
}
