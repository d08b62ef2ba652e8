//! The HTTP response head sent ahead of the transcoded stream.

use std::fmt;

/// Status line and headers for one transfer.
///
/// Clients match on this byte for byte, so the header order and spelling
/// are fixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePreamble<'a> {
    /// Resolved start offset. Non-zero makes the response partial.
    pub offset: u64,
    /// Total stream length.
    pub length: u64,
    /// `Server:` header value.
    pub identity: &'a str,
}

impl<'a> ResponsePreamble<'a> {
    pub fn new(offset: u64, length: u64, identity: &'a str) -> Self {
        Self {
            offset,
            length,
            identity,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.offset > 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for ResponsePreamble<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_partial() {
            f.write_str("HTTP/1.1 206 Partial Content\r\n")?;
        } else {
            f.write_str("HTTP/1.1 200 OK\r\n")?;
        }
        f.write_str("Connection: Close\r\n")?;
        f.write_str("Content-Type: video/mpeg\r\n")?;
        write!(f, "Server: {}\r\n", self.identity)?;
        f.write_str("Accept-Ranges: bytes\r\n")?;
        write!(f, "Content-Length: {}\r\n", self.length)?;
        if self.is_partial() {
            write!(
                f,
                "Content-Range: bytes {}-{}/{}\r\n",
                self.offset,
                self.length.saturating_sub(1),
                self.length
            )?;
        }
        f.write_str("\r\n")
    }
}
