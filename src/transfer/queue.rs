//! Bounded ring buffer between the encoder output and the client socket.

use std::io::{self, Read, Write};

use streamproxy_common::{Error, Result};

/// Fixed-capacity byte queue.
///
/// Capacity is set once at construction and never grows: [`ByteQueue::append`]
/// refuses data that does not fit, and [`ByteQueue::fill_from`] only reads
/// into free space, so a full queue stops pulling from the encoder until
/// [`ByteQueue::drain_to`] makes room.
#[derive(Debug)]
pub struct ByteQueue {
    buf: Vec<u8>,
    head: usize,
    len: usize,
    peak: usize,
}

impl ByteQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            head: 0,
            len: 0,
            peak: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes currently held.
    pub fn usage(&self) -> usize {
        self.len
    }

    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Highest usage seen since construction.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Peak usage as a percentage of capacity.
    pub fn peak_percent(&self) -> f64 {
        if self.capacity() == 0 {
            return 0.0;
        }
        self.peak as f64 * 100.0 / self.capacity() as f64
    }

    /// Copy `data` to the tail. Fails without modifying the queue when it
    /// does not fit.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > self.free() {
            return Err(Error::QueueCapacityExceeded {
                need: data.len(),
                free: self.free(),
            });
        }

        let mut rest = data;
        while !rest.is_empty() {
            let region = self.free_region();
            let n = region.len().min(rest.len());
            region[..n].copy_from_slice(&rest[..n]);
            self.commit(n);
            rest = &rest[n..];
        }
        Ok(())
    }

    /// Perform one read of at most `max_chunk` bytes into free space.
    ///
    /// Returns the number of bytes read. `Ok(0)` with free space left means
    /// the reader reported end of file; a full queue returns `Ok(0)` without
    /// touching the reader.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R, max_chunk: usize) -> io::Result<usize> {
        if self.free() == 0 || max_chunk == 0 {
            return Ok(0);
        }

        let n = loop {
            let region = self.free_region();
            let limit = region.len().min(max_chunk);
            match reader.read(&mut region[..limit]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        self.commit(n);
        Ok(n)
    }

    /// Perform one write of the oldest contiguous run of held bytes.
    ///
    /// Whatever the writer does not accept stays queued for the next call.
    pub fn drain_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }

        let end = (self.head + self.len).min(self.capacity());
        let n = loop {
            match writer.write(&self.buf[self.head..end]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        self.consume(n);
        Ok(n)
    }

    /// The contiguous free region starting at the tail.
    fn free_region(&mut self) -> &mut [u8] {
        let cap = self.capacity();
        if self.len == cap {
            return &mut [];
        }
        let tail = (self.head + self.len) % cap;
        let end = if tail >= self.head { cap } else { self.head };
        &mut self.buf[tail..end]
    }

    fn commit(&mut self, n: usize) {
        self.len += n;
        self.peak = self.peak.max(self.len);
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.len);
        self.len -= n;
        self.head = if self.len == 0 {
            0
        } else {
            (self.head + n) % self.capacity()
        };
    }
}
