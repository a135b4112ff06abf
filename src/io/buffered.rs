use std::io;
use std::os::fd::AsRawFd;

use mio::event::Source;

use super::AsyncIo;

/// Default growth chunk when the internal buffer needs more bytes from the
/// stream. Headers rarely need more than one or two reads of this size.
const FILL_CHUNK: usize = 4096;

/// An async equivalent of `std::io::BufReader`, built directly on
/// [`AsyncIo`] rather than wrapping a synchronous `Read`: line- and
/// length-oriented reads that the HTTP/CGI header parsers need (find a
/// delimiter, take N bytes, keep whatever is left for the next call).
pub struct AsyncBufReader<S> {
    io: AsyncIo<S>,
    buf: Vec<u8>,
    pos: usize,
}

impl<S: io::Read + io::Write + Source + AsRawFd> AsyncBufReader<S> {
    pub fn new(io: AsyncIo<S>) -> Self {
        Self { io, buf: Vec::new(), pos: 0 }
    }

    pub fn get_mut(&mut self) -> &mut AsyncIo<S> {
        &mut self.io
    }

    fn available(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }

    /// Reads more bytes from the stream into the buffer. Returns 0 at EOF.
    pub async fn fill(&mut self) -> io::Result<usize> {
        self.compact();
        let start = self.buf.len();
        self.buf.resize(start + FILL_CHUNK, 0);
        let n = self.io.read(&mut self.buf[start..]).await?;
        self.buf.truncate(start + n);
        Ok(n)
    }

    /// Searches the already-buffered bytes (without reading more) for
    /// `needle`, returning its start offset relative to the unconsumed
    /// window.
    fn find(&self, needle: &[u8]) -> Option<usize> {
        let hay = self.available();
        if needle.is_empty() || hay.len() < needle.len() {
            return None;
        }
        hay.windows(needle.len()).position(|w| w == needle)
    }

    /// Reads and consumes bytes up to and including the first occurrence
    /// of `needle`, returning the bytes *before* it. Errors with
    /// `ErrorKind::InvalidData` once `max` bytes have been buffered
    /// without finding the delimiter (the caller maps that to a
    /// protocol-specific "header too long" error).
    pub async fn read_until(&mut self, needle: &[u8], max: usize) -> io::Result<Vec<u8>> {
        loop {
            if let Some(idx) = self.find(needle) {
                let line = self.available()[..idx].to_vec();
                self.pos += idx + needle.len();
                return Ok(line);
            }
            if self.available().len() > max {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "delimiter not found within limit"));
            }
            if self.fill().await? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended before delimiter"));
            }
        }
    }

    /// Reads exactly `n` bytes, consuming any previously buffered bytes
    /// first. Used for fixed-length bodies once headers are parsed.
    pub async fn read_exact(&mut self, n: usize) -> io::Result<Vec<u8>> {
        while self.available().len() < n {
            if self.fill().await? == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended before body was complete"));
            }
        }
        let data = self.available()[..n].to_vec();
        self.pos += n;
        Ok(data)
    }

    /// True once at least one byte is buffered and unconsumed, without
    /// performing a read — used by callers that want to know whether a
    /// delimiter search can proceed without blocking.
    pub fn has_buffered(&self) -> bool {
        !self.available().is_empty()
    }

    /// Copies whatever is already buffered into `buf` first, only
    /// reading from the stream if the buffer is empty. Used for
    /// unknown-length body copies (proxy passthrough) once a header
    /// parser has left some of the body already buffered from the same
    /// read that found the blank line.
    pub async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.available().is_empty() && self.fill().await? == 0 {
            return Ok(0);
        }
        let n = self.available().len().min(buf.len());
        buf[..n].copy_from_slice(&self.available()[..n]);
        self.pos += n;
        Ok(n)
    }

    pub fn into_inner(self) -> AsyncIo<S> {
        self.io
    }
}
