//! The request body stream adapter: wraps the connection's buffered
//! reader so a handler sees exactly `Content-Length` bytes, or the
//! chunk-decoded stream when `Transfer-Encoding: chunked` applies,
//! capped at `client_max_body_size` either way. Generalizes the static
//! handler's bounded file read (§4.F) and the teacher's
//! `total_body_read`/`body_remaining` counters in `HttpConnection` into
//! one adapter every backend (CGI, FastCGI, proxy) reads through.

use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

use mio::event::Source;

use crate::io::{async_write_all, AsyncBufReader, AsyncIo};

use super::message::HeaderMap;

enum State {
    /// No body: no `Content-Length`, not chunked (or 0-length).
    Empty,
    Fixed { remaining: u64 },
    Chunked { remaining_in_chunk: u64, seen_final: bool },
}

/// Reads a request (or, for CGI/proxy upstream framing, an arbitrary
/// message) body per the framing its headers declare. §8 invariant 2 (a
/// wire-accepted message round-trips byte for byte) and §3's
/// "exactly content-length bytes" invariant both rest on this never
/// over-reading into whatever follows on the wire — each `read` stops at
/// the chunk/content-length boundary even if more bytes are buffered.
pub struct BodyReader<'a, S> {
    reader: &'a mut AsyncBufReader<S>,
    state: State,
    max: u64,
    total_read: u64,
    exceeded: bool,
}

impl<'a, S: Read + Write + Source + AsRawFd> BodyReader<'a, S> {
    pub fn for_headers(reader: &'a mut AsyncBufReader<S>, headers: &HeaderMap, max: u64) -> Self {
        let state = if headers.is_chunked() {
            State::Chunked { remaining_in_chunk: 0, seen_final: false }
        } else {
            match headers.content_length() {
                Some(0) | None => State::Empty,
                Some(n) => State::Fixed { remaining: n as u64 },
            }
        };
        Self { reader, state, max, total_read: 0, exceeded: false }
    }

    /// True once more bytes were available than `client_max_body_size`
    /// allowed; the caller (the connection driver) raises `413` instead
    /// of trying to keep reading.
    pub fn limit_exceeded(&self) -> bool {
        self.exceeded
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.exceeded {
            return Ok(0);
        }
        let n = match &mut self.state {
            State::Empty => 0,
            State::Fixed { remaining } => {
                if *remaining == 0 {
                    0
                } else {
                    let want = (*remaining).min(buf.len() as u64) as usize;
                    let chunk = self.reader.read_exact(want).await?;
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    *remaining -= chunk.len() as u64;
                    chunk.len()
                }
            }
            State::Chunked { remaining_in_chunk, seen_final } => {
                if *seen_final {
                    0
                } else {
                    if *remaining_in_chunk == 0 {
                        let size_line = self.reader.read_until(b"\r\n", 64).await?;
                        let size_str = size_line
                            .iter()
                            .take_while(|&&b| b != b';')
                            .copied()
                            .collect::<Vec<u8>>();
                        let size = u64::from_str_radix(
                            std::str::from_utf8(&size_str)
                                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad chunk size"))?
                                .trim(),
                            16,
                        )
                        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad chunk size"))?;
                        if size == 0 {
                            // Trailers (if any) then the terminating CRLF.
                            loop {
                                let trailer = self.reader.read_until(b"\r\n", 4096).await?;
                                if trailer.is_empty() {
                                    break;
                                }
                            }
                            *seen_final = true;
                            0
                        } else {
                            *remaining_in_chunk = size;
                            let want = size.min(buf.len() as u64) as usize;
                            let data = self.reader.read_exact(want).await?;
                            *remaining_in_chunk -= data.len() as u64;
                            if *remaining_in_chunk == 0 {
                                let _ = self.reader.read_until(b"\r\n", 2).await?;
                            }
                            buf[..data.len()].copy_from_slice(&data);
                            data.len()
                        }
                    } else {
                        let want = (*remaining_in_chunk).min(buf.len() as u64) as usize;
                        let data = self.reader.read_exact(want).await?;
                        *remaining_in_chunk -= data.len() as u64;
                        if *remaining_in_chunk == 0 {
                            let _ = self.reader.read_until(b"\r\n", 2).await?;
                        }
                        buf[..data.len()].copy_from_slice(&data);
                        data.len()
                    }
                }
            }
        };

        self.total_read += n as u64;
        if self.total_read > self.max {
            self.exceeded = true;
            return Ok(0);
        }
        Ok(n)
    }

    /// Drains the whole body into one buffer. Used by handlers (CGI env
    /// synthesis doesn't need this, but the proxy and the `--check`-style
    /// small-body cases do) that don't stream.
    pub async fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        Ok(out)
    }
}

/// Writes one chunk of a `Transfer-Encoding: chunked` body — used by the
/// CGI and proxy handlers whenever the backend doesn't hand over a
/// `Content-Length` up front so the response has to stream out as it
/// arrives. A zero-length `data` writes nothing (the caller finishes the
/// stream with [`write_chunked_terminator`] instead).
pub async fn write_chunk<S: Read + Write + Source + AsRawFd>(
    io: &mut AsyncIo<S>,
    data: &[u8],
) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    async_write_all(io, format!("{:x}\r\n", data.len()).as_bytes()).await?;
    async_write_all(io, data).await?;
    async_write_all(io, b"\r\n").await
}

pub async fn write_chunked_terminator<S: Read + Write + Source + AsRawFd>(
    io: &mut AsyncIo<S>,
) -> io::Result<()> {
    async_write_all(io, b"0\r\n\r\n").await
}
