//! Byte-stream capability traits shared by every connection-shaped resource
//! in the server: TCP sockets, TLS sessions, CGI/FastCGI pipes, upstream
//! proxy connections. Everything above this layer programs against `Read`
//! and `Write` rather than against `mio::net::TcpStream` directly, so the
//! same handler code drives a plaintext or TLS-wrapped connection.

mod async_io;
mod buffered;
mod limit;
mod take_while;

pub use async_io::{write_all as async_write_all, AsyncIo};
pub use buffered::AsyncBufReader;
pub use limit::Limit;
pub use take_while::TakeWhile;

use std::io::{self, Read, Write};

/// Type-erased byte stream, used where a handler needs to hold either a
/// plain `TcpStream` or a TLS session behind one field.
pub trait AnyStream: Read + Write + Send {}
impl<T: Read + Write + Send + ?Sized> AnyStream for T {}

/// The write-side half of §4.K step 5's "flushes and half-closes write" —
/// implemented once for a plain `TcpStream` and once for
/// [`crate::tls::TlsHalf`] so the connection driver can finish either kind
/// of connection through the same call.
pub trait HalfClose {
    fn shutdown_write(&mut self);
}

impl HalfClose for mio::net::TcpStream {
    fn shutdown_write(&mut self) {
        let _ = self.shutdown(std::net::Shutdown::Write);
    }
}

/// Writes the whole buffer, looping over short writes and retrying on
/// `Interrupted`. Mirrors `std::io::Write::write_all` but is kept as a free
/// function so callers working through a `dyn Write` don't need the trait
/// in scope.
pub fn write_all<W: Write + ?Sized>(w: &mut W, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match w.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads until `buf` is full or the stream reports EOF, returning the
/// number of bytes actually read (which may be less than `buf.len()` on
/// EOF instead of erroring, unlike `Read::read_exact`).
pub fn read_all<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut read = 0;
    while read < buf.len() {
        match r.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(read)
}

/// Test-only helper: a connected socket pair pre-loaded with `bytes`, used
/// wherever a unit test needs a real `Source + AsRawFd` stream to build an
/// [`AsyncIo`]/[`AsyncBufReader`] over without standing up a TCP listener.
/// Since the bytes are already buffered in the kernel before the reader
/// ever polls, every read this drives completes immediately and never
/// actually touches the reactor.
#[cfg(test)]
pub fn test_stream_with(bytes: &[u8]) -> AsyncIo<mio::net::UnixStream> {
    use std::io::Write as _;
    use std::net::Shutdown;
    let (a, mut b) = mio::net::UnixStream::pair().expect("socketpair");
    b.write_all(bytes).expect("prime test socket");
    b.shutdown(Shutdown::Write).expect("shutdown test socket");
    AsyncIo::new(a)
}
