use std::future::Future;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};

use mio::event::Source;

use crate::rt::{Direction, Reactor};

/// Drives a non-blocking `mio` stream (or anything `Read + Write + Source +
/// AsRawFd`, which covers `mio::net::TcpStream`, `mio::net::UnixStream`,
/// and a rustls session wrapped the same way) through the shared reactor.
/// This is the bridge between the teacher's direct, `mio`-Token-keyed
/// `poll.registry().reregister` calls in `http_connection.rs`/`cgi.rs` and
/// the coroutine model: every handler awaits `read`/`write` the same way
/// regardless of what kind of fd backs the connection.
pub struct AsyncIo<S> {
    stream: S,
}

impl<S: Read + Write + Source + AsRawFd> AsyncIo<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    pub fn read<'a>(&'a mut self, buf: &'a mut [u8]) -> ReadFut<'a, S> {
        ReadFut { io: self, buf }
    }

    pub fn write<'a>(&'a mut self, buf: &'a [u8]) -> WriteFut<'a, S> {
        WriteFut { io: self, buf }
    }

    fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

pub struct ReadFut<'a, S> {
    io: &'a mut AsyncIo<S>,
    buf: &'a mut [u8],
}

impl<'a, S: Read + Write + Source + AsRawFd> Future for ReadFut<'a, S> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match this.io.stream.read(this.buf) {
            Ok(n) => Poll::Ready(Ok(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let fd = this.io.fd();
                let reg = crate::rt::executor::with_reactor(|r| {
                    r.register(&mut this.io.stream, fd, Direction::Read, cx.waker().clone())
                });
                match reg {
                    Ok(()) | Err(crate::rt::ReactorError::Busy) => Poll::Pending,
                    Err(crate::rt::ReactorError::Io(e)) => Poll::Ready(Err(e)),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

pub struct WriteFut<'a, S> {
    io: &'a mut AsyncIo<S>,
    buf: &'a [u8],
}

impl<'a, S: Read + Write + Source + AsRawFd> Future for WriteFut<'a, S> {
    type Output = io::Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match this.io.stream.write(this.buf) {
            Ok(n) => Poll::Ready(Ok(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let fd = this.io.fd();
                let reg = crate::rt::executor::with_reactor(|r| {
                    r.register(&mut this.io.stream, fd, Direction::Write, cx.waker().clone())
                });
                match reg {
                    Ok(()) | Err(crate::rt::ReactorError::Busy) => Poll::Pending,
                    Err(crate::rt::ReactorError::Io(e)) => Poll::Ready(Err(e)),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                cx.waker().wake_by_ref();
                Poll::Pending
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

/// Writes the whole buffer, looping over short writes the way
/// [`super::write_all`] does for synchronous streams.
pub async fn write_all<S: Read + Write + Source + AsRawFd>(
    io: &mut AsyncIo<S>,
    mut buf: &[u8],
) -> io::Result<()> {
    while !buf.is_empty() {
        let n = io.write(buf).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "failed to write whole buffer"));
        }
        buf = &buf[n..];
    }
    Ok(())
}
