use std::io::{self, Read};

/// Caps how many bytes can be read from the inner stream, returning a
/// `413`-worthy error (via the caller checking `limit_exceeded`) instead of
/// silently truncating. Used by the request body reader to enforce
/// `client_max_body_size` uniformly for both `Content-Length`-declared and
/// chunked bodies.
pub struct Limit<R> {
    inner: R,
    remaining: u64,
    exceeded: bool,
}

impl<R> Limit<R> {
    pub fn new(inner: R, max: u64) -> Self {
        Self {
            inner,
            remaining: max,
            exceeded: false,
        }
    }

    pub fn limit_exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for Limit<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            let n = self.inner.read(buf)?;
            if n > 0 {
                self.exceeded = true;
            }
            return Ok(0);
        }

        let max = (self.remaining.min(buf.len() as u64)) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        self.remaining -= n as u64;
        Ok(n)
    }
}
