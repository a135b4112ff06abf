use std::io::{self, Read};

/// Reads from `inner` only while `pred` accepts each byte, one at a time.
/// Used by the header parser to stop exactly at a delimiter without
/// over-reading into the body that follows it in the same buffered stream.
pub struct TakeWhile<'a, R, P> {
    inner: &'a mut R,
    pred: P,
    done: bool,
}

impl<'a, R, P> TakeWhile<'a, R, P>
where
    P: FnMut(u8) -> bool,
{
    pub fn new(inner: &'a mut R, pred: P) -> Self {
        Self {
            inner,
            pred,
            done: false,
        }
    }
}

impl<'a, R: Read, P> Read for TakeWhile<'a, R, P>
where
    P: FnMut(u8) -> bool,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let mut one = [0u8; 1];
        let n = self.inner.read(&mut one)?;
        if n == 0 {
            self.done = true;
            return Ok(0);
        }
        if !(self.pred)(one[0]) {
            self.done = true;
            return Ok(0);
        }
        buf[0] = one[0];
        Ok(1)
    }
}
