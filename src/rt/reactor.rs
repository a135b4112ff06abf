use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::task::Waker;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Token};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug)]
pub enum ReactorError {
    /// A second `register` landed on the same `(fd, direction)` while the
    /// first registration was still pending. Two readers racing on one
    /// socket's read side is a programming error, not a runtime condition
    /// to recover from.
    Busy,
    Io(io::Error),
}

impl From<io::Error> for ReactorError {
    fn from(e: io::Error) -> Self {
        ReactorError::Io(e)
    }
}

impl std::fmt::Display for ReactorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReactorError::Busy => write!(f, "fd already has a pending waiter for this direction"),
            ReactorError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ReactorError {}

fn token_for(fd: RawFd, dir: Direction) -> Token {
    let bit = match dir {
        Direction::Read => 0,
        Direction::Write => 1,
    };
    Token(((fd as usize) << 1) | bit)
}

/// Keys waiters by `(RawFd, Direction)` rather than by `mio::Token` alone,
/// so unrelated resources never need to coordinate token allocation — the
/// fd itself (doubled for read/write) is the token.
pub struct Reactor {
    poll: RefCell<Poll>,
    waiters: RefCell<HashMap<Token, Waker>>,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: RefCell::new(Poll::new()?),
            waiters: RefCell::new(HashMap::new()),
        })
    }

    pub fn registry_do<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mio::Registry) -> R,
    {
        f(self.poll.borrow().registry())
    }

    /// Registers interest for `dir` on `fd`, backed by `source`. Waking the
    /// returned waiter is a one-shot: the caller must re-register after
    /// each wakeup if it still wants to wait (level-triggered semantics,
    /// resolved at most once per `register` call).
    pub fn register(
        &self,
        source: &mut impl Source,
        fd: RawFd,
        dir: Direction,
        waker: Waker,
    ) -> Result<(), ReactorError> {
        let token = token_for(fd, dir);
        let interest = match dir {
            Direction::Read => Interest::READABLE,
            Direction::Write => Interest::WRITABLE,
        };

        let mut waiters = self.waiters.borrow_mut();
        if waiters.contains_key(&token) {
            return Err(ReactorError::Busy);
        }

        let poll = self.poll.borrow();
        if poll.registry().register(source, token, interest).is_err() {
            poll.registry().reregister(source, token, interest)?;
        }
        waiters.insert(token, waker);
        Ok(())
    }

    /// Drops a pending waiter without waking it — used when a future is
    /// cancelled (dropped) before its I/O became ready.
    pub fn deregister(&self, fd: RawFd, dir: Direction) {
        self.waiters.borrow_mut().remove(&token_for(fd, dir));
    }

    /// Blocks for at most `timeout`, waking every waiter whose fd/direction
    /// came back ready. Returns once `mio::Poll::poll` returns, even if no
    /// event fired (e.g. the timeout elapsed) — callers loop on their own
    /// condition, this never decides for them.
    pub fn turn(&self, timeout: Option<Duration>) -> io::Result<()> {
        let mut events = Events::with_capacity(256);
        self.poll.borrow_mut().poll(&mut events, timeout)?;

        let mut waiters = self.waiters.borrow_mut();
        for event in events.iter() {
            let token = event.token();
            // An error or hang-up is ambiguous as to which direction failed,
            // so per §4.B both directions resolve rather than leaving one
            // waiter stranded on a dead fd.
            let both = event.is_error() || event.is_read_closed() || event.is_write_closed();
            if event.is_readable() || both {
                if let Some(w) = waiters.remove(&Token(token.0 & !1)) {
                    w.wake();
                }
            }
            if event.is_writable() || both {
                if let Some(w) = waiters.remove(&Token(token.0 | 1)) {
                    w.wake();
                }
            }
        }
        Ok(())
    }

    pub fn has_waiters(&self) -> bool {
        !self.waiters.borrow().is_empty()
    }
}
