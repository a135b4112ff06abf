//! A small cooperative, single-threaded async runtime purpose-built for
//! this server: one OS thread, one `mio::Poll`, one ready queue. There is
//! no work-stealing and no cross-thread wakeups — every `Waker` produced
//! here only ever fires on the thread that created it.
//!
//! A connection accepted off a listener becomes one spawned task polled
//! independently by the executor. Inside a single request's handling,
//! concurrent pieces (CGI's three pipes, a proxy's two directions) are
//! ordinary nested futures combined with [`join::join3`] and friends —
//! they share their parent task's `Waker`, so spawning a fresh task per
//! sub-step would be wasted bookkeeping.

pub mod executor;
pub mod join;
pub mod process;
pub mod reactor;
pub mod sync;
pub mod timer;

pub use executor::{block_on, spawn};
pub use reactor::{Direction, Reactor, ReactorError};
pub use sync::{AsyncCondvar, AsyncMutex};
