use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

struct Deadline {
    at: Instant,
    waker: Waker,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}
impl Eq for Deadline {}
impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.at.cmp(&other.at)
    }
}

/// Deadline-sorted wait list merged into the reactor's poll timeout.
/// Backs request-read timeouts, CGI/upstream timeouts, and the
/// process-exit poll interval.
#[derive(Default)]
pub struct TimerWheel {
    deadlines: RefCell<BinaryHeap<Reverse<Deadline>>>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, at: Instant, waker: Waker) {
        self.deadlines.borrow_mut().push(Reverse(Deadline { at, waker }));
    }

    /// How long the reactor should block before the next deadline fires,
    /// or `None` if there are none scheduled.
    pub fn next_timeout(&self) -> Option<Duration> {
        let heap = self.deadlines.borrow();
        heap.peek().map(|Reverse(d)| d.at.saturating_duration_since(Instant::now()))
    }

    /// Wakes and removes every deadline that has passed.
    pub fn fire_expired(&self) {
        let now = Instant::now();
        let mut heap = self.deadlines.borrow_mut();
        while let Some(Reverse(d)) = heap.peek() {
            if d.at > now {
                break;
            }
            let Reverse(d) = heap.pop().unwrap();
            d.waker.wake();
        }
    }
}

pub struct Sleep {
    at: Instant,
    registered: bool,
}

pub fn sleep_until(at: Instant) -> Sleep {
    Sleep { at, registered: false }
}

pub fn sleep(dur: Duration) -> Sleep {
    sleep_until(Instant::now() + dur)
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if Instant::now() >= self.at {
            return Poll::Ready(());
        }
        if !self.registered {
            crate::rt::executor::with_timer(|t| t.register(self.at, cx.waker().clone()));
            self.registered = true;
        }
        Poll::Pending
    }
}
