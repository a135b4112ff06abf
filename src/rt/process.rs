use std::future::Future;
use std::pin::Pin;
use std::process::{Child, ExitStatus};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// How often a pending `wait_pid` re-checks `try_wait`. There is no SIGCHLD
/// self-pipe in this runtime; children are reaped the same way the static
/// and CGI handlers already polled them, just formalized as a future
/// instead of being threaded through a connection's event dispatch by hand.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct WaitPid<'a> {
    child: &'a mut Child,
    next_poll: Option<Instant>,
}

pub fn wait_pid(child: &mut Child) -> WaitPid<'_> {
    WaitPid { child, next_poll: None }
}

impl<'a> Future for WaitPid<'a> {
    type Output = std::io::Result<ExitStatus>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(at) = this.next_poll {
            if Instant::now() < at {
                crate::rt::executor::with_timer(|t| t.register(at, cx.waker().clone()));
                return Poll::Pending;
            }
        }

        match this.child.try_wait() {
            Ok(Some(status)) => Poll::Ready(Ok(status)),
            Ok(None) => {
                let at = Instant::now() + POLL_INTERVAL;
                this.next_poll = Some(at);
                crate::rt::executor::with_timer(|t| t.register(at, cx.waker().clone()));
                Poll::Pending
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}
