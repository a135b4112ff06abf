use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

struct MutexState<T> {
    locked: bool,
    value: Option<T>,
    waiters: VecDeque<Waker>,
}

/// A mutex for single-threaded cooperative tasks, with FIFO handoff:
/// the longest-waiting `lock().await` is the next to receive ownership
/// when the current holder drops its guard. Backs the FastCGI client
/// connection's serialized outbound writes (one writer at a time across
/// however many requests are multiplexed onto the connection).
pub struct AsyncMutex<T> {
    state: Rc<RefCell<MutexState<T>>>,
}

impl<T> Clone for AsyncMutex<T> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<T> AsyncMutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(MutexState {
                locked: false,
                value: Some(value),
                waiters: VecDeque::new(),
            })),
        }
    }

    pub fn lock(&self) -> Lock<'_, T> {
        Lock { mutex: self, registered: false }
    }
}

pub struct Lock<'a, T> {
    mutex: &'a AsyncMutex<T>,
    registered: bool,
}

impl<'a, T> Future for Lock<'a, T> {
    type Output = AsyncMutexGuard<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.mutex.state.borrow_mut();

        // Only the front waiter (if any are queued) is allowed to take the
        // lock, so first-come-first-served holds even under contention.
        let is_front = state.waiters.front().map(|w| w.will_wake(cx.waker())).unwrap_or(true);

        if !state.locked && is_front {
            if !state.waiters.is_empty() {
                state.waiters.pop_front();
            }
            state.locked = true;
            let value = state.value.take().expect("mutex poisoned");
            return Poll::Ready(AsyncMutexGuard {
                mutex: self.mutex.clone(),
                value: Some(value),
            });
        }

        if self.registered {
            if let Some(w) = state.waiters.iter_mut().find(|w| w.will_wake(cx.waker())) {
                *w = cx.waker().clone();
            } else {
                state.waiters.push_back(cx.waker().clone());
            }
        } else {
            state.waiters.push_back(cx.waker().clone());
            self.registered = true;
        }
        Poll::Pending
    }
}

pub struct AsyncMutexGuard<T> {
    mutex: AsyncMutex<T>,
    value: Option<T>,
}

impl<T> Deref for AsyncMutexGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value.as_ref().unwrap()
    }
}

impl<T> DerefMut for AsyncMutexGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap()
    }
}

impl<T> Drop for AsyncMutexGuard<T> {
    fn drop(&mut self) {
        let mut state = self.mutex.state.borrow_mut();
        state.value = self.value.take();
        state.locked = false;
        if let Some(w) = state.waiters.front() {
            w.wake_by_ref();
        }
    }
}

/// A condition variable paired with an `AsyncMutex`, used by the FastCGI
/// client's reader task to signal the specific request waiting on a given
/// response once its `END_REQUEST` record arrives.
#[derive(Clone)]
pub struct AsyncCondvar {
    waiters: Rc<RefCell<VecDeque<Waker>>>,
}

impl Default for AsyncCondvar {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncCondvar {
    pub fn new() -> Self {
        Self { waiters: Rc::new(RefCell::new(VecDeque::new())) }
    }

    pub fn notify_one(&self) {
        if let Some(w) = self.waiters.borrow_mut().pop_front() {
            w.wake();
        }
    }

    pub fn notify_all(&self) {
        for w in self.waiters.borrow_mut().drain(..) {
            w.wake();
        }
    }

    /// Registers interest and returns; callers re-check their own
    /// condition after being woken (standard condvar usage — a wakeup is
    /// not a guarantee the condition holds).
    pub fn wait(&self) -> CondvarWait<'_> {
        CondvarWait { cv: self, registered: false }
    }
}

pub struct CondvarWait<'a> {
    cv: &'a AsyncCondvar,
    registered: bool,
}

impl<'a> Future for CondvarWait<'a> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.registered {
            return Poll::Ready(());
        }
        self.cv.waiters.borrow_mut().push_back(cx.waker().clone());
        self.registered = true;
        Poll::Pending
    }
}
