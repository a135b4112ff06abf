use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Wake, Waker};

use crate::rt::reactor::Reactor;
use crate::rt::timer::TimerWheel;

type TaskId = u64;
type BoxFuture = Pin<Box<dyn Future<Output = ()>>>;

struct TaskWaker {
    id: TaskId,
    ready: Arc<Mutex<VecDeque<TaskId>>>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let mut q = self.ready.lock().unwrap();
        if !q.contains(&self.id) {
            q.push_back(self.id);
        }
    }
}

struct Inner {
    reactor: Reactor,
    timer: TimerWheel,
    tasks: RefCell<HashMap<TaskId, BoxFuture>>,
    ready: Arc<Mutex<VecDeque<TaskId>>>,
    next_id: RefCell<TaskId>,
}

thread_local! {
    static RT: RefCell<Option<Inner>> = RefCell::new(None);
}

fn with_inner<R>(f: impl FnOnce(&Inner) -> R) -> R {
    RT.with(|rt| {
        let borrow = rt.borrow();
        let inner = borrow.as_ref().expect("rt used outside block_on");
        f(inner)
    })
}

pub fn with_reactor<R>(f: impl FnOnce(&Reactor) -> R) -> R {
    with_inner(|i| f(&i.reactor))
}

pub fn with_timer<R>(f: impl FnOnce(&TimerWheel) -> R) -> R {
    with_inner(|i| f(&i.timer))
}

/// Spawns a future as an independent task polled by the executor's ready
/// queue — used for one task per accepted connection. Intra-request
/// concurrency (CGI's pipes, a proxy's two directions) should use
/// [`crate::rt::join`] instead: those share the parent task's waker rather
/// than paying for their own entry here.
pub fn spawn(fut: impl Future<Output = ()> + 'static) {
    with_inner(|inner| {
        let id = {
            let mut n = inner.next_id.borrow_mut();
            let id = *n;
            *n += 1;
            id
        };
        inner.tasks.borrow_mut().insert(id, Box::pin(fut));
        inner.ready.lock().unwrap().push_back(id);
    });
}

fn waker_for(id: TaskId, ready: Arc<Mutex<VecDeque<TaskId>>>) -> Waker {
    Waker::from(Arc::new(TaskWaker { id, ready }))
}

/// Drives `main` to completion, which for this server means the process's
/// lifetime: `Server::run` never actually resolves under normal operation,
/// since its accept loop runs forever, but `block_on` itself is oblivious
/// to that — it is just a loop pumping the ready queue and the reactor.
pub fn block_on<F: Future<Output = T>, T>(main: F) -> io::Result<T> {
    RT.with(|rt| {
        *rt.borrow_mut() = Some(Inner {
            reactor: Reactor::new()?,
            timer: TimerWheel::new(),
            tasks: RefCell::new(HashMap::new()),
            ready: Arc::new(Mutex::new(VecDeque::new())),
            next_id: RefCell::new(1),
        });
        Ok(())
    })?;

    const MAIN_ID: TaskId = 0;
    let ready = with_inner(|i| i.ready.clone());
    ready.lock().unwrap().push_back(MAIN_ID);

    let mut main = Box::pin(main);
    let mut output = None;

    loop {
        let batch: Vec<TaskId> = {
            let mut q = ready.lock().unwrap();
            q.drain(..).collect()
        };

        if batch.is_empty() {
            with_inner(|i| i.timer.fire_expired());
            let timeout = with_inner(|i| i.timer.next_timeout());
            with_inner(|i| i.reactor.turn(timeout))?;
            continue;
        }

        for id in batch {
            let waker = waker_for(id, ready.clone());
            let mut cx = Context::from_waker(&waker);

            if id == MAIN_ID {
                if let std::task::Poll::Ready(v) = main.as_mut().poll(&mut cx) {
                    output = Some(v);
                }
                continue;
            }

            let fut = with_inner(|i| i.tasks.borrow_mut().remove(&id));
            let Some(mut fut) = fut else { continue };
            match fut.as_mut().poll(&mut cx) {
                std::task::Poll::Ready(()) => {}
                std::task::Poll::Pending => {
                    with_inner(|i| i.tasks.borrow_mut().insert(id, fut));
                }
            }
        }

        if let Some(v) = output {
            return Ok(v);
        }
    }
}
