use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Polls every future in `futs` under the same `Waker` each time any one of
/// them wakes it, returning once all have completed. This is the
/// structured-concurrency primitive handlers use to run their children
/// (CGI's stdin/stdout/stderr pumps, a proxy's two directions) without
/// spawning a separate executor task for each: a wakeup on any child's fd
/// re-polls the whole group, and already-finished children are simply
/// skipped.
pub struct JoinAll<F: Future<Output = ()>> {
    futs: Vec<Option<Pin<Box<F>>>>,
}

pub fn join_all<F: Future<Output = ()>>(futs: Vec<F>) -> JoinAll<F> {
    JoinAll {
        futs: futs.into_iter().map(|f| Some(Box::pin(f))).collect(),
    }
}

impl<F: Future<Output = ()>> Future for JoinAll<F> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = unsafe { self.get_unchecked_mut() };
        let mut all_done = true;
        for slot in this.futs.iter_mut() {
            if let Some(fut) = slot {
                if fut.as_mut().poll(cx).is_ready() {
                    *slot = None;
                } else {
                    all_done = false;
                }
            }
        }
        if all_done {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

macro_rules! join_n {
    ($name:ident, $($fut:ident => $out:ident),+) => {
        pub struct $name<$($fut: Future),+> {
            $($fut: Pin<Box<$fut>>,)+
            $($out: Option<$fut::Output>,)+
        }

        pub fn $name<$($fut: Future),+>($($fut: $fut),+) -> $name<$($fut),+> {
            $name {
                $($fut: Box::pin($fut),)+
                $($out: None,)+
            }
        }

        impl<$($fut: Future),+> Future for $name<$($fut),+> {
            type Output = ($($fut::Output),+);

            fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
                let this = unsafe { self.get_unchecked_mut() };
                $(
                    if this.$out.is_none() {
                        if let Poll::Ready(v) = this.$fut.as_mut().poll(cx) {
                            this.$out = Some(v);
                        }
                    }
                )+
                if $(this.$out.is_some())&&+ {
                    Poll::Ready(($(this.$out.take().unwrap()),+))
                } else {
                    Poll::Pending
                }
            }
        }
    };
}

join_n!(join2, a => oa, b => ob);
join_n!(join3, a => oa, b => ob, c => oc);

/// Resolves with whichever of `a`/`b` becomes ready first; the other is
/// dropped (cancelled). Used to race a request parse against a read
/// timeout (§4.K step 2) without a dedicated per-connection timer task.
pub enum Either<A, B> {
    Left(A),
    Right(B),
}

pub struct Race2<A: Future, B: Future> {
    a: Pin<Box<A>>,
    b: Pin<Box<B>>,
}

pub fn race2<A: Future, B: Future>(a: A, b: B) -> Race2<A, B> {
    Race2 { a: Box::pin(a), b: Box::pin(b) }
}

impl<A: Future, B: Future> Future for Race2<A, B> {
    type Output = Either<A::Output, B::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = unsafe { self.get_unchecked_mut() };
        if let Poll::Ready(v) = this.a.as_mut().poll(cx) {
            return Poll::Ready(Either::Left(v));
        }
        if let Poll::Ready(v) = this.b.as_mut().poll(cx) {
            return Poll::Ready(Either::Right(v));
        }
        Poll::Pending
    }
}
