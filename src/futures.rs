// Mutex poisoning indicates a panic in another thread - a critical error.
// The expect() calls on lock() in this module are intentional.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

/// Outcome a promise settles with. Rejections carry only a message; the
/// richer failure taxonomy lives outside the scheduler.
pub type Settled<T> = Result<T, String>;

enum PromiseState<T> {
    Pending { wakers: Vec<Waker> },
    Settled(Settled<T>),
}

struct Shared<T> {
    state: PromiseState<T>,
}

/// A one-shot future settled explicitly through its [`PromiseResolver`].
///
/// Promises are `Clone`: any number of continuations may attach, and each
/// polls out a clone of the settled outcome. Continuations attached to the
/// same promise are woken in attachment order when it settles.
pub struct Promise<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// The settle side of a [`Promise`]. Settling twice is a no-op.
pub struct PromiseResolver<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Promise<T> {
    /// A pending promise together with its resolver.
    pub fn pair() -> (Promise<T>, PromiseResolver<T>) {
        let shared = Arc::new(Mutex::new(Shared {
            state: PromiseState::Pending { wakers: Vec::new() },
        }));
        (
            Promise {
                shared: shared.clone(),
            },
            PromiseResolver { shared },
        )
    }

    /// An already-resolved promise.
    pub fn resolved(value: T) -> Promise<T> {
        Promise {
            shared: Arc::new(Mutex::new(Shared {
                state: PromiseState::Settled(Ok(value)),
            })),
        }
    }

    /// An already-rejected promise.
    pub fn rejected(error: impl Into<String>) -> Promise<T> {
        Promise {
            shared: Arc::new(Mutex::new(Shared {
                state: PromiseState::Settled(Err(error.into())),
            })),
        }
    }

    fn poll_settled(&self, cx: &mut Context<'_>) -> Poll<Settled<T>>
    where
        T: Clone,
    {
        let mut shared = self.shared.lock().expect("promise state poisoned");
        match &mut shared.state {
            PromiseState::Settled(outcome) => Poll::Ready(outcome.clone()),
            PromiseState::Pending { wakers } => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl<T: Clone> Future for Promise<T> {
    type Output = Settled<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.poll_settled(cx)
    }
}

impl<T> PromiseResolver<T> {
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(&self, error: impl Into<String>) {
        self.settle(Err(error.into()));
    }

    fn settle(&self, outcome: Settled<T>) {
        let wakers = {
            let mut shared = self.shared.lock().expect("promise state poisoned");
            match &mut shared.state {
                PromiseState::Settled(_) => return,
                PromiseState::Pending { wakers } => {
                    let wakers = std::mem::take(wakers);
                    shared.state = PromiseState::Settled(outcome);
                    wakers
                }
            }
        };
        // Wake outside the lock, in attachment order.
        for waker in wakers {
            waker.wake();
        }
    }
}

/// Waits for every promise to resolve, yielding values in input order.
/// Rejects eagerly with the first rejection observed.
pub fn all<T: Clone>(promises: Vec<Promise<T>>) -> All<T> {
    let results = vec![None; promises.len()];
    All { promises, results }
}

pub struct All<T> {
    promises: Vec<Promise<T>>,
    results: Vec<Option<T>>,
}

impl<T> Unpin for All<T> {}

impl<T: Clone> Future for All<T> {
    type Output = Settled<Vec<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        for (i, promise) in this.promises.iter().enumerate() {
            if this.results[i].is_some() {
                continue;
            }
            match promise.poll_settled(cx) {
                Poll::Ready(Ok(value)) => this.results[i] = Some(value),
                Poll::Ready(Err(error)) => return Poll::Ready(Err(error)),
                Poll::Pending => {}
            }
        }
        if this.results.iter().all(|r| r.is_some()) {
            let values = this
                .results
                .iter_mut()
                .map(|r| r.take().expect("all results settled"))
                .collect();
            Poll::Ready(Ok(values))
        } else {
            Poll::Pending
        }
    }
}

/// Settles with the first promise to settle, success or failure. On a tie
/// the lowest index wins. Losers are not cancelled; they stay resolvable.
pub fn race<T: Clone>(promises: Vec<Promise<T>>) -> Race<T> {
    Race { promises }
}

pub struct Race<T> {
    promises: Vec<Promise<T>>,
}

impl<T: Clone> Future for Race<T> {
    type Output = Settled<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        for promise in &self.promises {
            if let Poll::Ready(outcome) = promise.poll_settled(cx) {
                return Poll::Ready(outcome);
            }
        }
        Poll::Pending
    }
}
