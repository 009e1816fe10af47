//! Single-shot asynchronous results.
//!
//! A [`Resolver`] settles exactly once; the paired [`AsyncResult`] is
//! consumed by one of its continuation methods, by [`AsyncResult::wait`] or
//! by `.await`. Continuations always run on the engine thread.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use crate::engine::Executor;
use crate::errors::HuddleError;

static UNHANDLED_FAILURES: AtomicUsize = AtomicUsize::new(0);

/// Failures that were settled but never observed by any consumer.
pub fn unhandled_failure_count() -> usize {
    UNHANDLED_FAILURES.load(Ordering::Relaxed)
}

type Continuation<T> = Box<dyn FnOnce(Result<T, HuddleError>) + Send + 'static>;

struct Slot<T> {
    outcome: Option<Result<T, HuddleError>>,
    settled: bool,
    continuation: Option<Continuation<T>>,
    waker: Option<Waker>,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
    executor: Executor,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(Err(error)) = slot.outcome.take() {
            UNHANDLED_FAILURES.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(%error, "async failure was never handled");
        }
    }
}

pub(crate) fn pair<T: Send + 'static>(executor: Executor) -> (Resolver<T>, AsyncResult<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            outcome: None,
            settled: false,
            continuation: None,
            waker: None,
        }),
        ready: Condvar::new(),
        executor,
    });
    (
        Resolver {
            shared: shared.clone(),
        },
        AsyncResult { shared },
    )
}

/// Producer side of an [`AsyncResult`].
///
/// Dropping it unsettled fails the result with "operation abandoned".
pub struct Resolver<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Resolver<T> {
    pub fn resolve(&self, value: T) -> Result<(), HuddleError> {
        self.settle(Ok(value))
    }

    pub fn fail(&self, error: HuddleError) -> Result<(), HuddleError> {
        self.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.shared.lock().settled
    }

    pub fn settle(&self, outcome: Result<T, HuddleError>) -> Result<(), HuddleError> {
        let mut slot = self.shared.lock();
        if slot.settled {
            drop(slot);
            tracing::error!("async result settled twice, keeping the first outcome");
            return Err(HuddleError::AlreadySettled);
        }
        slot.settled = true;

        if let Some(continuation) = slot.continuation.take() {
            drop(slot);
            if !self.shared.executor.post(move || continuation(outcome)) {
                tracing::warn!("engine stopped, continuation dropped");
            }
            return Ok(());
        }

        slot.outcome = Some(outcome);
        let waker = slot.waker.take();
        drop(slot);
        self.shared.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }
}

impl<T: Send + 'static> Drop for Resolver<T> {
    fn drop(&mut self) {
        if !self.is_settled() {
            let _ = self.fail(HuddleError::backend("operation abandoned"));
        }
    }
}

/// Consumer side of a single-shot operation.
#[must_use = "an AsyncResult must be consumed, or failures are reported as unhandled"]
pub struct AsyncResult<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> AsyncResult<T> {
    /// Run `f` on the engine with the outcome, whichever it is.
    pub fn on_complete<F>(self, f: F)
    where
        F: FnOnce(Result<T, HuddleError>) + Send + 'static,
    {
        let mut slot = self.shared.lock();
        match slot.outcome.take() {
            Some(outcome) => {
                drop(slot);
                if !self.shared.executor.post(move || f(outcome)) {
                    tracing::warn!("engine stopped, continuation dropped");
                }
            }
            None => slot.continuation = Some(Box::new(f)),
        }
    }

    pub fn then<U, F>(self, f: F) -> AsyncResult<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let (resolver, next) = self.shared.executor.create::<U>();
        self.on_complete(move |outcome| {
            let _ = resolver.settle(outcome.map(f));
        });
        next
    }

    /// Chain another asynchronous operation.
    pub fn and_then<U, F>(self, f: F) -> AsyncResult<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> AsyncResult<U> + Send + 'static,
    {
        let (resolver, next) = self.shared.executor.create::<U>();
        self.on_complete(move |outcome| match outcome {
            Ok(value) => f(value).on_complete(move |chained| {
                let _ = resolver.settle(chained);
            }),
            Err(error) => {
                let _ = resolver.fail(error);
            }
        });
        next
    }

    pub fn map_err<F>(self, f: F) -> AsyncResult<T>
    where
        F: FnOnce(HuddleError) -> HuddleError + Send + 'static,
    {
        let (resolver, next) = self.shared.executor.create::<T>();
        self.on_complete(move |outcome| {
            let _ = resolver.settle(outcome.map_err(f));
        });
        next
    }

    pub fn on_error<F>(self, f: F)
    where
        F: FnOnce(HuddleError) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Err(error) = outcome {
                f(error);
            }
        });
    }

    pub fn ignore_errors(self) {
        self.on_complete(|_| {});
    }

    /// Block until settled.
    ///
    /// # Panics
    ///
    /// When called on the engine thread, which would deadlock.
    pub fn wait(self) -> Result<T, HuddleError> {
        assert!(
            !Executor::is_engine_thread(),
            "AsyncResult::wait called on the engine thread"
        );
        let mut slot = self.shared.lock();
        loop {
            if let Some(outcome) = slot.outcome.take() {
                return outcome;
            }
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<T: Send + 'static> Future for AsyncResult<T> {
    type Output = Result<T, HuddleError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.lock();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
