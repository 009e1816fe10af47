//! The single execution context.
//!
//! Every continuation, event dispatch and conference/device state transition
//! runs on one dedicated thread. Other threads only enqueue work.

use std::cell::Cell;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::{Mutex, mpsc};

use crate::async_result::{AsyncResult, Resolver};
use crate::errors::HuddleError;

const ENGINE_THREAD_NAME: &str = "huddle-engine";

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

thread_local! {
    static ON_ENGINE: Cell<bool> = const { Cell::new(false) };
}

/// Cloneable handle used to marshal work onto the engine thread.
#[derive(Clone)]
pub struct Executor {
    tx: mpsc::UnboundedSender<Message>,
}

impl Executor {
    /// Queue a job. Returns `false` once the engine has stopped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(Message::Run(Box::new(job))).is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether the caller runs on the engine thread.
    pub fn is_engine_thread() -> bool {
        ON_ENGINE.with(|flag| flag.get())
    }

    pub fn create<T: Send + 'static>(&self) -> (Resolver<T>, AsyncResult<T>) {
        crate::async_result::pair(self.clone())
    }

    pub fn ready<T: Send + 'static>(&self, value: T) -> AsyncResult<T> {
        let (resolver, result) = self.create();
        let _ = resolver.resolve(value);
        result
    }

    pub fn failed<T: Send + 'static>(&self, error: HuddleError) -> AsyncResult<T> {
        let (resolver, result) = self.create();
        let _ = resolver.fail(error);
        result
    }

    /// Run `f` on the engine and settle the result with its return value.
    pub fn submit<T, F>(&self, f: F) -> AsyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, HuddleError> + Send + 'static,
    {
        if self.is_stopped() {
            return self.failed(HuddleError::EngineStopped);
        }
        let (resolver, result) = self.create();
        self.post(move || {
            let _ = resolver.settle(f());
        });
        result
    }

    /// Drive `future` on the engine runtime and settle the result with its
    /// output.
    pub fn spawn<T, F>(&self, future: F) -> AsyncResult<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, HuddleError>> + Send + 'static,
    {
        if self.is_stopped() {
            return self.failed(HuddleError::EngineStopped);
        }
        let (resolver, result) = self.create();
        self.post(move || {
            tokio::spawn(async move {
                let _ = resolver.settle(future.await);
            });
        });
        result
    }
}

/// Runs the operations of one service one at a time, in call order.
///
/// Each operation holds the turn across all of its awaits, so a second
/// operation only starts once the first has settled. Pushes from the
/// backend do not take a turn.
#[derive(Clone)]
pub(crate) struct SerialQueue {
    executor: Executor,
    turn: Arc<Mutex<()>>,
}

impl SerialQueue {
    pub fn new(executor: Executor) -> Self {
        Self {
            executor,
            turn: Arc::new(Mutex::new(())),
        }
    }

    pub fn run<T, F>(&self, operation: F) -> AsyncResult<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, HuddleError>> + Send + 'static,
    {
        let turn = self.turn.clone();
        self.executor.spawn(async move {
            let _turn = turn.lock().await;
            operation.await
        })
    }
}

/// Owns the engine thread. Dropping it stops the thread.
pub struct Engine {
    executor: Executor,
    thread: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn start() -> Result<Self, HuddleError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| HuddleError::backend(format!("engine runtime: {e}")))?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let thread = std::thread::Builder::new()
            .name(ENGINE_THREAD_NAME.into())
            .spawn(move || {
                ON_ENGINE.with(|flag| flag.set(true));
                runtime.block_on(async move {
                    while let Some(message) = rx.recv().await {
                        match message {
                            Message::Run(job) => {
                                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                                    tracing::error!("engine job panicked");
                                }
                            }
                            Message::Shutdown => break,
                        }
                    }
                });
                tracing::debug!("engine loop exited");
            })
            .map_err(|e| HuddleError::backend(format!("engine thread: {e}")))?;

        tracing::info!(thread = ENGINE_THREAD_NAME, "engine started");
        Ok(Self {
            executor: Executor { tx },
            thread: Some(thread),
        })
    }

    pub fn executor(&self) -> Executor {
        self.executor.clone()
    }

    /// Stop the loop. Jobs still queued are dropped, which fails their
    /// pending results. Joins the thread unless called from it.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.executor.tx.send(Message::Shutdown);
        if Executor::is_engine_thread() {
            tracing::warn!("engine shut down from its own thread, not joining");
            return;
        }
        if thread.join().is_err() {
            tracing::error!("engine thread panicked");
        }
        tracing::info!("engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
