//! Typed event handler registry.
//!
//! Handlers are keyed by the `TypeId` of the event they accept. Adding and
//! removing handlers happens on the engine thread, as does every dispatch,
//! so a handler removed before a dispatch starts is never invoked by it.

use std::any::{Any, TypeId, type_name};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::async_result::AsyncResult;
use crate::engine::Executor;
use crate::errors::HuddleError;

/// Anything that can be dispatched through an [`EventRegistry`].
pub trait Event: Clone + Send + Sync + 'static {}

/// Token returned when registering a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn value(self) -> u64 {
        self.0
    }
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registration {
    id: HandlerId,
    event_type: TypeId,
    event_name: &'static str,
    /// `Callback<E>` for the registration's event type.
    callback: Arc<dyn Any + Send + Sync>,
}

#[derive(Clone)]
pub struct EventRegistry {
    handlers: Arc<Mutex<Vec<Registration>>>,
    next_id: Arc<AtomicU64>,
    executor: Executor,
}

impl EventRegistry {
    pub fn new(executor: Executor) -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            executor,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_event_handler<E, F>(&self, callback: F) -> AsyncResult<HandlerId>
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let callback: Callback<E> = Arc::new(callback);
        let handlers = self.handlers.clone();
        self.executor.submit(move || {
            handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Registration {
                    id,
                    event_type: TypeId::of::<E>(),
                    event_name: type_name::<E>(),
                    callback: Arc::new(callback),
                });
            tracing::debug!(handler_id = id.0, event = type_name::<E>(), "event handler added");
            Ok(id)
        })
    }

    pub fn remove_event_handler(&self, id: HandlerId) -> AsyncResult<()> {
        let handlers = self.handlers.clone();
        self.executor.submit(move || {
            let mut handlers = handlers.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(index) = handlers.iter().position(|r| r.id == id) else {
                return Err(HuddleError::NotFound(format!("event handler {}", id.0)));
            };
            let removed = handlers.remove(index);
            tracing::debug!(handler_id = id.0, event = removed.event_name, "event handler removed");
            Ok(())
        })
    }

    /// Deliver `event` to every handler registered for `E`.
    ///
    /// Off the engine thread the event is cloned and queued.
    pub fn dispatch<E: Event>(&self, event: &E) {
        if Executor::is_engine_thread() {
            self.dispatch_now(event);
            return;
        }
        let registry = self.clone();
        let event = event.clone();
        if !self.executor.post(move || registry.dispatch_now(&event)) {
            tracing::debug!(event = type_name::<E>(), "engine stopped, event dropped");
        }
    }

    fn dispatch_now<E: Event>(&self, event: &E) {
        // Handlers added or removed by a handler apply to later dispatches.
        let snapshot: Vec<(HandlerId, Arc<dyn Any + Send + Sync>)> = self
            .lock()
            .iter()
            .filter(|r| r.event_type == TypeId::of::<E>())
            .map(|r| (r.id, r.callback.clone()))
            .collect();

        for (id, callback) in snapshot {
            let Some(callback) = callback.downcast_ref::<Callback<E>>() else {
                continue;
            };
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(
                    handler_id = id.0,
                    event = type_name::<E>(),
                    "event handler panicked"
                );
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.lock().len()
    }

    /// Drop every registration immediately.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
