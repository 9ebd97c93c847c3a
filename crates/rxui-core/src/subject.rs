#![forbid(unsafe_code)]

//! Multicast, replay-less publish channel.
//!
//! # Design
//!
//! [`EventStream<T>`] is the primitive every other rxui component builds on.
//! It keeps an ordered list of observer slots behind a mutex. Emission takes
//! a snapshot of the slot list, releases the lock, and then calls each live
//! observer in subscription order, so callbacks may subscribe, unsubscribe,
//! or emit again without deadlocking.
//!
//! Cloning an `EventStream` creates a new handle to the **same** channel.
//!
//! # Invariants
//!
//! 1. Observers are called in subscription order.
//! 2. Emissions with no live observers are dropped, never buffered.
//! 3. After `error`/`complete`, further emissions are ignored and late
//!    subscribers receive the terminal signal immediately.
//! 4. A cancelled slot is never called again, even if it was part of a
//!    snapshot taken before the cancellation.
//!
//! # Failure Modes
//!
//! - **Observer panic**: caught at the delivery boundary, logged at `error`
//!   level, and the panicking observer is detached. Remaining observers still
//!   receive the value and the producer returns normally.
//! - **Concurrent emitters**: each emission is delivered in subscription
//!   order, but emissions racing from different threads have no defined
//!   relative order. Serialize producers when order matters.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::RxError;
use crate::stream::{Observable, Observer, ObserverRef, Stream};
use crate::subscription::Subscription;
use crate::sync::lock;

struct Slot<T> {
    id: u64,
    active: AtomicBool,
    observer: ObserverRef<T>,
}

#[derive(Clone)]
enum Terminated {
    Completed,
    Failed(RxError),
}

struct SubjectState<T> {
    slots: Vec<Arc<Slot<T>>>,
    next_id: u64,
    terminated: Option<Terminated>,
}

struct SubjectInner<T> {
    state: Mutex<SubjectState<T>>,
}

impl<T> SubjectInner<T> {
    fn remove(&self, id: u64) {
        lock(&self.state).slots.retain(|slot| slot.id != id);
    }
}

/// A hot, multicast stream that is also directly writable.
pub struct EventStream<T> {
    inner: Arc<SubjectInner<T>>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("EventStream")
            .field("subscriber_count", &state.slots.len())
            .field("terminated", &state.terminated.is_some())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> EventStream<T> {
    /// Create an open stream with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                state: Mutex::new(SubjectState {
                    slots: Vec::new(),
                    next_id: 0,
                    terminated: None,
                }),
            }),
        }
    }

    /// Emit a value to every live subscriber.
    pub fn next(&self, value: T) {
        self.emit(&value);
    }

    /// Emit a borrowed value to every live subscriber.
    pub fn emit(&self, value: &T) {
        let slots = {
            let state = lock(&self.inner.state);
            if state.terminated.is_some() {
                return;
            }
            state.slots.clone()
        };
        for slot in slots {
            self.deliver(&slot, |observer| observer.on_next(value));
        }
    }

    /// Terminate the stream with an error.
    pub fn error(&self, error: RxError) {
        self.terminate(Terminated::Failed(error));
    }

    /// Terminate the stream normally.
    pub fn complete(&self) {
        self.terminate(Terminated::Completed);
    }

    /// Subscribe with a value callback only.
    pub fn subscribe(&self, on_next: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.stream().subscribe(on_next)
    }

    /// Subscribe with value, error, and completion callbacks.
    pub fn subscribe_with(
        &self,
        on_next: impl Fn(&T) + Send + Sync + 'static,
        on_error: impl Fn(&RxError) + Send + Sync + 'static,
        on_completed: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.stream().subscribe_with(on_next, on_error, on_completed)
    }

    /// Type-erased view of this stream.
    #[must_use]
    pub fn stream(&self) -> Stream<T> {
        Stream::from_observable(self.clone())
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.state).slots.len()
    }

    /// Whether the stream has received a terminal signal.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        lock(&self.inner.state).terminated.is_some()
    }

    fn terminate(&self, terminal: Terminated) {
        let slots = {
            let mut state = lock(&self.inner.state);
            if state.terminated.is_some() {
                return;
            }
            state.terminated = Some(terminal.clone());
            std::mem::take(&mut state.slots)
        };
        for slot in slots {
            self.deliver(&slot, |observer| match &terminal {
                Terminated::Completed => observer.on_completed(),
                Terminated::Failed(err) => observer.on_error(err),
            });
            slot.active.store(false, Ordering::Release);
        }
    }

    fn deliver(&self, slot: &Slot<T>, f: impl FnOnce(&dyn Observer<T>)) {
        if !slot.active.load(Ordering::Acquire) {
            return;
        }
        let observer = &*slot.observer;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(observer))) {
            tracing::error!(
                subscriber = slot.id,
                panic = panic_message(payload.as_ref()),
                "observer panicked during delivery; detaching it"
            );
            slot.active.store(false, Ordering::Release);
            self.inner.remove(slot.id);
        }
    }
}

impl<T: Send + Sync + 'static> Observable<T> for EventStream<T> {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Subscription {
        let slot = {
            let mut state = lock(&self.inner.state);
            if let Some(terminal) = state.terminated.clone() {
                drop(state);
                match terminal {
                    Terminated::Completed => observer.on_completed(),
                    Terminated::Failed(err) => observer.on_error(&err),
                }
                return Subscription::empty();
            }
            let id = state.next_id;
            state.next_id += 1;
            let slot = Arc::new(Slot {
                id,
                active: AtomicBool::new(true),
                observer,
            });
            state.slots.push(Arc::clone(&slot));
            slot
        };

        let weak: Weak<SubjectInner<T>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            slot.active.store(false, Ordering::Release);
            if let Some(inner) = weak.upgrade() {
                inner.remove(slot.id);
            }
        })
    }
}

impl<T: Send + Sync + 'static> Observer<T> for EventStream<T> {
    fn on_next(&self, value: &T) {
        self.emit(value);
    }

    fn on_error(&self, error: &RxError) {
        self.error(error.clone());
    }

    fn on_completed(&self) {
        self.complete();
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
