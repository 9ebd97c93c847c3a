#![forbid(unsafe_code)]

//! Observer/observable traits and the type-erased [`Stream`] handle.
//!
//! # Design
//!
//! Every push-based source in rxui implements [`Observable<T>`]: it accepts
//! an [`Observer<T>`] and hands back a [`Subscription`]. [`Stream<T>`] wraps
//! any observable behind an `Arc` so that operator chains can be cloned,
//! stored, and returned from methods without naming their concrete types.
//!
//! Values are delivered by reference (`&T`); operators that need to move a
//! value onto another execution context clone it.
//!
//! # Invariants
//!
//! 1. A well-behaved observable delivers at most one terminal signal
//!    (`on_error` or `on_completed`) per observer and nothing after it.
//! 2. Operator state (distinct tracking, scheduling queues) is created per
//!    subscription and never shared between subscribers.

use std::sync::Arc;

use crate::error::RxError;
use crate::subscription::Subscription;

/// Receiver side of a stream.
pub trait Observer<T>: Send + Sync {
    /// A value was emitted.
    fn on_next(&self, value: &T);

    /// The stream terminated with an error.
    fn on_error(&self, _error: &RxError) {}

    /// The stream terminated normally.
    fn on_completed(&self) {}
}

/// Shared observer handle.
pub type ObserverRef<T> = Arc<dyn Observer<T>>;

/// Producer side of a stream.
pub trait Observable<T>: Send + Sync {
    /// Attach an observer. The returned subscription detaches it.
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Subscription;
}

/// A single notification, used where signals are queued before delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<T> {
    Next(T),
    Error(RxError),
    Completed,
}

impl<T> Notification<T> {
    /// Deliver this notification to `observer`.
    pub fn deliver(&self, observer: &dyn Observer<T>) {
        match self {
            Self::Next(value) => observer.on_next(value),
            Self::Error(err) => observer.on_error(err),
            Self::Completed => observer.on_completed(),
        }
    }

    /// Whether this is a terminal signal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }
}

type NextFn<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&RxError) + Send + Sync>;
type CompletedFn = Box<dyn Fn() + Send + Sync>;

/// Observer assembled from closures.
pub struct CallbackObserver<T> {
    next: NextFn<T>,
    error: Option<ErrorFn>,
    completed: Option<CompletedFn>,
}

impl<T> CallbackObserver<T> {
    /// Observer that only handles values.
    pub fn new(next: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self {
            next: Box::new(next),
            error: None,
            completed: None,
        }
    }

    /// Attach an error handler.
    #[must_use]
    pub fn with_error(mut self, error: impl Fn(&RxError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(error));
        self
    }

    /// Attach a completion handler.
    #[must_use]
    pub fn with_completed(mut self, completed: impl Fn() + Send + Sync + 'static) -> Self {
        self.completed = Some(Box::new(completed));
        self
    }
}

impl<T> Observer<T> for CallbackObserver<T> {
    fn on_next(&self, value: &T) {
        (self.next)(value);
    }

    fn on_error(&self, error: &RxError) {
        if let Some(handler) = &self.error {
            handler(error);
        }
    }

    fn on_completed(&self) {
        if let Some(handler) = &self.completed {
            handler();
        }
    }
}

/// Cheap-clone, type-erased observable.
///
/// Cloning a `Stream` clones the handle, not the source: both clones
/// subscribe to the same producer.
pub struct Stream<T> {
    source: Arc<dyn Observable<T>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
        }
    }
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream").finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> Stream<T> {
    /// Wrap an observable.
    pub fn from_observable(source: impl Observable<T> + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Subscribe with a value callback only.
    pub fn subscribe(&self, on_next: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.subscribe_observer(Arc::new(CallbackObserver::new(on_next)))
    }

    /// Subscribe with value, error, and completion callbacks.
    pub fn subscribe_with(
        &self,
        on_next: impl Fn(&T) + Send + Sync + 'static,
        on_error: impl Fn(&RxError) + Send + Sync + 'static,
        on_completed: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let observer = CallbackObserver::new(on_next)
            .with_error(on_error)
            .with_completed(on_completed);
        self.subscribe_observer(Arc::new(observer))
    }

    /// Subscribe an existing observer.
    pub fn subscribe_observer(&self, observer: ObserverRef<T>) -> Subscription {
        self.source.subscribe_observer(observer)
    }

    /// A stream that completes immediately without values.
    pub fn empty() -> Self {
        Self::from_observable(Terminal::Completed)
    }

    /// A stream that fails immediately with `error`.
    pub fn fail(error: RxError) -> Self {
        Self::from_observable(Terminal::Failed(error))
    }
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    /// Cold stream that emits each value to every new subscriber, then
    /// completes.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self::from_observable(Values {
            values: values.into_iter().collect(),
        })
    }

    /// Cold stream of a single value.
    pub fn just(value: T) -> Self {
        Self::from_values([value])
    }
}

impl<T: Clone + Send + Sync + 'static> FromIterator<T> for Stream<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

struct Values<T> {
    values: Arc<[T]>,
}

impl<T: Send + Sync> Observable<T> for Values<T> {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Subscription {
        for value in self.values.iter() {
            observer.on_next(value);
        }
        observer.on_completed();
        Subscription::empty()
    }
}

enum Terminal {
    Completed,
    Failed(RxError),
}

impl<T> Observable<T> for Terminal {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Subscription {
        match self {
            Self::Completed => observer.on_completed(),
            Self::Failed(err) => observer.on_error(err),
        }
        Subscription::empty()
    }
}
