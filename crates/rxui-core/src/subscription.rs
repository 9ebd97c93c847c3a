#![forbid(unsafe_code)]

//! RAII cancellation handle for stream subscriptions.
//!
//! # Invariants
//!
//! 1. The teardown closure runs at most once, no matter how many times
//!    [`Subscription::unsubscribe`] is called or whether the handle is
//!    dropped afterwards.
//! 2. Unsubscribing is safe from inside a delivery callback: teardown never
//!    waits on a delivery in flight, it only prevents future deliveries.
//! 3. [`Subscription::detach`] forgets the teardown without running or
//!    dropping it, so the subscription (and every subscription the teardown
//!    owns) lives as long as its source.

use std::sync::Mutex;

use crate::sync::lock;

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle to an active subscription. Dropping it cancels the subscription.
#[must_use = "dropping a Subscription cancels it; call `detach()` to keep it alive"]
pub struct Subscription {
    teardown: Mutex<Option<Teardown>>,
}

impl Subscription {
    /// Create a subscription whose cancellation runs `teardown`.
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A subscription that is already closed and owns nothing.
    pub fn empty() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    /// Cancel the subscription. Idempotent.
    pub fn unsubscribe(&self) {
        let teardown = lock(&self.teardown).take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Whether the subscription has been cancelled (or detached).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        lock(&self.teardown).is_none()
    }

    /// Combine two subscriptions so that cancelling the result cancels both.
    /// `self` is torn down first.
    pub fn and(self, other: Subscription) -> Subscription {
        Subscription::new(move || {
            self.unsubscribe();
            other.unsubscribe();
        })
    }

    /// Keep the subscription alive for as long as its source lives.
    pub fn detach(self) {
        // The teardown of a composite subscription owns the upstream
        // subscriptions; dropping it would cancel them, so it is forgotten.
        let teardown = lock(&self.teardown).take();
        std::mem::forget(teardown);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}
