#![forbid(unsafe_code)]

//! Scheduled multicast relay.
//!
//! A [`ScheduledRedispatcher`] is a writable stream whose subscribers always
//! receive values on one scheduler, wherever the value was produced. It can
//! also be connected to an upstream source; the connection is a single
//! internal subscription shared by every downstream subscriber.
//!
//! # Invariants
//!
//! 1. At most one upstream connection exists; `connect` replaces it.
//! 2. Every subscriber sees every value (broadcast, not work-stealing), in
//!    the order the relay received them.
//! 3. Dropping the relay disconnects it from its upstream.

use std::sync::{Arc, Mutex};

use crate::error::RxError;
use crate::scheduler::SchedulerHandle;
use crate::stream::{Observable, Observer, ObserverRef, Stream};
use crate::subject::EventStream;
use crate::subscription::Subscription;
use crate::sync::lock;

/// Writable relay that re-emits every signal on a fixed scheduler.
pub struct ScheduledRedispatcher<T> {
    subject: EventStream<T>,
    scheduler: SchedulerHandle,
    scheduled: Stream<T>,
    connection: Mutex<Option<Subscription>>,
}

impl<T> std::fmt::Debug for ScheduledRedispatcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledRedispatcher")
            .field("scheduler", &self.scheduler.name())
            .field("connected", &lock(&self.connection).is_some())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> ScheduledRedispatcher<T> {
    /// New relay with no upstream.
    #[must_use]
    pub fn new(scheduler: SchedulerHandle) -> Self {
        let subject = EventStream::new();
        let scheduled = subject.stream().observe_on(Arc::clone(&scheduler));
        Self {
            subject,
            scheduler,
            scheduled,
            connection: Mutex::new(None),
        }
    }

    /// New relay already connected to `source`.
    #[must_use]
    pub fn connected(source: &Stream<T>, scheduler: SchedulerHandle) -> Self {
        let relay = Self::new(scheduler);
        relay.connect(source);
        relay
    }

    /// Forward every signal of `source` through this relay. Replaces any
    /// previous connection.
    pub fn connect(&self, source: &Stream<T>) {
        let subscription = source.subscribe_observer(Arc::new(self.subject.clone()));
        let previous = lock(&self.connection).replace(subscription);
        drop(previous);
    }

    /// Tear down the upstream connection. Idempotent.
    pub fn disconnect(&self) {
        let previous = lock(&self.connection).take();
        drop(previous);
    }

    /// Whether an upstream connection is installed and still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        lock(&self.connection)
            .as_ref()
            .is_some_and(|sub| !sub.is_closed())
    }

    /// Push a value into the relay.
    pub fn next(&self, value: T) {
        self.subject.next(value);
    }

    /// Terminate the relay with an error.
    pub fn error(&self, error: RxError) {
        self.subject.error(error);
    }

    /// Terminate the relay normally.
    pub fn complete(&self) {
        self.subject.complete();
    }

    /// The scheduled view subscribers attach to.
    #[must_use]
    pub fn stream(&self) -> Stream<T> {
        self.scheduled.clone()
    }

    /// Subscribe with a value callback only.
    pub fn subscribe(&self, on_next: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        self.scheduled.subscribe(on_next)
    }

    /// The scheduler every signal is delivered on.
    #[must_use]
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }
}

impl<T: Clone + Send + Sync + 'static> Observer<T> for ScheduledRedispatcher<T> {
    fn on_next(&self, value: &T) {
        self.subject.emit(value);
    }

    fn on_error(&self, error: &RxError) {
        self.subject.error(error.clone());
    }

    fn on_completed(&self) {
        self.subject.complete();
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> for ScheduledRedispatcher<T> {
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Subscription {
        self.scheduled.subscribe_observer(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{ImmediateScheduler, Scheduler, ScheduledWork, Work};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Queues work until `run_all` is called.
    #[derive(Default)]
    struct ManualScheduler {
        queue: Mutex<Vec<Work>>,
        scheduled: AtomicUsize,
    }

    impl ManualScheduler {
        fn run_all(&self) {
            loop {
                let batch = std::mem::take(&mut *self.queue.lock().unwrap());
                if batch.is_empty() {
                    return;
                }
                for work in batch {
                    work();
                }
            }
        }
    }

    impl Scheduler for ManualScheduler {
        fn name(&self) -> &str {
            "manual"
        }

        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn schedule_after(&self, _delay: Duration, work: Work) -> ScheduledWork {
            self.scheduled.fetch_add(1, Ordering::SeqCst);
            let handle = ScheduledWork::new();
            self.queue.lock().unwrap().push(handle.guard(work));
            handle
        }
    }

    #[test]
    fn every_subscriber_sees_every_value() {
        let relay = ScheduledRedispatcher::new(ImmediateScheduler::handle());
        let a = Arc::new(Mutex::new(Vec::new()));
        let b = Arc::new(Mutex::new(Vec::new()));
        let (a2, b2) = (Arc::clone(&a), Arc::clone(&b));
        let _sa = relay.subscribe(move |v: &i32| a2.lock().unwrap().push(*v));
        let _sb = relay.subscribe(move |v: &i32| b2.lock().unwrap().push(*v));
        relay.next(1);
        relay.next(2);
        assert_eq!(*a.lock().unwrap(), vec![1, 2]);
        assert_eq!(*b.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn delivery_waits_for_the_scheduler() {
        let manual = Arc::new(ManualScheduler::default());
        let relay = ScheduledRedispatcher::new(manual.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&seen);
        let _sub = relay.subscribe(move |_: &u8| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        relay.next(1);
        relay.next(2);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        manual.run_all();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn connect_replaces_and_disconnect_is_idempotent() {
        let relay = ScheduledRedispatcher::new(ImmediateScheduler::handle());
        let first = EventStream::new();
        let second = EventStream::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let _sub = relay.subscribe(move |v: &&str| l.lock().unwrap().push(*v));

        relay.connect(&first.stream());
        first.next("a");
        relay.connect(&second.stream());
        first.next("dropped");
        second.next("b");
        assert!(relay.is_connected());

        relay.disconnect();
        relay.disconnect();
        second.next("after");
        assert!(!relay.is_connected());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(first.subscriber_count(), 0);
        assert_eq!(second.subscriber_count(), 0);
    }

    #[test]
    fn drop_releases_upstream() {
        let source: EventStream<i32> = EventStream::new();
        let relay = ScheduledRedispatcher::connected(&source.stream(), ImmediateScheduler::handle());
        assert_eq!(source.subscriber_count(), 1);
        drop(relay);
        assert_eq!(source.subscriber_count(), 0);
    }
}
