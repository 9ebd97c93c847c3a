#![forbid(unsafe_code)]

//! Stream operators.
//!
//! Each operator returns a new [`Stream`] whose subscription subscribes the
//! upstream with a forwarding observer. Operator state lives inside that
//! forwarding observer, so it is created per subscription.
//!
//! Terminal signals pass straight through unless the operator says otherwise
//! (`merge` waits for every source, `on_error_return` turns an error into a
//! final value).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::RxError;
use crate::scheduler::SchedulerHandle;
use crate::stream::{Notification, Observable, Observer, ObserverRef, Stream};
use crate::subscription::Subscription;
use crate::sync::lock;

/// Observable built from a subscribe closure.
struct Create<F>(F);

impl<T, F> Observable<T> for Create<F>
where
    F: Fn(ObserverRef<T>) -> Subscription + Send + Sync,
{
    fn subscribe_observer(&self, observer: ObserverRef<T>) -> Subscription {
        (self.0)(observer)
    }
}

type NextHandler<T, U> = Box<dyn Fn(&T, &dyn Observer<U>) + Send + Sync>;

/// Forwards terminals unchanged and routes values through `on_next`.
struct Forward<U, F> {
    downstream: ObserverRef<U>,
    on_next: F,
}

impl<T, U, F> Observer<T> for Forward<U, F>
where
    U: 'static,
    F: Fn(&T, &dyn Observer<U>) + Send + Sync,
{
    fn on_next(&self, value: &T) {
        (self.on_next)(value, &*self.downstream);
    }

    fn on_error(&self, error: &RxError) {
        self.downstream.on_error(error);
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
    }
}

impl<T: Send + Sync + 'static> Stream<T> {
    /// Stream defined by a subscribe function.
    ///
    /// `subscribe` runs once per subscriber and returns the teardown for
    /// that subscriber.
    pub fn create(
        subscribe: impl Fn(ObserverRef<T>) -> Subscription + Send + Sync + 'static,
    ) -> Self {
        Self::from_observable(Create(subscribe))
    }

    fn lift<U: Send + Sync + 'static>(
        &self,
        make: impl Fn() -> NextHandler<T, U> + Send + Sync + 'static,
    ) -> Stream<U> {
        let source = self.clone();
        Stream::create(move |downstream: ObserverRef<U>| {
            source.subscribe_observer(Arc::new(Forward {
                downstream,
                on_next: make(),
            }))
        })
    }

    /// Transform each value.
    pub fn map<U: Send + Sync + 'static>(
        &self,
        f: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> Stream<U> {
        let f = Arc::new(f);
        self.lift(move || {
            let f = Arc::clone(&f);
            let handler: NextHandler<T, U> =
                Box::new(move |value: &T, down: &dyn Observer<U>| down.on_next(&f(value)));
            handler
        })
    }

    /// Keep values matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Stream<T> {
        let predicate = Arc::new(predicate);
        self.lift(move || {
            let predicate = Arc::clone(&predicate);
            let handler: NextHandler<T, T> = Box::new(move |value: &T, down: &dyn Observer<T>| {
                if predicate(value) {
                    down.on_next(value);
                }
            });
            handler
        })
    }

    /// Transform and filter in one step.
    pub fn filter_map<U: Send + Sync + 'static>(
        &self,
        f: impl Fn(&T) -> Option<U> + Send + Sync + 'static,
    ) -> Stream<U> {
        let f = Arc::new(f);
        self.lift(move || {
            let f = Arc::clone(&f);
            let handler: NextHandler<T, U> = Box::new(move |value: &T, down: &dyn Observer<U>| {
                if let Some(mapped) = f(value) {
                    down.on_next(&mapped);
                }
            });
            handler
        })
    }

    /// Expand each value into zero or more values, emitted in order.
    pub fn flat_map<U, I>(&self, f: impl Fn(&T) -> I + Send + Sync + 'static) -> Stream<U>
    where
        U: Send + Sync + 'static,
        I: IntoIterator<Item = U>,
    {
        let f = Arc::new(f);
        self.lift(move || {
            let f = Arc::clone(&f);
            let handler: NextHandler<T, U> = Box::new(move |value: &T, down: &dyn Observer<U>| {
                for mapped in f(value) {
                    down.on_next(&mapped);
                }
            });
            handler
        })
    }

    /// Replace an error with a final value, then complete.
    pub fn on_error_return(
        &self,
        fallback: impl Fn(&RxError) -> T + Send + Sync + 'static,
    ) -> Stream<T> {
        let source = self.clone();
        let fallback: Arc<dyn Fn(&RxError) -> T + Send + Sync> = Arc::new(fallback);
        Stream::create(move |downstream: ObserverRef<T>| {
            source.subscribe_observer(Arc::new(ErrorReturn {
                downstream,
                fallback: Arc::clone(&fallback),
            }))
        })
    }

    /// Interleave this stream with `other`.
    pub fn merge_with(&self, other: &Stream<T>) -> Stream<T> {
        Stream::merge([self.clone(), other.clone()])
    }

    /// Interleave several streams. Completes once every source completes;
    /// the first error terminates the merged stream.
    pub fn merge(sources: impl IntoIterator<Item = Stream<T>>) -> Stream<T> {
        let sources: Arc<[Stream<T>]> = sources.into_iter().collect();
        Stream::create(move |downstream: ObserverRef<T>| {
            if sources.is_empty() {
                downstream.on_completed();
                return Subscription::empty();
            }
            let shared = Arc::new(MergeShared {
                downstream,
                remaining: AtomicUsize::new(sources.len()),
                done: AtomicBool::new(false),
            });
            sources
                .iter()
                .map(|source| source.subscribe_observer(Arc::new(MergeObserver(Arc::clone(&shared)))))
                .reduce(Subscription::and)
                .unwrap_or_else(Subscription::empty)
        })
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Stream<T> {
    /// Drop values equal to the previous one seen by this subscription.
    pub fn distinct_until_changed(&self) -> Stream<T> {
        self.lift(|| {
            let last: Mutex<Option<T>> = Mutex::new(None);
            let handler: NextHandler<T, T> = Box::new(move |value: &T, down: &dyn Observer<T>| {
                let changed = {
                    let mut last = lock(&last);
                    if last.as_ref() == Some(value) {
                        false
                    } else {
                        *last = Some(value.clone());
                        true
                    }
                };
                if changed {
                    down.on_next(value);
                }
            });
            handler
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Stream<T> {
    /// Deliver every signal through `scheduler`.
    ///
    /// Each subscription owns one queue. At most one drain job per queue is
    /// scheduled at a time, so emission order survives multi-threaded
    /// schedulers.
    pub fn observe_on(&self, scheduler: SchedulerHandle) -> Stream<T> {
        let source = self.clone();
        Stream::create(move |downstream: ObserverRef<T>| {
            let state = Arc::new(ObserveOnState {
                downstream,
                scheduler: Arc::clone(&scheduler),
                queue: Mutex::new(DrainQueue {
                    pending: VecDeque::new(),
                    draining: false,
                    terminated: false,
                }),
                cancelled: AtomicBool::new(false),
            });
            let upstream = source.subscribe_observer(Arc::new(ObserveOn(Arc::clone(&state))));
            Subscription::new(move || {
                state.cancelled.store(true, Ordering::Release);
                lock(&state.queue).pending.clear();
            })
            .and(upstream)
        })
    }
}

struct ErrorReturn<T> {
    downstream: ObserverRef<T>,
    fallback: Arc<dyn Fn(&RxError) -> T + Send + Sync>,
}

impl<T> Observer<T> for ErrorReturn<T> {
    fn on_next(&self, value: &T) {
        self.downstream.on_next(value);
    }

    fn on_error(&self, error: &RxError) {
        let value = (self.fallback)(error);
        self.downstream.on_next(&value);
        self.downstream.on_completed();
    }

    fn on_completed(&self) {
        self.downstream.on_completed();
    }
}

struct MergeShared<T> {
    downstream: ObserverRef<T>,
    remaining: AtomicUsize,
    done: AtomicBool,
}

struct MergeObserver<T>(Arc<MergeShared<T>>);

impl<T> Observer<T> for MergeObserver<T> {
    fn on_next(&self, value: &T) {
        if !self.0.done.load(Ordering::Acquire) {
            self.0.downstream.on_next(value);
        }
    }

    fn on_error(&self, error: &RxError) {
        if !self.0.done.swap(true, Ordering::AcqRel) {
            self.0.downstream.on_error(error);
        }
    }

    fn on_completed(&self) {
        if self.0.remaining.fetch_sub(1, Ordering::AcqRel) == 1
            && !self.0.done.swap(true, Ordering::AcqRel)
        {
            self.0.downstream.on_completed();
        }
    }
}

struct DrainQueue<T> {
    pending: VecDeque<Notification<T>>,
    draining: bool,
    terminated: bool,
}

struct ObserveOnState<T> {
    downstream: ObserverRef<T>,
    scheduler: SchedulerHandle,
    queue: Mutex<DrainQueue<T>>,
    cancelled: AtomicBool,
}

impl<T: Send + Sync + 'static> ObserveOnState<T> {
    fn enqueue(self: &Arc<Self>, notification: Notification<T>) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        let schedule = {
            let mut queue = lock(&self.queue);
            if queue.terminated {
                return;
            }
            queue.terminated = notification.is_terminal();
            queue.pending.push_back(notification);
            !std::mem::replace(&mut queue.draining, true)
        };
        if schedule {
            let state = Arc::clone(self);
            let handle = self.scheduler.schedule(Box::new(move || state.drain()));
            if handle.is_cancelled() {
                // The drain will never run; reopen the queue so a later
                // signal can schedule again.
                let mut queue = lock(&self.queue);
                queue.pending.clear();
                queue.draining = false;
                tracing::warn!(
                    scheduler = self.scheduler.name(),
                    "observe_on drain rejected; dropping queued signals"
                );
            }
        }
    }

    fn drain(&self) {
        loop {
            let next = {
                let mut queue = lock(&self.queue);
                match queue.pending.pop_front() {
                    Some(notification) => notification,
                    None => {
                        queue.draining = false;
                        return;
                    }
                }
            };
            if self.cancelled.load(Ordering::Acquire) {
                let mut queue = lock(&self.queue);
                queue.pending.clear();
                queue.draining = false;
                return;
            }
            next.deliver(&*self.downstream);
        }
    }
}

struct ObserveOn<T>(Arc<ObserveOnState<T>>);

impl<T: Clone + Send + Sync + 'static> Observer<T> for ObserveOn<T> {
    fn on_next(&self, value: &T) {
        self.0.enqueue(Notification::Next(value.clone()));
    }

    fn on_error(&self, error: &RxError) {
        self.0.enqueue(Notification::Error(error.clone()));
    }

    fn on_completed(&self) {
        self.0.enqueue(Notification::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{ImmediateScheduler, ScheduledWork, Scheduler, Work, WorkerScheduler};
    use crate::subject::EventStream;
    use std::sync::mpsc;
    use std::time::Duration;

    fn collect<T: Clone + Send + Sync + 'static>(stream: &Stream<T>) -> (Arc<Mutex<Vec<T>>>, Subscription) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let sub = stream.subscribe(move |v| l.lock().unwrap().push(v.clone()));
        (log, sub)
    }

    #[test]
    fn map_filter_chain() {
        let stream = Stream::from_values(1..=6).filter(|v| v % 2 == 0).map(|v| v * 10);
        let (log, _sub) = collect(&stream);
        assert_eq!(*log.lock().unwrap(), vec![20, 40, 60]);
    }

    #[test]
    fn filter_map_and_flat_map() {
        let parsed = Stream::from_values(["1", "x", "3"]).filter_map(|s| s.parse::<i32>().ok());
        let (log, _s1) = collect(&parsed);
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);

        let expanded = Stream::from_values([2usize, 0, 1]).flat_map(|n| vec![*n; *n]);
        let (log, _s2) = collect(&expanded);
        assert_eq!(*log.lock().unwrap(), vec![2, 2, 1]);
    }

    #[test]
    fn distinct_state_is_per_subscription() {
        let subject = EventStream::new();
        let distinct = subject.stream().distinct_until_changed();
        let (a, _sa) = collect(&distinct);
        subject.next(true);
        subject.next(true);
        let (b, _sb) = collect(&distinct);
        subject.next(true);
        subject.next(false);
        assert_eq!(*a.lock().unwrap(), vec![true, false]);
        assert_eq!(*b.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn merge_completes_after_all_sources() {
        let a = EventStream::new();
        let b = EventStream::new();
        let merged = a.stream().merge_with(&b.stream());
        let done = Arc::new(AtomicBool::new(false));
        let d = Arc::clone(&done);
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let _sub = merged.subscribe_with(
            move |v| l.lock().unwrap().push(*v),
            |_| {},
            move || d.store(true, Ordering::SeqCst),
        );
        a.next(1);
        b.next(2);
        a.complete();
        assert!(!done.load(Ordering::SeqCst));
        b.next(3);
        b.complete();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn merge_of_nothing_completes() {
        let done = Arc::new(AtomicBool::new(false));
        let d = Arc::clone(&done);
        let _sub = Stream::<i32>::merge([]).subscribe_with(|_| {}, |_| {}, move || {
            d.store(true, Ordering::SeqCst)
        });
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn on_error_return_substitutes_value() {
        let subject = EventStream::new();
        let safe = subject.stream().on_error_return(|_| false);
        let (log, _sub) = collect(&safe);
        subject.next(true);
        subject.error(RxError::source("lost"));
        assert_eq!(*log.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn observe_on_immediate_is_synchronous() {
        let subject = EventStream::new();
        let stream = subject.stream().observe_on(ImmediateScheduler::handle());
        let (log, _sub) = collect(&stream);
        subject.next(1);
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn observe_on_pool_preserves_order() {
        let pool = WorkerScheduler::pool("test-observe", 4).unwrap().into_handle();
        let subject = EventStream::new();
        let stream = subject.stream().observe_on(pool);
        let (tx, rx) = mpsc::channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let _sub = stream.subscribe_with(
            move |v| l.lock().unwrap().push(*v),
            |_| {},
            move || tx.send(()).unwrap(),
        );
        for i in 0..200 {
            subject.next(i);
        }
        subject.complete();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*log.lock().unwrap(), (0..200).collect::<Vec<_>>());
    }

    /// Rejects the first submission, then runs work inline.
    struct RejectOnce {
        rejected: AtomicBool,
    }

    impl Scheduler for RejectOnce {
        fn name(&self) -> &str {
            "reject-once"
        }

        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn schedule_after(&self, _delay: Duration, work: Work) -> ScheduledWork {
            if !self.rejected.swap(true, Ordering::SeqCst) {
                return ScheduledWork::cancelled();
            }
            work();
            ScheduledWork::new()
        }
    }

    #[test]
    fn observe_on_recovers_after_rejected_drain() {
        let scheduler: SchedulerHandle = Arc::new(RejectOnce {
            rejected: AtomicBool::new(false),
        });
        let subject = EventStream::new();
        let stream = subject.stream().observe_on(scheduler);
        let (log, _sub) = collect(&stream);
        subject.next(1);
        subject.next(2);
        subject.next(3);
        assert_eq!(*log.lock().unwrap(), vec![2, 3]);
    }

    #[test]
    fn observe_on_after_shutdown_drops_without_wedging() {
        let pool = WorkerScheduler::pool("test-shutdown", 2).unwrap();
        pool.shutdown();
        let subject = EventStream::new();
        let stream = subject.stream().observe_on(pool.into_handle());
        let (log, _sub) = collect(&stream);
        for i in 0..10 {
            subject.next(i);
        }
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(subject.subscriber_count(), 1);
    }

    #[test]
    fn detached_observe_on_keeps_delivering() {
        let subject = EventStream::new();
        let stream = subject.stream().observe_on(ImmediateScheduler::handle());
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        stream.subscribe(move |v: &i32| l.lock().unwrap().push(*v)).detach();
        subject.next(1);
        subject.next(2);
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
        assert_eq!(subject.subscriber_count(), 1);
    }

    #[test]
    fn cancelled_observe_on_drops_queued_values() {
        let subject = EventStream::new();
        let stream = subject.stream().observe_on(ImmediateScheduler::handle());
        let (log, sub) = collect(&stream);
        subject.next(1);
        sub.unsubscribe();
        subject.next(2);
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }
}
