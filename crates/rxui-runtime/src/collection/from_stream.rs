#![forbid(unsafe_code)]

//! Collections populated from a stream.
//!
//! Items always enter the collection on the supplied scheduler. With a pace,
//! arrivals wait in a queue and a timer adds at most one item per interval
//! (the first one interval after creation). The timer stops once the source
//! has completed and the queue is empty, or when the [`StreamCollection`]
//! is dropped.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rxui_core::sync::lock;
use rxui_core::{ScheduledWork, SchedulerHandle, Stream, Subscription};

use super::tracking::ChangeTrackingCollection;

/// A collection fed by a stream. Dropping it stops the feed.
pub struct StreamCollection<T> {
    collection: ChangeTrackingCollection<T>,
    feed: Subscription,
    pacer: Option<Arc<Pacer<T>>>,
    complete: Arc<AtomicBool>,
}

impl<T> StreamCollection<T> {
    pub fn collection(&self) -> &ChangeTrackingCollection<T> {
        &self.collection
    }

    /// Whether the source has completed (or failed).
    pub fn source_completed(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Items received but not yet added (paced feeds only).
    pub fn pending(&self) -> usize {
        self.pacer
            .as_ref()
            .map_or(0, |pacer| lock(&pacer.queue).len())
    }
}

impl<T> Deref for StreamCollection<T> {
    type Target = ChangeTrackingCollection<T>;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}

impl<T> Drop for StreamCollection<T> {
    fn drop(&mut self) {
        self.feed.unsubscribe();
        if let Some(pacer) = &self.pacer {
            pacer.stop();
        }
    }
}

impl<T> std::fmt::Debug for StreamCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCollection")
            .field("collection", &self.collection)
            .field("paced", &self.pacer.is_some())
            .field("source_completed", &self.source_completed())
            .finish()
    }
}

struct Pacer<T> {
    target: ChangeTrackingCollection<T>,
    scheduler: SchedulerHandle,
    pace: Duration,
    queue: Mutex<VecDeque<T>>,
    source_done: Arc<AtomicBool>,
    stopped: AtomicBool,
    tick: Mutex<Option<ScheduledWork>>,
}

impl<T> Pacer<T> {
    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        if let Some(tick) = lock(&self.tick).take() {
            tick.cancel();
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Pacer<T> {
    fn arm(self: &Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let pacer = Arc::clone(self);
        let handle = self
            .scheduler
            .schedule_after(self.pace, Box::new(move || pacer.fire()));
        *lock(&self.tick) = Some(handle);
    }

    fn fire(self: &Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let next = lock(&self.queue).pop_front();
        if let Some(item) = next {
            self.target.push(item);
        }
        let drained = lock(&self.queue).is_empty();
        if drained && self.source_done.load(Ordering::Acquire) {
            tracing::debug!(collection = %self.target.id(), "paced feed drained");
            self.stopped.store(true, Ordering::Release);
            return;
        }
        self.arm();
    }
}

/// Build a collection from `source`, adding items on `scheduler`, at most
/// one per `pace` when a pace is given.
///
/// A paced feed needs a scheduler with a real timer (a worker scheduler or
/// a virtual-time test scheduler). On an inline scheduler every tick would
/// block the caller until the source completes.
pub fn create_collection<T>(
    source: &Stream<T>,
    scheduler: SchedulerHandle,
    pace: Option<Duration>,
) -> StreamCollection<T>
where
    T: Clone + Send + Sync + 'static,
{
    let collection = ChangeTrackingCollection::with_scheduler(scheduler.clone());
    let complete = Arc::new(AtomicBool::new(false));
    let done_ok = Arc::clone(&complete);
    let done_err = Arc::clone(&complete);
    let id = collection.id();
    let on_completed = move || done_ok.store(true, Ordering::Release);
    let on_error = move |err: &rxui_core::RxError| {
        tracing::warn!(collection = %id, error = %err, "collection source failed; feed stopped");
        done_err.store(true, Ordering::Release);
    };
    let delivered = source.observe_on(scheduler.clone());

    let Some(pace) = pace else {
        let sink = collection.clone();
        let feed = delivered.subscribe_with(move |item| sink.push(item.clone()), on_error, on_completed);
        return StreamCollection {
            collection,
            feed,
            pacer: None,
            complete,
        };
    };

    let pacer = Arc::new(Pacer {
        target: collection.clone(),
        scheduler,
        pace,
        queue: Mutex::new(VecDeque::new()),
        source_done: Arc::clone(&complete),
        stopped: AtomicBool::new(false),
        tick: Mutex::new(None),
    });
    let queue_into = Arc::clone(&pacer);
    let feed = delivered.subscribe_with(
        move |item| lock(&queue_into.queue).push_back(item.clone()),
        on_error,
        on_completed,
    );
    pacer.arm();
    StreamCollection {
        collection,
        feed,
        pacer: Some(pacer),
        complete,
    }
}

/// Extension form of [`create_collection`].
pub trait CreateCollection<T> {
    fn create_collection(&self, scheduler: SchedulerHandle, pace: Option<Duration>) -> StreamCollection<T>;
}

impl<T: Clone + Send + Sync + 'static> CreateCollection<T> for Stream<T> {
    fn create_collection(&self, scheduler: SchedulerHandle, pace: Option<Duration>) -> StreamCollection<T> {
        create_collection(self, scheduler, pace)
    }
}
