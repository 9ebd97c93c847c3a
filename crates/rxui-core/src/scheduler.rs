#![forbid(unsafe_code)]

//! Scheduler capability and the built-in schedulers.
//!
//! A [`Scheduler`] accepts a unit of work and an optional delay, runs it
//! later on its own execution context, and hands back a [`ScheduledWork`]
//! cancellation handle.
//!
//! | Scheduler | Execution context | Typical slot |
//! |-----------|-------------------|--------------|
//! | [`ImmediateScheduler`] | the calling thread, inline | deferred (test mode) |
//! | [`WorkerScheduler::event_loop`] | one dedicated thread | deferred |
//! | [`WorkerScheduler::pool`] | N worker threads | background |
//!
//! # Worker threads
//!
//! Workers pull jobs from a shared channel. Delayed work goes through a
//! separate timer thread that keeps a deadline heap and forwards jobs to the
//! workers when they come due. Dropping the last handle to a
//! [`WorkerScheduler`] closes both channels and joins the threads.
//!
//! Work submitted after shutdown is dropped and logged; it never runs.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::RxError;
use crate::subject::panic_message;
use crate::sync::lock;

/// A unit of work handed to a scheduler.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// Shared scheduler handle.
pub type SchedulerHandle = Arc<dyn Scheduler>;

/// "Run this unit of work on execution context X, optionally after delay D."
pub trait Scheduler: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Current time on this scheduler's clock, measured from its epoch.
    fn now(&self) -> Duration;

    /// Run `work` after `delay`.
    fn schedule_after(&self, delay: Duration, work: Work) -> ScheduledWork;

    /// Run `work` as soon as the scheduler gets to it.
    fn schedule(&self, work: Work) -> ScheduledWork {
        self.schedule_after(Duration::ZERO, work)
    }
}

/// Cancellation handle for scheduled work.
///
/// Cancelling is idempotent and only affects work that has not started.
#[derive(Debug, Clone, Default)]
pub struct ScheduledWork {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledWork {
    /// Fresh, uncancelled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that is already cancelled (used when work was rejected).
    #[must_use]
    pub fn cancelled() -> Self {
        let handle = Self::new();
        handle.cancel();
        handle
    }

    /// Prevent the work from running if it has not started yet.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Wrap `work` so it becomes a no-op once this handle is cancelled.
    #[must_use]
    pub fn guard(&self, work: Work) -> Work {
        let cancelled = Arc::clone(&self.cancelled);
        Box::new(move || {
            if !cancelled.load(Ordering::Acquire) {
                work();
            }
        })
    }
}

/// Runs work inline on the calling thread.
///
/// Delayed work blocks the caller for the delay. This is the default
/// deferred scheduler in test mode, where it makes every notification
/// synchronous.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
    /// Shared handle to an immediate scheduler.
    #[must_use]
    pub fn handle() -> SchedulerHandle {
        Arc::new(Self)
    }
}

impl Scheduler for ImmediateScheduler {
    fn name(&self) -> &str {
        "immediate"
    }

    fn now(&self) -> Duration {
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed()
    }

    fn schedule_after(&self, delay: Duration, work: Work) -> ScheduledWork {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        work();
        ScheduledWork::new()
    }
}

/// Delayed job waiting in the timer heap.
struct TimerEntry {
    due: Instant,
    seq: u64,
    work: Work,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed: BinaryHeap is a max-heap, we want the earliest deadline on top.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct WorkerChannels {
    jobs: Option<mpsc::Sender<Work>>,
    timer: Option<mpsc::Sender<TimerEntry>>,
    next_seq: u64,
}

/// Scheduler backed by dedicated, named worker threads.
pub struct WorkerScheduler {
    name: String,
    epoch: Instant,
    channels: Mutex<WorkerChannels>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WorkerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerScheduler")
            .field("name", &self.name)
            .field("threads", &lock(&self.threads).len())
            .finish()
    }
}

impl WorkerScheduler {
    /// Single worker thread: work runs one item at a time, in submission
    /// order. Stand-in for a UI event loop.
    pub fn event_loop(name: impl Into<String>) -> io::Result<Self> {
        Self::pool(name, 1)
    }

    /// Pool of `threads` workers (at least one).
    ///
    /// # Errors
    ///
    /// Returns the OS error if a worker or the timer thread cannot be spawned.
    pub fn pool(name: impl Into<String>, threads: usize) -> io::Result<Self> {
        let name = name.into();
        let (job_tx, job_rx) = mpsc::channel::<Work>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let mut handles = Vec::new();

        for idx in 0..threads.max(1) {
            let rx = Arc::clone(&job_rx);
            let thread_name = format!("{name}-{idx}");
            let handle = thread::Builder::new()
                .name(thread_name)
                .spawn(move || worker_loop(rx))?;
            handles.push(handle);
        }

        let (timer_tx, timer_rx) = mpsc::channel::<TimerEntry>();
        let timer_jobs = job_tx.clone();
        let timer = thread::Builder::new()
            .name(format!("{name}-timer"))
            .spawn(move || timer_loop(timer_rx, timer_jobs))?;
        handles.push(timer);

        tracing::debug!(scheduler = %name, workers = threads.max(1), "worker scheduler started");

        Ok(Self {
            name,
            epoch: Instant::now(),
            channels: Mutex::new(WorkerChannels {
                jobs: Some(job_tx),
                timer: Some(timer_tx),
                next_seq: 0,
            }),
            threads: Mutex::new(handles),
        })
    }

    /// Convenience: wrap in a [`SchedulerHandle`].
    #[must_use]
    pub fn into_handle(self) -> SchedulerHandle {
        Arc::new(self)
    }

    /// Stop accepting work, let queued work finish, and join the threads.
    /// Idempotent.
    pub fn shutdown(&self) {
        {
            let mut channels = lock(&self.channels);
            channels.jobs = None;
            channels.timer = None;
        }
        let handles = std::mem::take(&mut *lock(&self.threads));
        let current = thread::current().id();
        for handle in handles {
            // A worker dropping the last handle cannot join itself.
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        tracing::debug!(scheduler = %self.name, "worker scheduler stopped");
    }

    fn reject(&self) -> ScheduledWork {
        let err = RxError::SchedulerUnavailable(self.name.clone());
        tracing::warn!(error = %err, "dropping work submitted after shutdown");
        ScheduledWork::cancelled()
    }
}

impl Scheduler for WorkerScheduler {
    fn name(&self) -> &str {
        &self.name
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn schedule_after(&self, delay: Duration, work: Work) -> ScheduledWork {
        let handle = ScheduledWork::new();
        let job = handle.guard(work);
        let mut channels = lock(&self.channels);
        let sent = if delay.is_zero() {
            channels
                .jobs
                .as_ref()
                .is_some_and(|tx| tx.send(job).is_ok())
        } else {
            let seq = channels.next_seq;
            channels.next_seq += 1;
            let entry = TimerEntry {
                due: Instant::now() + delay,
                seq,
                work: job,
            };
            channels
                .timer
                .as_ref()
                .is_some_and(|tx| tx.send(entry).is_ok())
        };
        drop(channels);
        if sent { handle } else { self.reject() }
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<Work>>>) {
    loop {
        let job = {
            let rx = lock(&rx);
            rx.recv()
        };
        let Ok(job) = job else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::error!(
                panic = panic_message(payload.as_ref()),
                "scheduled work panicked"
            );
        }
    }
}

fn timer_loop(rx: mpsc::Receiver<TimerEntry>, jobs: mpsc::Sender<Work>) {
    let mut heap: BinaryHeap<TimerEntry> = BinaryHeap::new();
    loop {
        let received = match heap.peek() {
            None => rx.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
            Some(next) => {
                let wait = next.due.saturating_duration_since(Instant::now());
                rx.recv_timeout(wait)
            }
        };
        match received {
            Ok(entry) => heap.push(entry),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // Shutdown: pending delayed work is discarded.
                return;
            }
        }
        let now = Instant::now();
        while heap.peek().is_some_and(|entry| entry.due <= now) {
            if let Some(entry) = heap.pop()
                && jobs.send(entry.work).is_err()
            {
                return;
            }
        }
    }
}
