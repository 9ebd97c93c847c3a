#![forbid(unsafe_code)]

//! Virtual-time scheduler.
//!
//! Work never runs on its own: the test drives the clock with
//! [`TestScheduler::advance_by`], [`TestScheduler::advance_to`], or
//! [`TestScheduler::start`]. Units due at the same instant run in the order
//! they were scheduled. Work may schedule more work; anything that falls
//! inside the window being advanced runs in the same call.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rxui_core::sync::lock;
use rxui_core::{ScheduledWork, Scheduler, SchedulerHandle, Work};

struct Entry {
    due: Duration,
    seq: u64,
    handle: ScheduledWork,
    work: Work,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Min-heap on (due, seq).
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Clock {
    now: Duration,
    seq: u64,
    queue: BinaryHeap<Entry>,
    executed: u64,
}

/// Deterministic scheduler with a virtual millisecond clock.
#[derive(Clone, Default)]
pub struct TestScheduler {
    clock: Arc<Mutex<Clock>>,
}

impl std::fmt::Debug for TestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let clock = lock(&self.clock);
        f.debug_struct("TestScheduler")
            .field("now_ms", &clock.now.as_millis())
            .field("queued", &clock.queue.len())
            .finish()
    }
}

impl TestScheduler {
    /// Scheduler at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to pass to components.
    pub fn handle(&self) -> SchedulerHandle {
        Arc::new(self.clone())
    }

    /// Virtual time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        u64::try_from(lock(&self.clock).now.as_millis()).unwrap_or(u64::MAX)
    }

    /// Units scheduled and neither run nor cancelled.
    pub fn pending(&self) -> usize {
        lock(&self.clock)
            .queue
            .iter()
            .filter(|entry| !entry.handle.is_cancelled())
            .count()
    }

    /// Units that have run so far.
    pub fn executed(&self) -> u64 {
        lock(&self.clock).executed
    }

    /// Run everything due within the next `delta`, then move the clock to
    /// `now + delta`.
    pub fn advance_by(&self, delta: Duration) {
        let target = lock(&self.clock).now + delta;
        self.advance_to(target);
    }

    /// Convenience form of [`advance_by`](Self::advance_by).
    pub fn advance_by_ms(&self, millis: u64) {
        self.advance_by(Duration::from_millis(millis));
    }

    /// Run everything due at or before `target`, then move the clock to
    /// `target`. A target in the past only runs work that is already due.
    pub fn advance_to(&self, target: Duration) {
        // The clock lock is released before each unit runs so it can schedule.
        while let Some(entry) = self.pop_due(Some(target)) {
            (entry.work)();
        }
        let mut clock = lock(&self.clock);
        if clock.now < target {
            clock.now = target;
        }
    }

    /// Run work due at the current instant.
    pub fn flush(&self) {
        let now = lock(&self.clock).now;
        self.advance_to(now);
    }

    /// Run until the queue is empty, moving the clock as each unit comes
    /// due. Does not return if work keeps rescheduling itself forever.
    pub fn start(&self) {
        while let Some(entry) = self.pop_due(None) {
            (entry.work)();
        }
    }

    fn pop_due(&self, limit: Option<Duration>) -> Option<Entry> {
        let mut clock = lock(&self.clock);
        loop {
            let due = clock.queue.peek()?.due;
            if limit.is_some_and(|limit| due > limit) {
                return None;
            }
            let entry = clock.queue.pop()?;
            if entry.handle.is_cancelled() {
                continue;
            }
            if clock.now < entry.due {
                clock.now = entry.due;
            }
            clock.executed += 1;
            return Some(entry);
        }
    }
}

impl Scheduler for TestScheduler {
    fn name(&self) -> &str {
        "test"
    }

    fn now(&self) -> Duration {
        lock(&self.clock).now
    }

    fn schedule_after(&self, delay: Duration, work: Work) -> ScheduledWork {
        let handle = ScheduledWork::new();
        let mut clock = lock(&self.clock);
        let seq = clock.seq;
        clock.seq += 1;
        let due = clock.now + delay;
        clock.queue.push(Entry {
            due,
            seq,
            handle: handle.clone(),
            work,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Work) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let make = move |label: &'static str| -> Work {
            let sink = Arc::clone(&sink);
            Box::new(move || lock(&sink).push(label))
        };
        (log, make)
    }

    #[test]
    fn nothing_runs_until_the_clock_moves() {
        let sched = TestScheduler::new();
        let (log, work) = recorder();
        sched.schedule(work("now"));
        assert!(lock(&log).is_empty());
        assert_eq!(sched.pending(), 1);
        sched.flush();
        assert_eq!(*lock(&log), vec!["now"]);
        assert_eq!(sched.pending(), 0);
    }

    #[test]
    fn due_order_then_fifo() {
        let sched = TestScheduler::new();
        let (log, work) = recorder();
        sched.schedule_after(Duration::from_millis(20), work("late"));
        sched.schedule_after(Duration::from_millis(10), work("a"));
        sched.schedule_after(Duration::from_millis(10), work("b"));
        sched.advance_by_ms(15);
        assert_eq!(*lock(&log), vec!["a", "b"]);
        assert_eq!(sched.now_ms(), 15);
        sched.advance_by_ms(5);
        assert_eq!(*lock(&log), vec!["a", "b", "late"]);
    }

    #[test]
    fn cancelled_work_never_runs() {
        let sched = TestScheduler::new();
        let (log, work) = recorder();
        let handle = sched.schedule(work("x"));
        handle.cancel();
        assert_eq!(sched.pending(), 0);
        sched.start();
        assert!(lock(&log).is_empty());
        assert_eq!(sched.executed(), 0);
    }

    #[test]
    fn work_can_reschedule_within_the_window() {
        let sched = TestScheduler::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        fn tick(sched: TestScheduler, ticks: Arc<AtomicUsize>) {
            if ticks.fetch_add(1, Ordering::SeqCst) + 1 < 5 {
                let again = sched.clone();
                let count = Arc::clone(&ticks);
                sched.schedule_after(Duration::from_millis(100), Box::new(move || tick(again, count)));
            }
        }

        let again = sched.clone();
        let count = Arc::clone(&ticks);
        sched.schedule_after(Duration::from_millis(100), Box::new(move || tick(again, count)));
        sched.advance_by_ms(250);
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        sched.start();
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
        assert_eq!(sched.now_ms(), 500);
    }
}
