#![forbid(unsafe_code)]

//! Scheduler wrapper that counts what passes through it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rxui_core::{ImmediateScheduler, ScheduledWork, Scheduler, SchedulerHandle, Work};

#[derive(Debug, Default)]
struct Counters {
    scheduled: AtomicU64,
    executed: AtomicU64,
}

/// Delegates to an inner scheduler and records how many units were
/// scheduled and how many actually ran.
#[derive(Clone)]
pub struct CountingScheduler {
    inner: SchedulerHandle,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for CountingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingScheduler")
            .field("inner", &self.inner.name())
            .field("scheduled", &self.scheduled())
            .field("executed", &self.executed())
            .finish()
    }
}

impl CountingScheduler {
    pub fn new(inner: SchedulerHandle) -> Self {
        Self {
            inner,
            counters: Arc::default(),
        }
    }

    /// Counting wrapper around an inline scheduler.
    pub fn immediate() -> Self {
        Self::new(ImmediateScheduler::handle())
    }

    pub fn handle(&self) -> SchedulerHandle {
        Arc::new(self.clone())
    }

    pub fn scheduled(&self) -> u64 {
        self.counters.scheduled.load(Ordering::Acquire)
    }

    pub fn executed(&self) -> u64 {
        self.counters.executed.load(Ordering::Acquire)
    }
}

impl Scheduler for CountingScheduler {
    fn name(&self) -> &str {
        "counting"
    }

    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn schedule_after(&self, delay: Duration, work: Work) -> ScheduledWork {
        self.counters.scheduled.fetch_add(1, Ordering::AcqRel);
        let counters = Arc::clone(&self.counters);
        self.inner.schedule_after(
            delay,
            Box::new(move || {
                counters.executed.fetch_add(1, Ordering::AcqRel);
                work();
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestScheduler;

    #[test]
    fn counts_scheduled_and_executed_separately() {
        let clock = TestScheduler::new();
        let counting = CountingScheduler::new(clock.handle());
        counting.schedule(Box::new(|| {}));
        counting.schedule_after(Duration::from_millis(5), Box::new(|| {}));
        assert_eq!((counting.scheduled(), counting.executed()), (2, 0));
        clock.flush();
        assert_eq!(counting.executed(), 1);
        clock.start();
        assert_eq!(counting.executed(), 2);
    }

    #[test]
    fn immediate_runs_inline() {
        let counting = CountingScheduler::immediate();
        counting.schedule(Box::new(|| {}));
        assert_eq!(counting.executed(), 1);
    }
}
