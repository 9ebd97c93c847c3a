#![forbid(unsafe_code)]

//! Two-slot scheduler registry with thread-local test overrides.
//!
//! A [`SchedulerContext`] answers "which scheduler should deferred (UI-bound)
//! work use, and which should background work use?". Components capture the
//! answer once, at construction.
//!
//! # Resolution
//!
//! 1. The calling thread's override for this `(context, slot)` pair.
//! 2. The context-wide default for the slot.
//! 3. An [`ImmediateScheduler`].
//!
//! # Writes
//!
//! Outside test mode, [`SchedulerContext::set`] replaces the context-wide
//! default. In test mode it stores a thread-local override instead, and only
//! promotes the value to the context-wide default when none exists yet.
//! Tests running in parallel on different threads therefore never observe
//! each other's schedulers.
//!
//! # Invariants
//!
//! 1. Overrides on one thread never affect another.
//! 2. Overrides of one context never affect another context.
//! 3. Resolution never fails.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

use crate::config::SchedulerConfig;
use crate::scheduler::{ImmediateScheduler, SchedulerHandle, WorkerScheduler};
use crate::sync::{read, write};

/// The two scheduler slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerSlot {
    /// Work that must run on the UI-bound context.
    Deferred,
    /// Work that may run on any worker thread.
    Background,
}

impl SchedulerSlot {
    const fn index(self) -> usize {
        match self {
            Self::Deferred => 0,
            Self::Background => 1,
        }
    }
}

thread_local! {
    static OVERRIDES: RefCell<HashMap<(u64, SchedulerSlot), SchedulerHandle>> =
        RefCell::new(HashMap::new());
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);
static GLOBAL: OnceLock<SchedulerContext> = OnceLock::new();

/// Scheduler registry passed to components at construction.
pub struct SchedulerContext {
    id: u64,
    config: SchedulerConfig,
    defaults: RwLock<[Option<SchedulerHandle>; 2]>,
}

impl std::fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let defaults = read(&self.defaults);
        let names: Vec<Option<&str>> = defaults
            .iter()
            .map(|slot| slot.as_ref().map(|s| s.name()))
            .collect();
        f.debug_struct("SchedulerContext")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("defaults", &names)
            .finish()
    }
}

impl SchedulerContext {
    /// Context with no defaults: every slot resolves to an immediate
    /// scheduler until one is set.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            config,
            defaults: RwLock::new([None, None]),
        }
    }

    /// Context with the standard defaults: an immediate deferred scheduler in
    /// test mode and a single-threaded event loop otherwise; a worker pool
    /// for background work.
    pub fn with_default_schedulers(config: SchedulerConfig) -> Self {
        let deferred: SchedulerHandle = if config.test_mode() {
            ImmediateScheduler::handle()
        } else {
            spawn_or_immediate(WorkerScheduler::event_loop(config.deferred_thread_name()))
        };
        let background = spawn_or_immediate(WorkerScheduler::pool(
            config.background_thread_name(),
            config.background_threads(),
        ));
        let ctx = Self::new(config);
        {
            let mut defaults = write(&ctx.defaults);
            defaults[SchedulerSlot::Deferred.index()] = Some(deferred);
            defaults[SchedulerSlot::Background.index()] = Some(background);
        }
        ctx
    }

    /// Process-wide context, created on first use from
    /// [`SchedulerConfig::from_env`] unless one was installed earlier.
    pub fn global() -> &'static SchedulerContext {
        GLOBAL.get_or_init(|| Self::with_default_schedulers(SchedulerConfig::from_env()))
    }

    /// The process-wide context if it already exists. Never creates one.
    pub fn try_global() -> Option<&'static SchedulerContext> {
        GLOBAL.get()
    }

    /// Install the process-wide context. Fails (returning `ctx`) once the
    /// global context exists.
    pub fn install_global(ctx: SchedulerContext) -> Result<&'static SchedulerContext, SchedulerContext> {
        GLOBAL.set(ctx)?;
        Ok(Self::global())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Whether writes currently go to thread-local overrides.
    pub fn test_mode(&self) -> bool {
        self.config.test_mode()
    }

    /// Resolve the scheduler for `slot`.
    pub fn get(&self, slot: SchedulerSlot) -> SchedulerHandle {
        self.override_for(slot)
            .or_else(|| self.default_for(slot))
            .unwrap_or_else(ImmediateScheduler::handle)
    }

    /// Resolve the deferred slot.
    pub fn deferred(&self) -> SchedulerHandle {
        self.get(SchedulerSlot::Deferred)
    }

    /// Resolve the background slot.
    pub fn background(&self) -> SchedulerHandle {
        self.get(SchedulerSlot::Background)
    }

    /// Assign `scheduler` to `slot` following the test-mode write rules.
    pub fn set(&self, slot: SchedulerSlot, scheduler: SchedulerHandle) {
        if self.test_mode() {
            tracing::trace!(context = self.id, ?slot, scheduler = scheduler.name(), "thread-local scheduler override");
            let promote = scheduler.clone();
            let _ = self.swap_override(slot, Some(scheduler));
            let mut defaults = write(&self.defaults);
            defaults[slot.index()].get_or_insert(promote);
        } else {
            tracing::trace!(context = self.id, ?slot, scheduler = scheduler.name(), "context scheduler default");
            write(&self.defaults)[slot.index()] = Some(scheduler);
        }
    }

    pub fn set_deferred(&self, scheduler: SchedulerHandle) {
        self.set(SchedulerSlot::Deferred, scheduler);
    }

    pub fn set_background(&self, scheduler: SchedulerHandle) {
        self.set(SchedulerSlot::Background, scheduler);
    }

    /// The context-wide default, ignoring overrides.
    pub fn default_for(&self, slot: SchedulerSlot) -> Option<SchedulerHandle> {
        read(&self.defaults)[slot.index()].clone()
    }

    /// The calling thread's override, if any.
    pub fn override_for(&self, slot: SchedulerSlot) -> Option<SchedulerHandle> {
        OVERRIDES.with(|map| map.borrow().get(&(self.id, slot)).cloned())
    }

    /// Exchange the calling thread's raw override for `slot`, returning the
    /// previous one. Bypasses the test-mode rules.
    pub fn swap_override(
        &self,
        slot: SchedulerSlot,
        scheduler: Option<SchedulerHandle>,
    ) -> Option<SchedulerHandle> {
        OVERRIDES.with(|map| {
            let mut map = map.borrow_mut();
            match scheduler {
                Some(scheduler) => map.insert((self.id, slot), scheduler),
                None => map.remove(&(self.id, slot)),
            }
        })
    }
}

impl Drop for SchedulerContext {
    fn drop(&mut self) {
        // Overrides left on other threads are keyed by an id that is never
        // reused, so only the current thread needs tidying.
        let id = self.id;
        let _ = OVERRIDES.try_with(|map| {
            map.borrow_mut().retain(|(ctx, _), _| *ctx != id);
        });
    }
}

fn spawn_or_immediate(spawned: std::io::Result<WorkerScheduler>) -> SchedulerHandle {
    match spawned {
        Ok(worker) => worker.into_handle(),
        Err(err) => {
            tracing::warn!(error = %err, "failed to start worker scheduler; using immediate");
            ImmediateScheduler::handle()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn named(name: &'static str) -> SchedulerHandle {
        struct Named(&'static str);
        impl crate::scheduler::Scheduler for Named {
            fn name(&self) -> &str {
                self.0
            }
            fn now(&self) -> std::time::Duration {
                std::time::Duration::ZERO
            }
            fn schedule_after(
                &self,
                _delay: std::time::Duration,
                work: crate::scheduler::Work,
            ) -> crate::scheduler::ScheduledWork {
                work();
                crate::scheduler::ScheduledWork::new()
            }
        }
        Arc::new(Named(name))
    }

    #[test]
    fn empty_context_resolves_to_immediate() {
        let ctx = SchedulerContext::new(SchedulerConfig::default());
        assert_eq!(ctx.deferred().name(), "immediate");
        assert_eq!(ctx.background().name(), "immediate");
    }

    #[test]
    fn production_write_replaces_default() {
        let ctx = SchedulerContext::new(SchedulerConfig::default());
        ctx.set_deferred(named("a"));
        ctx.set_deferred(named("b"));
        assert_eq!(ctx.deferred().name(), "b");
        assert!(ctx.override_for(SchedulerSlot::Deferred).is_none());
    }

    #[test]
    fn test_mode_write_is_thread_local_and_promotes_once() {
        let ctx = Arc::new(SchedulerContext::new(SchedulerConfig::for_tests()));
        ctx.set_deferred(named("first"));
        ctx.set_deferred(named("second"));
        assert_eq!(ctx.deferred().name(), "second");
        assert_eq!(ctx.default_for(SchedulerSlot::Deferred).map(|s| s.name().to_string()), Some("first".to_string()));

        let other = Arc::clone(&ctx);
        let seen = thread::spawn(move || other.deferred().name().to_string())
            .join()
            .unwrap();
        assert_eq!(seen, "first");
    }

    #[test]
    fn overrides_are_scoped_to_their_context() {
        let a = SchedulerContext::new(SchedulerConfig::for_tests());
        let b = SchedulerContext::new(SchedulerConfig::for_tests());
        let _ = a.swap_override(SchedulerSlot::Background, Some(named("only-a")));
        assert_eq!(a.background().name(), "only-a");
        assert_eq!(b.background().name(), "immediate");
    }

    #[test]
    fn swap_override_returns_previous() {
        let ctx = SchedulerContext::new(SchedulerConfig::default());
        assert!(ctx.swap_override(SchedulerSlot::Deferred, Some(named("x"))).is_none());
        let previous = ctx.swap_override(SchedulerSlot::Deferred, None);
        assert_eq!(previous.map(|s| s.name().to_string()), Some("x".to_string()));
        assert_eq!(ctx.deferred().name(), "immediate");
    }

    #[test]
    fn default_schedulers_in_test_mode_make_deferred_immediate() {
        let ctx = SchedulerContext::with_default_schedulers(SchedulerConfig::for_tests());
        assert_eq!(ctx.deferred().name(), "immediate");
        assert_eq!(ctx.background().name(), "rxui-background");
    }
}
