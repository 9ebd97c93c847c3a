#![forbid(unsafe_code)]

//! Scoped scheduler overrides.
//!
//! A [`SchedulerScope`] installs a thread-local override on a
//! [`SchedulerContext`] and restores whatever was there before when it
//! drops, even if the test panics. Components built inside the scope
//! capture the override.

use rxui_core::{SchedulerConfig, SchedulerContext, SchedulerHandle, SchedulerSlot};

/// RAII guard for one thread-local slot override.
#[must_use = "the override is removed as soon as the scope is dropped"]
pub struct SchedulerScope<'a> {
    ctx: &'a SchedulerContext,
    slot: SchedulerSlot,
    previous: Option<SchedulerHandle>,
}

impl<'a> SchedulerScope<'a> {
    /// Override `slot` of `ctx` on the current thread.
    pub fn enter(ctx: &'a SchedulerContext, slot: SchedulerSlot, scheduler: SchedulerHandle) -> Self {
        tracing::trace!(context = ctx.id(), ?slot, scheduler = scheduler.name(), "scheduler scope entered");
        let previous = ctx.swap_override(slot, Some(scheduler));
        Self {
            ctx,
            slot,
            previous,
        }
    }
}

impl Drop for SchedulerScope<'_> {
    fn drop(&mut self) {
        self.ctx.swap_override(self.slot, self.previous.take());
    }
}

impl std::fmt::Debug for SchedulerScope<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerScope")
            .field("context", &self.ctx.id())
            .field("slot", &self.slot)
            .field("restores", &self.previous.as_ref().map(|s| s.name().to_owned()))
            .finish()
    }
}

/// Run `f` with both slots of `ctx` overridden by `scheduler` on this
/// thread.
pub fn with_scheduler<R>(ctx: &SchedulerContext, scheduler: SchedulerHandle, f: impl FnOnce() -> R) -> R {
    let _deferred = SchedulerScope::enter(ctx, SchedulerSlot::Deferred, scheduler.clone());
    let _background = SchedulerScope::enter(ctx, SchedulerSlot::Background, scheduler);
    f()
}

/// Run `f` with one slot of `ctx` overridden on this thread.
pub fn with_slot<R>(
    ctx: &SchedulerContext,
    slot: SchedulerSlot,
    scheduler: SchedulerHandle,
    f: impl FnOnce() -> R,
) -> R {
    let _scope = SchedulerScope::enter(ctx, slot, scheduler);
    f()
}

/// Make sure the process-wide context runs in test mode.
///
/// Installs a test-mode global context unless one already exists. Returns
/// the global context either way; when another context won the race the
/// returned one may not be in test mode.
pub fn install_test_context() -> &'static SchedulerContext {
    if let Some(global) = SchedulerContext::try_global() {
        return checked_test_mode(global);
    }
    let ctx = SchedulerContext::with_default_schedulers(SchedulerConfig::for_tests());
    match SchedulerContext::install_global(ctx) {
        Ok(global) => global,
        Err(_unused) => checked_test_mode(SchedulerContext::global()),
    }
}

fn checked_test_mode(global: &'static SchedulerContext) -> &'static SchedulerContext {
    if !global.test_mode() {
        tracing::warn!("global scheduler context was created outside test mode");
    }
    global
}
