#![forbid(unsafe_code)]

//! Observable commands.
//!
//! An [`ObservableCommand`] exposes "execute" as a stream of parameters and
//! gates it with an observable enablement predicate.
//!
//! # Enablement
//!
//! The enablement source is multicast through a [`ScheduledRedispatcher`],
//! so every observer sees the same values on the command's scheduler. An
//! internal watcher keeps the latest value (starting at `true`) and fires
//! [`Command::can_execute_changed`] only when that value actually flips.
//!
//! A failing enablement source is logged, treated as a final `false`, and
//! stops further enablement updates. Execution keeps working.
//!
//! # Example
//! ```
//! use rxui_core::{EventStream, ImmediateScheduler};
//! use rxui_runtime::{Command, ObservableCommand};
//!
//! let enabled = EventStream::new();
//! let save: ObservableCommand<String> =
//!     ObservableCommand::new(Some(enabled.stream()), Some(ImmediateScheduler::handle()));
//! assert!(save.can_execute(&String::new()));
//! enabled.next(false);
//! assert!(!save.can_execute(&String::new()));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rxui_core::sync::lock;
use rxui_core::{
    EventStream, RxError, ScheduledRedispatcher, SchedulerContext, SchedulerHandle, Stream,
    Subscription,
};

/// Host-facing command surface.
pub trait Command<P>: Send + Sync {
    /// Whether `parameter` may be executed right now.
    fn can_execute(&self, parameter: &P) -> bool;

    /// Run the command with `parameter`.
    fn execute(&self, parameter: P);

    /// Fires whenever the answer of [`can_execute`](Self::can_execute) may
    /// have changed.
    fn can_execute_changed(&self) -> Stream<()>;
}

/// Command whose executions and enablement are streams.
pub struct ObservableCommand<P> {
    scheduler: SchedulerHandle,
    enablement: ScheduledRedispatcher<bool>,
    latest: Arc<AtomicBool>,
    changed: EventStream<()>,
    executions: ScheduledRedispatcher<P>,
    links: Mutex<Vec<Subscription>>,
    disposed: AtomicBool,
}

impl<P> std::fmt::Debug for ObservableCommand<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableCommand")
            .field("scheduler", &self.scheduler.name())
            .field("can_execute", &self.latest.load(Ordering::Acquire))
            .field("disposed", &self.disposed.load(Ordering::Acquire))
            .finish()
    }
}

impl<P: Clone + Send + Sync + 'static> ObservableCommand<P> {
    /// Command gated by `can_execute` (always enabled when `None`) that
    /// delivers on `scheduler` (the global deferred scheduler when `None`).
    pub fn new(can_execute: Option<Stream<bool>>, scheduler: Option<SchedulerHandle>) -> Self {
        Self::new_in(SchedulerContext::global(), can_execute, scheduler)
    }

    /// Like [`new`](Self::new), defaulting to `ctx`'s deferred scheduler.
    pub fn new_in(
        ctx: &SchedulerContext,
        can_execute: Option<Stream<bool>>,
        scheduler: Option<SchedulerHandle>,
    ) -> Self {
        let scheduler = scheduler.unwrap_or_else(|| ctx.deferred());
        let source = can_execute.unwrap_or_else(|| Stream::just(true));

        let latest = Arc::new(AtomicBool::new(true));
        let changed: EventStream<()> = EventStream::new();
        let enablement = ScheduledRedispatcher::new(Arc::clone(&scheduler));

        let seen = Arc::clone(&latest);
        let notify = changed.clone();
        let watcher = enablement.subscribe(move |value: &bool| {
            if seen.swap(*value, Ordering::AcqRel) != *value {
                notify.next(());
            }
        });

        // The watcher must be attached before connecting so a cold source's
        // initial values are not missed.
        enablement.connect(&source.on_error_return(|err| {
            let fault = RxError::EnablementSourceFaulted(err.to_string());
            tracing::warn!(error = %fault, "command enablement source failed; command disabled");
            false
        }));

        Self {
            executions: ScheduledRedispatcher::new(Arc::clone(&scheduler)),
            scheduler,
            enablement,
            latest,
            changed,
            links: Mutex::new(vec![watcher]),
            disposed: AtomicBool::new(false),
        }
    }

    /// Wrap `host` so it can be used as an [`ObservableCommand`].
    ///
    /// Enablement is re-evaluated with `probe` whenever the host reports a
    /// change, and every execution is forwarded to the host.
    pub fn proxy(host: Arc<dyn Command<P>>, probe: P, scheduler: Option<SchedulerHandle>) -> Self {
        let probed = Arc::clone(&host);
        let enablement = Stream::just(())
            .merge_with(&host.can_execute_changed())
            .map(move |_| probed.can_execute(&probe));
        let command = Self::new(Some(enablement), scheduler);
        let forward = command
            .executions
            .subscribe(move |parameter: &P| host.execute(parameter.clone()));
        lock(&command.links).push(forward);
        command
    }

    /// Stream of executed parameters, on the command's scheduler.
    pub fn executions(&self) -> Stream<P> {
        self.executions.stream()
    }

    /// Subscribe to executions.
    pub fn subscribe(&self, on_execute: impl Fn(&P) + Send + Sync + 'static) -> Subscription {
        self.executions.subscribe(on_execute)
    }

    /// Enablement values with consecutive repeats removed.
    pub fn can_execute_stream(&self) -> Stream<bool> {
        self.enablement.stream().distinct_until_changed()
    }
}

impl<P> ObservableCommand<P> {
    /// Scheduler executions and enablement are delivered on.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Disconnect the enablement source. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(scheduler = self.scheduler.name(), "command disposed");
        self.enablement.disconnect();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<P: Clone + Send + Sync + 'static> Command<P> for ObservableCommand<P> {
    /// The latest de-duplicated enablement value. The parameter is ignored.
    fn can_execute(&self, _parameter: &P) -> bool {
        self.latest.load(Ordering::Acquire)
    }

    /// Publish `parameter` on the execution stream, whether or not the
    /// command is currently enabled.
    fn execute(&self, parameter: P) {
        tracing::debug!(scheduler = self.scheduler.name(), "command executed");
        self.executions.next(parameter);
    }

    fn can_execute_changed(&self) -> Stream<()> {
        self.changed.stream()
    }
}

impl<P> Drop for ObservableCommand<P> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Build a command gated by this stream.
pub trait ToCommand {
    fn to_command<P: Clone + Send + Sync + 'static>(
        &self,
        scheduler: Option<SchedulerHandle>,
    ) -> ObservableCommand<P>;
}

impl ToCommand for Stream<bool> {
    fn to_command<P: Clone + Send + Sync + 'static>(
        &self,
        scheduler: Option<SchedulerHandle>,
    ) -> ObservableCommand<P> {
        ObservableCommand::new(Some(self.clone()), scheduler)
    }
}

/// Execute `command` with each value of `stream` that it currently accepts.
pub fn invoke_command<P, C>(stream: &Stream<P>, command: Arc<C>) -> Subscription
where
    P: Clone + Send + Sync + 'static,
    C: Command<P> + ?Sized + 'static,
{
    stream.subscribe(move |value: &P| {
        if command.can_execute(value) {
            command.execute(value.clone());
        }
    })
}

/// Method form of [`invoke_command`].
pub trait InvokeCommand<P> {
    fn invoke_command<C: Command<P> + ?Sized + 'static>(&self, command: Arc<C>) -> Subscription;
}

impl<P: Clone + Send + Sync + 'static> InvokeCommand<P> for Stream<P> {
    fn invoke_command<C: Command<P> + ?Sized + 'static>(&self, command: Arc<C>) -> Subscription {
        invoke_command(self, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxui_core::ImmediateScheduler;
    use std::sync::atomic::AtomicUsize;

    fn immediate<P: Clone + Send + Sync + 'static>(source: Option<Stream<bool>>) -> ObservableCommand<P> {
        ObservableCommand::new(source, Some(ImmediateScheduler::handle()))
    }

    fn counter(stream: &Stream<()>) -> (Arc<AtomicUsize>, Subscription) {
        let hits = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&hits);
        let sub = stream.subscribe(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        });
        (hits, sub)
    }

    #[test]
    fn without_source_is_always_enabled() {
        let command: ObservableCommand<u8> = immediate(None);
        let (hits, _sub) = counter(&command.can_execute_changed());
        assert!(command.can_execute(&0));
        command.execute(1);
        assert!(command.can_execute(&0));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn changed_fires_only_on_flips() {
        let source = EventStream::new();
        let command: ObservableCommand<()> = immediate(Some(source.stream()));
        let (hits, _sub) = counter(&command.can_execute_changed());
        for value in [true, true, false, false, true] {
            source.next(value);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(command.can_execute(&()));
    }

    #[test]
    fn executions_arrive_in_order_even_when_disabled() {
        let command: ObservableCommand<u32> = immediate(Some(Stream::just(false)));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = command.subscribe(move |p| lock(&sink).push(*p));
        assert!(!command.can_execute(&0));
        for p in 0..4 {
            command.execute(p);
        }
        assert_eq!(*lock(&seen), vec![0, 1, 2, 3]);
    }

    #[test]
    fn source_fault_disables_and_keeps_executing() {
        let source = EventStream::new();
        let command: ObservableCommand<u8> = immediate(Some(source.stream()));
        let (hits, _sub) = counter(&command.can_execute_changed());
        source.error(RxError::source("boom"));
        assert!(!command.can_execute(&0));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        source.next(true);
        assert!(!command.can_execute(&0));

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let _exec = command.subscribe(move |_| flag.store(true, Ordering::SeqCst));
        command.execute(9);
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn dispose_stops_enablement_updates() {
        let source = EventStream::new();
        let command: ObservableCommand<u8> = immediate(Some(source.stream()));
        command.dispose();
        command.dispose();
        assert!(command.is_disposed());
        source.next(false);
        assert!(command.can_execute(&0));
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn invoke_command_skips_rejected_values() {
        let gate = EventStream::new();
        let command = Arc::new(immediate::<i32>(Some(gate.stream())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _exec = command.subscribe(move |p| lock(&sink).push(*p));

        let input = EventStream::new();
        let _link = input.stream().invoke_command(Arc::clone(&command));
        input.next(1);
        gate.next(false);
        input.next(2);
        gate.next(true);
        input.next(3);
        assert_eq!(*lock(&seen), vec![1, 3]);
    }

    #[test]
    fn proxy_follows_and_forwards_to_host() {
        let gate = EventStream::new();
        let host = Arc::new(immediate::<String>(Some(gate.stream())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _exec = host.subscribe(move |p| lock(&sink).push(p.clone()));

        let as_dyn: Arc<dyn Command<String>> = host.clone();
        let proxy = ObservableCommand::proxy(as_dyn, String::new(), Some(ImmediateScheduler::handle()));
        assert!(proxy.can_execute(&String::new()));
        gate.next(false);
        assert!(!proxy.can_execute(&String::new()));

        proxy.execute("go".to_string());
        assert_eq!(*lock(&seen), vec!["go".to_string()]);
    }

    #[test]
    fn to_command_uses_the_stream() {
        let command: ObservableCommand<()> = Stream::just(false).to_command(Some(ImmediateScheduler::handle()));
        assert!(!command.can_execute(&()));
    }
}
