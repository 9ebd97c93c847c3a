#![forbid(unsafe_code)]

//! Core: event streams, operators, schedulers, and scheduler context.
//!
//! # Role in rxui
//! `rxui-core` is the stream layer. It owns the push-based stream model
//! (`EventStream`, `Stream`, `Subscription`), the scheduler capability and
//! its built-in implementations, and the scheduler context that decides
//! where deferred and background work runs.
//!
//! # Primary responsibilities
//! - **EventStream**: multicast publish channel with RAII subscriptions.
//! - **Stream operators**: `map`, `filter`, `distinct_until_changed`,
//!   `observe_on`, `merge`, and friends.
//! - **Schedulers**: immediate, event-loop, and worker-pool execution.
//! - **ScheduledRedispatcher**: scheduled multicast relay.
//! - **SchedulerContext**: deferred/background slot registry with
//!   thread-local test overrides.
//!
//! # How it fits in the system
//! `rxui-runtime` builds change-tracking collections and commands on top of
//! these primitives. `rxui-harness` supplies deterministic schedulers that
//! plug into the same `Scheduler` trait.

pub mod change;
pub mod config;
pub mod context;
pub mod error;
pub mod operators;
pub mod redispatch;
pub mod scheduler;
pub mod stream;
pub mod subject;
pub mod subscription;
pub mod sync;

pub use change::{ObservedChange, PropertyValue, property_value};
pub use config::SchedulerConfig;
pub use context::{SchedulerContext, SchedulerSlot};
pub use error::{Result, RxError};
pub use redispatch::ScheduledRedispatcher;
pub use scheduler::{
    ImmediateScheduler, ScheduledWork, Scheduler, SchedulerHandle, Work, WorkerScheduler,
};
pub use stream::{CallbackObserver, Notification, Observable, Observer, ObserverRef, Stream};
pub use subject::EventStream;
pub use subscription::Subscription;
