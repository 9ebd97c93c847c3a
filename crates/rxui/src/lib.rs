#![forbid(unsafe_code)]

//! rxui: reactive change notification and scheduling for UI state.
//!
//! This facade re-exports the public API of the workspace crates:
//!
//! - [`rxui_core`]: event streams, operators, schedulers, scheduler context.
//! - [`rxui_runtime`]: change-tracking collections, mirrors, observable
//!   commands.
//!
//! Most applications only need the [`prelude`].
//!
//! ```
//! use rxui::prelude::*;
//!
//! let todos: ChangeTrackingCollection<String> =
//!     ChangeTrackingCollection::with_scheduler(ImmediateScheduler::handle());
//! let titles = todos.derive(|t| t.to_uppercase());
//! todos.push("write docs".to_string());
//! assert_eq!(titles.to_vec(), vec!["WRITE DOCS".to_string()]);
//! ```

pub use rxui_core;
pub use rxui_runtime;

pub use rxui_core::{Result, RxError};

/// The commonly used types and extension traits.
pub mod prelude {
    pub use rxui_core::{
        EventStream, ImmediateScheduler, ObservedChange, Observer, RxError, ScheduledRedispatcher,
        Scheduler, SchedulerConfig, SchedulerContext, SchedulerHandle, SchedulerSlot, Stream,
        Subscription, WorkerScheduler,
    };
    pub use rxui_runtime::{
        ChangeKind, ChangeTrackingCollection, Command, CreateCollection, InvokeCommand,
        ItemChangeSource, MirroredCollection, ObservableCommand, StructuralChange, ToCommand,
    };
}
