#![forbid(unsafe_code)]

//! Runtime: change-tracking collections and observable commands.
//!
//! # Role in rxui
//! `rxui-runtime` turns ordinary mutable state into streams of change
//! events. It builds on the stream primitives and scheduler context of
//! `rxui-core`.
//!
//! # Primary responsibilities
//! - **ChangeTrackingCollection**: ordered collection with synchronous
//!   "before" streams, scheduled "after" streams, suppression scopes, and
//!   optional per-item change tracking.
//! - **MirroredCollection**: a derived collection that follows its source's
//!   structural edits through a selector.
//! - **StreamCollection**: a collection filled from a stream, optionally
//!   paced.
//! - **ObservableCommand**: execution as a stream, gated by an observable
//!   enablement predicate.
//!
//! # Feature flags
//! - `serde`: serialize collections as plain item sequences.

pub mod collection;
pub mod command;

pub use collection::{
    BeforeChange, ChangeKind, ChangeSender, ChangeTrackingCollection, ChangeValue,
    CollectionChange, CollectionId, CreateCollection, ITEMS_PROPERTY, ItemChange,
    ItemChangeSource, MirroredCollection, StreamCollection, StructuralChange, SuppressionGuard,
    create_collection, mirror, try_mirror,
};
pub use command::{Command, InvokeCommand, ObservableCommand, ToCommand, invoke_command};
