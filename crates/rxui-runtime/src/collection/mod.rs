#![forbid(unsafe_code)]

//! Change-tracking collections and the collections derived from them.

mod change;
mod from_stream;
mod mirror;
#[cfg(feature = "serde")]
mod persist;
mod tracking;

pub use change::{
    BeforeChange, ChangeKind, ChangeSender, ChangeValue, CollectionChange, CollectionId,
    ITEMS_PROPERTY, ItemChange, ItemChangeSource, StructuralChange,
};
pub use from_stream::{CreateCollection, StreamCollection, create_collection};
pub use mirror::{MirroredCollection, mirror, try_mirror};
pub use tracking::{ChangeTrackingCollection, SuppressionGuard};
