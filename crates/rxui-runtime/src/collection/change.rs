#![forbid(unsafe_code)]

//! Change records emitted by [`ChangeTrackingCollection`].

use std::sync::atomic::{AtomicU64, Ordering};

use rxui_core::{ObservedChange, PropertyValue, Stream};

use super::tracking::ChangeTrackingCollection;

/// Property name carried by collection-level [`ObservedChange`]s.
pub const ITEMS_PROPERTY: &str = "Items";

/// Kind of structural edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Remove,
    Replace,
    Reset,
}

/// One structural edit, emitted after it was applied.
///
/// `Add` carries only `new_item`, `Remove` only `old_item`, `Replace` both
/// (at the same index), `Reset` neither. `count` is the length after the
/// edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralChange<T> {
    pub kind: ChangeKind,
    pub index: usize,
    pub old_item: Option<T>,
    pub new_item: Option<T>,
    pub count: usize,
}

impl<T> StructuralChange<T> {
    pub fn add(index: usize, item: T, count: usize) -> Self {
        Self {
            kind: ChangeKind::Add,
            index,
            old_item: None,
            new_item: Some(item),
            count,
        }
    }

    pub fn remove(index: usize, item: T, count: usize) -> Self {
        Self {
            kind: ChangeKind::Remove,
            index,
            old_item: Some(item),
            new_item: None,
            count,
        }
    }

    pub fn replace(index: usize, old: T, new: T, count: usize) -> Self {
        Self {
            kind: ChangeKind::Replace,
            index,
            old_item: Some(old),
            new_item: Some(new),
            count,
        }
    }

    pub fn reset() -> Self {
        Self {
            kind: ChangeKind::Reset,
            index: 0,
            old_item: None,
            new_item: None,
            count: 0,
        }
    }
}

/// Synchronous pre-mutation notice. `count` is the length before the edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeforeChange<T> {
    Adding { item: T, count: usize },
    Removing { item: T, count: usize },
    Clearing { count: usize },
}

impl<T> BeforeChange<T> {
    pub fn count(&self) -> usize {
        match self {
            Self::Adding { count, .. } | Self::Removing { count, .. } | Self::Clearing { count } => {
                *count
            }
        }
    }
}

/// Process-unique collection identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionId(u64);

impl CollectionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "collection#{}", self.0)
    }
}

/// Item-level property change.
pub type ItemChange<T> = ObservedChange<T, PropertyValue>;

/// Who raised a [`CollectionChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSender<T> {
    Collection(CollectionId),
    Item(T),
}

impl<T> ChangeSender<T> {
    /// Whether the change is collection-level (`"Items"`).
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection(_))
    }
}

/// Value carried by a [`CollectionChange`].
pub enum ChangeValue<T> {
    /// The collection itself (collection-level events).
    Collection(ChangeTrackingCollection<T>),
    /// An item's new property value (item-level events).
    Property(PropertyValue),
}

impl<T> Clone for ChangeValue<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Collection(collection) => Self::Collection(collection.clone()),
            Self::Property(value) => Self::Property(value.clone()),
        }
    }
}

impl<T> std::fmt::Debug for ChangeValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Collection(collection) => f.debug_tuple("Collection").field(&collection.id()).finish(),
            Self::Property(_) => f.write_str("Property(..)"),
        }
    }
}

/// Unified change record of the `changing`/`changed` streams.
pub type CollectionChange<T> = ObservedChange<ChangeSender<T>, ChangeValue<T>>;

/// Optional per-item change capability.
///
/// A collection with change tracking enabled asks its source for each item's
/// streams when the item enters the collection and drops the subscriptions
/// when it leaves. Items without the capability return `None`.
pub trait ItemChangeSource<T>: Send + Sync {
    /// Stream of "property about to change" records for `item`.
    fn changing(&self, item: &T) -> Option<Stream<ItemChange<T>>>;

    /// Stream of "property changed" records for `item`.
    fn changed(&self, item: &T) -> Option<Stream<ItemChange<T>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_constructors_fill_the_right_side() {
        let add = StructuralChange::add(0, 'a', 1);
        assert_eq!((add.old_item, add.new_item), (None, Some('a')));
        let remove = StructuralChange::remove(0, 'a', 0);
        assert_eq!((remove.old_item, remove.new_item), (Some('a'), None));
        let replace = StructuralChange::replace(2, 'a', 'b', 3);
        assert_eq!((replace.old_item, replace.new_item), (Some('a'), Some('b')));
        let reset = StructuralChange::<char>::reset();
        assert_eq!(reset.kind, ChangeKind::Reset);
        assert!(reset.old_item.is_none() && reset.new_item.is_none());
    }

    #[test]
    fn before_change_count() {
        assert_eq!(BeforeChange::Adding { item: 1, count: 4 }.count(), 4);
        assert_eq!(BeforeChange::<i32>::Clearing { count: 9 }.count(), 9);
    }

    #[test]
    fn collection_ids_are_unique() {
        assert_ne!(CollectionId::next(), CollectionId::next());
    }
}
