#![forbid(unsafe_code)]

//! Observable ordered collection.
//!
//! # Design
//!
//! Every mutation produces two raw signals:
//!
//! 1. a [`BeforeChange`] on the mutating thread, before the edit is applied;
//! 2. a [`StructuralChange`] right after the edit is applied.
//!
//! All public notification streams are derived from these two raw streams.
//! The "before" family stays synchronous so observers can inspect the
//! collection before it changes. The "after" family is re-dispatched on the
//! collection's deferred scheduler, captured at construction, so every
//! subscriber observes changes in one consistent order on one execution
//! context.
//!
//! # Invariants
//!
//! 1. Items and their per-item watchers stay index-aligned.
//! 2. No internal lock is held while observer callbacks run.
//! 3. While a [`SuppressionGuard`] is alive, derived streams emit nothing;
//!    the edit itself and [`ChangeTrackingCollection::structural_changes`]
//!    are never blocked. The gate is checked when the raw signal fires.
//! 4. A panicking observer never prevents the owning mutation from
//!    completing and never leaks a suppression count.
//!
//! # Concurrency
//!
//! Reads and notification delivery are thread-safe. Mutations of one
//! collection must be serialized by the caller; each mutation only locks
//! the item storage for its structural step.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use rxui_core::sync::lock;
use rxui_core::{
    EventStream, ObservedChange, Result, RxError, ScheduledRedispatcher, SchedulerContext,
    SchedulerHandle, Stream, Subscription,
};

use super::change::{
    BeforeChange, ChangeKind, ChangeSender, ChangeValue, CollectionChange, CollectionId,
    ITEMS_PROPERTY, ItemChange, ItemChangeSource, StructuralChange,
};

struct Slots<T> {
    items: Vec<T>,
    watchers: Vec<Option<Subscription>>,
}

struct Tracking<T> {
    enabled: bool,
    source: Option<Arc<dyn ItemChangeSource<T>>>,
}

struct Inner<T> {
    id: CollectionId,
    scheduler: SchedulerHandle,
    state: Mutex<Slots<T>>,
    tracking: Mutex<Tracking<T>>,
    suppressed: Arc<AtomicUsize>,
    before: EventStream<BeforeChange<T>>,
    structural: EventStream<StructuralChange<T>>,
    item_changing: EventStream<ItemChange<T>>,
    item_changed_raw: EventStream<ItemChange<T>>,
    items_added: ScheduledRedispatcher<T>,
    items_removed: ScheduledRedispatcher<T>,
    item_changed: ScheduledRedispatcher<ItemChange<T>>,
}

/// Ordered, mutable sequence that publishes its changes as streams.
///
/// Cloning yields another handle to the same collection. Dropping the last
/// handle releases every subscription the collection owns.
pub struct ChangeTrackingCollection<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ChangeTrackingCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ChangeTrackingCollection<T> {
    /// Identity of this collection.
    pub fn id(&self) -> CollectionId {
        self.inner.id
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        lock(&self.inner.state).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` over the current items.
    ///
    /// The item lock is held while `f` runs, so `f` must not mutate this
    /// collection.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&lock(&self.inner.state).items)
    }

    /// Whether derived notifications are currently delivered.
    pub fn notifications_enabled(&self) -> bool {
        self.inner.suppressed.load(Ordering::Acquire) == 0
    }

    /// Scheduler the "after" streams are delivered on.
    pub fn scheduler(&self) -> SchedulerHandle {
        Arc::clone(&self.inner.scheduler)
    }

    /// Withhold derived notifications until the guard drops. Guards nest.
    pub fn suppress_change_notifications(&self) -> SuppressionGuard {
        let depth = self.inner.suppressed.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(collection = %self.inner.id, depth, "change notifications suppressed");
        SuppressionGuard {
            counter: Arc::clone(&self.inner.suppressed),
        }
    }

    /// Whether per-item change tracking is on.
    pub fn change_tracking(&self) -> bool {
        lock(&self.inner.tracking).enabled
    }

    /// Number of items that currently have a live change watcher.
    pub fn watched_items(&self) -> usize {
        lock(&self.inner.state)
            .watchers
            .iter()
            .filter(|w| w.is_some())
            .count()
    }
}

impl<T> std::fmt::Debug for ChangeTrackingCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeTrackingCollection")
            .field("id", &self.inner.id)
            .field("len", &self.len())
            .field("notifications_enabled", &self.notifications_enabled())
            .finish()
    }
}

/// `stream` minus whatever it emits while `suppressed` is nonzero.
fn gated<X: Send + Sync + 'static>(stream: Stream<X>, suppressed: &Arc<AtomicUsize>) -> Stream<X> {
    let suppressed = Arc::clone(suppressed);
    stream.filter(move |_| suppressed.load(Ordering::Acquire) == 0)
}

impl<T: Clone + Send + Sync + 'static> ChangeTrackingCollection<T> {
    /// Empty collection on the global context's deferred scheduler.
    pub fn new() -> Self {
        Self::new_in(SchedulerContext::global())
    }

    /// Empty collection on `ctx`'s deferred scheduler.
    pub fn new_in(ctx: &SchedulerContext) -> Self {
        Self::with_scheduler(ctx.deferred())
    }

    /// Empty collection delivering "after" notifications on `scheduler`.
    pub fn with_scheduler(scheduler: SchedulerHandle) -> Self {
        let suppressed = Arc::new(AtomicUsize::new(0));
        let structural: EventStream<StructuralChange<T>> = EventStream::new();
        let visible = gated(structural.stream(), &suppressed);

        let items_added = ScheduledRedispatcher::connected(
            &visible.flat_map(|change: &StructuralChange<T>| change.new_item.clone()),
            Arc::clone(&scheduler),
        );
        let items_removed = ScheduledRedispatcher::connected(
            &visible.flat_map(|change: &StructuralChange<T>| change.old_item.clone()),
            Arc::clone(&scheduler),
        );

        let item_changed_raw = EventStream::new();
        let item_changed = ScheduledRedispatcher::connected(
            &gated(item_changed_raw.stream(), &suppressed),
            Arc::clone(&scheduler),
        );

        Self {
            inner: Arc::new(Inner {
                id: CollectionId::next(),
                scheduler,
                state: Mutex::new(Slots {
                    items: Vec::new(),
                    watchers: Vec::new(),
                }),
                tracking: Mutex::new(Tracking {
                    enabled: false,
                    source: None,
                }),
                suppressed,
                before: EventStream::new(),
                structural,
                item_changing: EventStream::new(),
                item_changed_raw,
                items_added,
                items_removed,
                item_changed,
            }),
        }
    }

    /// Collection pre-populated with `items` on the global deferred
    /// scheduler. The initial items raise no observable notifications.
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let collection = Self::new();
        collection.extend(items);
        collection
    }

    /// Pre-populated collection delivering on `scheduler`.
    pub fn from_items_with_scheduler(
        items: impl IntoIterator<Item = T>,
        scheduler: SchedulerHandle,
    ) -> Self {
        let collection = Self::with_scheduler(scheduler);
        collection.extend(items);
        collection
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Insert `item` at `index` (`0..=len`).
    ///
    /// # Errors
    ///
    /// [`RxError::OutOfRange`] when `index > len`; the collection is left
    /// untouched.
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.insert_at(Some(index), item)
    }

    /// Append `item`.
    pub fn push(&self, item: T) {
        // Appending always has a valid index.
        let _ = self.insert_at(None, item);
    }

    /// Append every item, one notification set per item.
    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    fn insert_at(&self, index: Option<usize>, item: T) -> Result<()> {
        let len = self.len();
        let index = index.unwrap_or(len);
        if index > len {
            return Err(RxError::OutOfRange { index, len });
        }
        self.inner.before.next(BeforeChange::Adding {
            item: item.clone(),
            count: len,
        });
        let watcher = self.inner.watch(&item);
        let change = {
            let mut state = lock(&self.inner.state);
            let len = state.items.len();
            if index > len {
                return Err(RxError::OutOfRange { index, len });
            }
            state.items.insert(index, item.clone());
            state.watchers.insert(index, watcher);
            StructuralChange::add(index, item, state.items.len())
        };
        tracing::trace!(collection = %self.inner.id, index, "item added");
        self.inner.structural.next(change);
        Ok(())
    }

    /// Remove and return the item at `index`.
    ///
    /// # Errors
    ///
    /// [`RxError::OutOfRange`] when `index >= len`.
    pub fn remove_at(&self, index: usize) -> Result<T> {
        let (current, len) = {
            let state = lock(&self.inner.state);
            let len = state.items.len();
            match state.items.get(index) {
                Some(item) => (item.clone(), len),
                None => return Err(RxError::OutOfRange { index, len }),
            }
        };
        self.inner.before.next(BeforeChange::Removing {
            item: current,
            count: len,
        });
        let (removed, watcher, change) = {
            let mut state = lock(&self.inner.state);
            let len = state.items.len();
            if index >= len {
                return Err(RxError::OutOfRange { index, len });
            }
            let removed = state.items.remove(index);
            let watcher = state.watchers.remove(index);
            let change = StructuralChange::remove(index, removed.clone(), state.items.len());
            (removed, watcher, change)
        };
        drop(watcher);
        tracing::trace!(collection = %self.inner.id, index, "item removed");
        self.inner.structural.next(change);
        Ok(removed)
    }

    /// Replace the item at `index`, returning the previous one.
    ///
    /// # Errors
    ///
    /// [`RxError::OutOfRange`] when `index >= len`.
    pub fn replace(&self, index: usize, item: T) -> Result<T> {
        let (current, len) = {
            let state = lock(&self.inner.state);
            let len = state.items.len();
            match state.items.get(index) {
                Some(existing) => (existing.clone(), len),
                None => return Err(RxError::OutOfRange { index, len }),
            }
        };
        self.inner.before.next(BeforeChange::Removing {
            item: current,
            count: len,
        });
        self.inner.before.next(BeforeChange::Adding {
            item: item.clone(),
            count: len,
        });
        let watcher = self.inner.watch(&item);
        let (old, old_watcher, change) = {
            let mut state = lock(&self.inner.state);
            let len = state.items.len();
            if index >= len {
                return Err(RxError::OutOfRange { index, len });
            }
            let old = std::mem::replace(&mut state.items[index], item.clone());
            let old_watcher = std::mem::replace(&mut state.watchers[index], watcher);
            let change = StructuralChange::replace(index, old.clone(), item, len);
            (old, old_watcher, change)
        };
        drop(old_watcher);
        tracing::trace!(collection = %self.inner.id, index, "item replaced");
        self.inner.structural.next(change);
        Ok(old)
    }

    /// Remove every item. Raises a single clearing notice and a `Reset`;
    /// the removed items are returned to the caller rather than reported on
    /// `items_removed`. Their change watchers are released.
    pub fn clear(&self) -> Vec<T> {
        let len = self.len();
        self.inner.before.next(BeforeChange::Clearing { count: len });
        let (items, watchers) = {
            let mut state = lock(&self.inner.state);
            (
                std::mem::take(&mut state.items),
                std::mem::take(&mut state.watchers),
            )
        };
        drop(watchers);
        tracing::trace!(collection = %self.inner.id, removed = items.len(), "collection cleared");
        self.inner.structural.next(StructuralChange::reset());
        items
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Clone of the item at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        lock(&self.inner.state).items.get(index).cloned()
    }

    /// Snapshot of every item, in order.
    pub fn to_vec(&self) -> Vec<T> {
        lock(&self.inner.state).items.clone()
    }

    // ------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------

    /// Every structural edit, unfiltered by suppression and delivered
    /// synchronously.
    pub fn structural_changes(&self) -> Stream<StructuralChange<T>> {
        self.inner.structural.stream()
    }

    /// One value per added item (`Add` and the new side of `Replace`).
    pub fn items_added(&self) -> Stream<T> {
        self.inner.items_added.stream()
    }

    /// One value per removed item (`Remove` and the old side of `Replace`).
    /// `clear` reports nothing here.
    pub fn items_removed(&self) -> Stream<T> {
        self.inner.items_removed.stream()
    }

    /// Synchronous notice before an item is added.
    pub fn before_items_added(&self) -> Stream<T> {
        self.gated_before().filter_map(|change| match change {
            BeforeChange::Adding { item, .. } => Some(item.clone()),
            _ => None,
        })
    }

    /// Synchronous notice before an item is removed.
    pub fn before_items_removed(&self) -> Stream<T> {
        self.gated_before().filter_map(|change| match change {
            BeforeChange::Removing { item, .. } => Some(item.clone()),
            _ => None,
        })
    }

    /// Pre-mutation count, once per before-add, before-remove, and clear.
    pub fn collection_count_changing(&self) -> Stream<usize> {
        self.gated_before().map(BeforeChange::count)
    }

    /// Post-mutation count, skipping repeats of the last reported value.
    pub fn collection_count_changed(&self) -> Stream<usize> {
        gated(self.inner.structural.stream(), &self.inner.suppressed)
            .map(|change| change.count)
            .distinct_until_changed()
            .observe_on(self.scheduler())
    }

    /// Synchronous item-level "about to change" records.
    pub fn item_changing(&self) -> Stream<ItemChange<T>> {
        gated(self.inner.item_changing.stream(), &self.inner.suppressed)
    }

    /// Item-level "changed" records, on the deferred scheduler.
    pub fn item_changed(&self) -> Stream<ItemChange<T>> {
        self.inner.item_changed.stream()
    }

    /// Collection-level and item-level "about to change" records, delivered
    /// synchronously.
    pub fn changing(&self) -> Stream<CollectionChange<T>> {
        let weak = Arc::downgrade(&self.inner);
        let collection_level = self
            .gated_before()
            .filter_map(move |_| collection_change(&weak));
        let item_level = self.item_changing().map(item_change);
        collection_level.merge_with(&item_level)
    }

    /// Collection-level and item-level "changed" records on the deferred
    /// scheduler. Adds, removes, and resets produce one collection-level
    /// record each; a replace produces two.
    pub fn changed(&self) -> Stream<CollectionChange<T>> {
        let weak = Arc::downgrade(&self.inner);
        let collection_level = gated(self.inner.structural.stream(), &self.inner.suppressed)
            .flat_map(move |change: &StructuralChange<T>| {
                let records = match change.kind {
                    ChangeKind::Replace => 2,
                    ChangeKind::Add | ChangeKind::Remove | ChangeKind::Reset => 1,
                };
                (0..records)
                    .filter_map(|_| collection_change(&weak))
                    .collect::<Vec<_>>()
            });
        let item_level =
            gated(self.inner.item_changed_raw.stream(), &self.inner.suppressed).map(item_change);
        collection_level
            .merge_with(&item_level)
            .observe_on(self.scheduler())
    }

    fn gated_before(&self) -> Stream<BeforeChange<T>> {
        gated(self.inner.before.stream(), &self.inner.suppressed)
    }

    // ------------------------------------------------------------------
    // Item-level tracking
    // ------------------------------------------------------------------

    /// Install the capability used to watch individual items. Rebuilds the
    /// watchers when tracking is on.
    pub fn set_item_change_source(&self, source: Arc<dyn ItemChangeSource<T>>) {
        let enabled = {
            let mut tracking = lock(&self.inner.tracking);
            tracking.source = Some(source);
            tracking.enabled
        };
        if enabled {
            self.rewatch();
        }
    }

    /// Turn per-item change tracking on or off.
    pub fn set_change_tracking(&self, enabled: bool) {
        let was = std::mem::replace(&mut lock(&self.inner.tracking).enabled, enabled);
        if was == enabled {
            return;
        }
        tracing::debug!(collection = %self.inner.id, enabled, "item change tracking toggled");
        if enabled {
            self.rewatch();
        } else {
            let released = {
                let mut state = lock(&self.inner.state);
                let len = state.items.len();
                std::mem::replace(&mut state.watchers, (0..len).map(|_| None).collect())
            };
            drop(released);
        }
    }

    fn rewatch(&self) {
        let items = self.to_vec();
        let mut fresh: Vec<Option<Subscription>> =
            items.iter().map(|item| self.inner.watch(item)).collect();
        let released = {
            let mut state = lock(&self.inner.state);
            fresh.resize_with(state.items.len(), || None);
            std::mem::replace(&mut state.watchers, fresh)
        };
        drop(released);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ChangeTrackingCollection<T> {
    /// Remove the first item equal to `item`. Returns whether one was found.
    pub fn remove(&self, item: &T) -> bool {
        let position = lock(&self.inner.state)
            .items
            .iter()
            .position(|existing| existing == item);
        position.is_some_and(|index| self.remove_at(index).is_ok())
    }
}

impl<T: Clone + Send + Sync + 'static> Inner<T> {
    /// Subscribe to `item`'s change streams when tracking is on.
    fn watch(&self, item: &T) -> Option<Subscription> {
        let source = {
            let tracking = lock(&self.tracking);
            if !tracking.enabled {
                return None;
            }
            tracking.source.clone()?
        };
        let changing = source.changing(item).map(|stream| {
            let sink = self.item_changing.clone();
            stream.subscribe(move |change| sink.emit(change))
        });
        let changed = source.changed(item).map(|stream| {
            let sink = self.item_changed_raw.clone();
            stream.subscribe(move |change| sink.emit(change))
        });
        match (changing, changed) {
            (Some(a), Some(b)) => Some(a.and(b)),
            (a, b) => a.or(b),
        }
    }
}

fn collection_change<T>(weak: &Weak<Inner<T>>) -> Option<CollectionChange<T>> {
    let inner = weak.upgrade()?;
    let id = inner.id;
    Some(ObservedChange::new(
        ChangeSender::Collection(id),
        ITEMS_PROPERTY,
        ChangeValue::Collection(ChangeTrackingCollection { inner }),
    ))
}

fn item_change<T: Clone>(change: &ItemChange<T>) -> CollectionChange<T> {
    ObservedChange::new(
        ChangeSender::Item(change.sender.clone()),
        change.property_name.clone(),
        ChangeValue::Property(change.value.clone()),
    )
}

impl<T: Clone + Send + Sync + 'static> Default for ChangeTrackingCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> FromIterator<T> for ChangeTrackingCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_items(iter)
    }
}

/// Keeps change notifications suppressed while alive.
#[must_use = "notifications resume as soon as the guard is dropped"]
pub struct SuppressionGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for SuppressionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for SuppressionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuppressionGuard")
            .field("depth", &self.counter.load(Ordering::Acquire))
            .finish()
    }
}
