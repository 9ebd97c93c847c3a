#![forbid(unsafe_code)]

//! Derived collections that follow a source collection's structural edits.
//!
//! A mirror starts as `source.map(selector)` and then replays every raw
//! structural change of the source into its own collection:
//!
//! | Source change | Mirror edit |
//! |---------------|-------------|
//! | `Add` at `i` | insert `selector(new)` at `i` |
//! | `Remove` at `i` | remove at `i` |
//! | `Replace` at `i` | remove at `i`, then insert `selector(new)` at `i` |
//! | `Reset` | clear |
//!
//! The mirror subscribes to the raw structural stream, so the source's
//! suppression scopes never pause it. Suppressing the mirror's own
//! notifications is a separate matter handled on the mirror collection.
//!
//! # Failure Modes
//!
//! A selector failure (or an edit the mirror cannot apply) records the
//! error, logs it, and stops following. The mirror keeps its last
//! consistent contents; recreate it to resume.

use std::fmt::Display;
use std::ops::Deref;
use std::sync::{Arc, Mutex, Weak};

use rxui_core::sync::lock;
use rxui_core::{Result, RxError, Subscription};

use super::change::{ChangeKind, StructuralChange};
use super::tracking::ChangeTrackingCollection;

/// A collection kept in sync with a transform of another collection.
pub struct MirroredCollection<U> {
    target: ChangeTrackingCollection<U>,
    following: Arc<Mutex<Option<Subscription>>>,
    fault: Arc<Mutex<Option<RxError>>>,
}

impl<U> std::fmt::Debug for MirroredCollection<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredCollection")
            .field("target", &self.target)
            .field("following", &self.is_following())
            .field("fault", &*lock(&self.fault))
            .finish()
    }
}

impl<U> MirroredCollection<U> {
    /// The mirrored collection.
    pub fn collection(&self) -> &ChangeTrackingCollection<U> {
        &self.target
    }

    /// Whether the mirror still follows its source.
    pub fn is_following(&self) -> bool {
        lock(&self.following)
            .as_ref()
            .is_some_and(|sub| !sub.is_closed())
    }

    /// The error that stopped the mirror, if any.
    pub fn fault(&self) -> Option<RxError> {
        lock(&self.fault).clone()
    }

    /// Stop following the source. The contents stay as they are.
    pub fn stop(&self) {
        let following = lock(&self.following).take();
        drop(following);
    }
}

impl<U> Drop for MirroredCollection<U> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<U> Deref for MirroredCollection<U> {
    type Target = ChangeTrackingCollection<U>;

    fn deref(&self) -> &Self::Target {
        &self.target
    }
}

/// Mirror `source` through an infallible `selector`.
pub fn mirror<T, U>(
    source: &ChangeTrackingCollection<T>,
    selector: impl Fn(&T) -> U + Send + Sync + 'static,
) -> MirroredCollection<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    let initial: Vec<U> = source.with(|items| items.iter().map(&selector).collect());
    follow(source, initial, move |item| Ok(selector(item)))
}

/// Mirror `source` through a fallible `selector`.
///
/// # Errors
///
/// [`RxError::SelectorFaulted`] if `selector` fails on one of the current
/// items; no mirror is created.
pub fn try_mirror<T, U, E>(
    source: &ChangeTrackingCollection<T>,
    selector: impl Fn(&T) -> std::result::Result<U, E> + Send + Sync + 'static,
) -> Result<MirroredCollection<U>>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
    E: Display,
{
    let initial = source.with(|items| {
        items
            .iter()
            .map(|item| selector(item).map_err(|err| RxError::selector(err.to_string())))
            .collect::<Result<Vec<U>>>()
    })?;
    Ok(follow(source, initial, move |item| {
        selector(item).map_err(|err| RxError::selector(err.to_string()))
    }))
}

fn follow<T, U>(
    source: &ChangeTrackingCollection<T>,
    initial: Vec<U>,
    selector: impl Fn(&T) -> Result<U> + Send + Sync + 'static,
) -> MirroredCollection<U>
where
    T: Clone + Send + Sync + 'static,
    U: Clone + Send + Sync + 'static,
{
    let target = ChangeTrackingCollection::from_items_with_scheduler(initial, source.scheduler());
    let following: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let fault: Arc<Mutex<Option<RxError>>> = Arc::new(Mutex::new(None));

    let sink = target.clone();
    // Weak, so the source's observer list never keeps the mirror alive.
    let stop: Weak<Mutex<Option<Subscription>>> = Arc::downgrade(&following);
    let record = Arc::clone(&fault);
    let source_id = source.id();
    let subscription = source.structural_changes().subscribe(move |change| {
        if lock(&record).is_some() {
            return;
        }
        if let Err(err) = apply(&sink, change, &selector) {
            tracing::warn!(collection = %source_id, mirror = %sink.id(), error = %err, "mirror stopped following its source");
            *lock(&record) = Some(err);
            let following = stop.upgrade().and_then(|slot| lock(&slot).take());
            if let Some(sub) = following {
                sub.unsubscribe();
            }
        }
    });
    *lock(&following) = Some(subscription);

    MirroredCollection {
        target,
        following,
        fault,
    }
}

fn apply<T, U>(
    target: &ChangeTrackingCollection<U>,
    change: &StructuralChange<T>,
    selector: &impl Fn(&T) -> Result<U>,
) -> Result<()>
where
    U: Clone + Send + Sync + 'static,
{
    // Map before touching the target so a failing selector leaves it intact.
    let mapped = change.new_item.as_ref().map(selector).transpose()?;
    match change.kind {
        ChangeKind::Add | ChangeKind::Remove | ChangeKind::Replace => {
            if change.old_item.is_some() {
                target.remove_at(change.index)?;
            }
            if let Some(item) = mapped {
                target.insert(change.index, item)?;
            }
        }
        ChangeKind::Reset => {
            target.clear();
        }
    }
    Ok(())
}

impl<T: Clone + Send + Sync + 'static> ChangeTrackingCollection<T> {
    /// Method form of [`mirror`].
    pub fn derive<U>(&self, selector: impl Fn(&T) -> U + Send + Sync + 'static) -> MirroredCollection<U>
    where
        U: Clone + Send + Sync + 'static,
    {
        mirror(self, selector)
    }
}
