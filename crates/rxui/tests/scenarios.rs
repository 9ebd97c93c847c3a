#![forbid(unsafe_code)]

//! End-to-end scenarios through the facade, with deferred delivery on a
//! virtual clock.

use std::sync::{Arc, Mutex};

use rxui::prelude::*;
use rxui::rxui_core::sync::lock;
use rxui_harness::{TestScheduler, init_test_tracing};

fn record<T: Clone + Send + Sync + 'static>(stream: &Stream<T>) -> (Arc<Mutex<Vec<T>>>, Subscription) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let sub = stream.subscribe(move |v| lock(&sink).push(v.clone()));
    (log, sub)
}

#[test]
fn add_remove_clear_scenario() {
    init_test_tracing();
    let sched = TestScheduler::new();
    let collection = ChangeTrackingCollection::<i32>::with_scheduler(sched.handle());
    let (changing, _a) = record(&collection.collection_count_changing());
    let (changed, _b) = record(&collection.collection_count_changed());
    let (added, _c) = record(&collection.items_added());
    let (removed, _d) = record(&collection.items_removed());

    collection.push(10);
    collection.push(20);
    collection.push(30);
    collection.remove_at(1).unwrap();
    // Before-family streams are synchronous.
    assert_eq!(*lock(&changing), vec![0, 1, 2, 3]);
    assert!(lock(&added).is_empty());

    assert_eq!(collection.clear(), vec![10, 30]);
    sched.flush();

    assert_eq!(*lock(&changing), vec![0, 1, 2, 3, 2]);
    assert_eq!(*lock(&changed), vec![1, 2, 3, 2, 0]);
    assert_eq!(*lock(&added), vec![10, 20, 30]);
    assert_eq!(*lock(&removed), vec![20]);
}

#[test]
fn initial_items_are_not_observed() {
    let sched = TestScheduler::new();
    let collection =
        ChangeTrackingCollection::from_items_with_scheduler(["a", "b", "c"], sched.handle());
    let (added, _a) = record(&collection.items_added());
    let (changed, _b) = record(&collection.changed());
    sched.start();
    assert_eq!(collection.to_vec(), vec!["a", "b", "c"]);
    assert!(lock(&added).is_empty());
    assert!(lock(&changed).is_empty());
}

#[test]
fn changed_reports_collection_level_records() {
    let sched = TestScheduler::new();
    let collection = ChangeTrackingCollection::<char>::with_scheduler(sched.handle());
    let (changed, _sub) = record(&collection.changed());
    collection.push('a');
    collection.replace(0, 'b').unwrap();
    collection.clear();
    sched.flush();

    let changed = lock(&changed);
    assert_eq!(changed.len(), 4);
    assert!(changed.iter().all(|c| c.property_name == rxui::rxui_runtime::ITEMS_PROPERTY));
    assert!(changed.iter().all(|c| c.sender.is_collection()));
}

#[test]
fn command_gated_by_collection_size() {
    let collection = ChangeTrackingCollection::<u8>::with_scheduler(ImmediateScheduler::handle());
    let has_items = collection.collection_count_changed().map(|n| *n > 0);
    let clear_all: ObservableCommand<()> = Stream::just(false)
        .merge_with(&has_items)
        .to_command(Some(ImmediateScheduler::handle()));
    assert!(!clear_all.can_execute(&()));

    let target = collection.clone();
    let _run = clear_all.subscribe(move |_| {
        target.clear();
    });
    collection.push(1);
    assert!(clear_all.can_execute(&()));
    clear_all.execute(());
    assert!(collection.is_empty());
    assert!(!clear_all.can_execute(&()));
}
