#![forbid(unsafe_code)]

//! Operator properties over arbitrary inputs.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proptest::prelude::*;
use rxui_core::sync::lock;
use rxui_core::{EventStream, ImmediateScheduler, Stream, WorkerScheduler};

fn collect<T: Clone + Send + Sync + 'static>(stream: &Stream<T>) -> Vec<T> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let _sub = stream.subscribe(move |v| lock(&sink).push(v.clone()));
    let out = lock(&log).clone();
    out
}

proptest! {
    #[test]
    fn distinct_never_repeats_and_keeps_changes(values in prop::collection::vec(0u8..4, 0..64)) {
        let out = collect(&Stream::from_values(values.clone()).distinct_until_changed());
        prop_assert!(out.windows(2).all(|pair| pair[0] != pair[1]));

        let mut expected = values;
        expected.dedup();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn merge_preserves_each_source_order(a in prop::collection::vec(any::<i32>(), 0..20), b in prop::collection::vec(any::<i32>(), 0..20)) {
        let left = EventStream::new();
        let right = EventStream::new();
        let merged = left.stream().map(|v| (0u8, *v)).merge_with(&right.stream().map(|v| (1u8, *v)));
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let _sub = merged.subscribe(move |v| lock(&sink).push(*v));

        for (i, v) in a.iter().chain(b.iter()).enumerate() {
            if i < a.len() { left.next(*v) } else { right.next(*v) }
        }
        let log = lock(&log);
        let from_left: Vec<i32> = log.iter().filter(|(side, _)| *side == 0).map(|(_, v)| *v).collect();
        let from_right: Vec<i32> = log.iter().filter(|(side, _)| *side == 1).map(|(_, v)| *v).collect();
        prop_assert_eq!(from_left, a);
        prop_assert_eq!(from_right, b);
    }

    #[test]
    fn observe_on_immediate_is_transparent(values in prop::collection::vec(any::<u16>(), 0..64)) {
        let scheduled = Stream::from_values(values.clone()).observe_on(ImmediateScheduler::handle());
        prop_assert_eq!(collect(&scheduled), values);
    }
}

#[test]
fn observe_on_pool_keeps_order() {
    let pool = WorkerScheduler::pool("order-test", 4).unwrap().into_handle();
    let source = EventStream::new();
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let _sub = source
        .stream()
        .observe_on(pool)
        .subscribe(move |v: &u32| {
            let _ = lock(&tx).send(*v);
        });

    for v in 0..500 {
        source.next(v);
    }
    let received: Vec<u32> = (0..500)
        .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
        .collect();
    assert_eq!(received, (0..500).collect::<Vec<_>>());
}
