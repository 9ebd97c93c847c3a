//! Mutation throughput of change-tracking collections.
//!
//! Measures the cost of the notification pipeline per edit:
//! - bare pushes with no observers
//! - pushes with the common "after" streams observed
//! - pushes under a suppression scope
//! - a mirrored collection following its source
//!
//! Run with: cargo bench -p rxui-runtime --bench collection_bench

use std::hint::black_box;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rxui_core::{ImmediateScheduler, Subscription};
use rxui_runtime::ChangeTrackingCollection;

fn fresh() -> ChangeTrackingCollection<u64> {
    ChangeTrackingCollection::with_scheduler(ImmediateScheduler::handle())
}

fn observed() -> (ChangeTrackingCollection<u64>, Vec<Subscription>) {
    let collection = fresh();
    let subs = vec![
        collection.items_added().subscribe(|v| {
            black_box(v);
        }),
        collection.collection_count_changed().subscribe(|n| {
            black_box(n);
        }),
        collection.changed().subscribe(|c| {
            black_box(&c.property_name);
        }),
    ];
    (collection, subs)
}

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_push");

    for &n in &[100u64, 1_000] {
        group.throughput(Throughput::Elements(n));

        group.bench_with_input(BenchmarkId::new("unobserved", n), &n, |b, &n| {
            b.iter_batched(
                fresh,
                |collection| {
                    for i in 0..n {
                        collection.push(i);
                    }
                    collection
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("observed", n), &n, |b, &n| {
            b.iter_batched(
                observed,
                |(collection, subs)| {
                    for i in 0..n {
                        collection.push(i);
                    }
                    (collection, subs)
                },
                BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("suppressed", n), &n, |b, &n| {
            b.iter_batched(
                observed,
                |(collection, subs)| {
                    {
                        let _quiet = collection.suppress_change_notifications();
                        for i in 0..n {
                            collection.push(i);
                        }
                    }
                    (collection, subs)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_mirror(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection_mirror");
    let n = 1_000u64;
    group.throughput(Throughput::Elements(n));

    group.bench_function("push_through_mirror", |b| {
        b.iter_batched(
            || {
                let source = fresh();
                let mirror = source.derive(|v| v.wrapping_mul(3));
                (source, mirror)
            },
            |(source, mirror)| {
                for i in 0..n {
                    source.push(i);
                }
                black_box(mirror.len());
                (source, mirror)
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("replace_through_mirror", |b| {
        b.iter_batched(
            || {
                let source = ChangeTrackingCollection::from_items_with_scheduler(
                    0..n,
                    ImmediateScheduler::handle(),
                );
                let mirror = source.derive(|v| v + 1);
                (source, mirror)
            },
            |(source, mirror)| {
                for i in 0..n {
                    let _ = source.replace(i as usize, i * 2);
                }
                (source, mirror)
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_push, bench_mirror);
criterion_main!(benches);
