//! Performance benchmarks for reconciliation and the ordered set.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use docsync::{classify_and_apply, reconcile, Batch, Direction, Document, OrderedDocumentSet};
use serde_json::json;

fn doc(i: usize, etag: u32) -> Document {
    Document::new(
        "items",
        format!("item-{}", i),
        etag.to_string(),
        json!({"rank": i}).as_object().cloned().unwrap(),
    )
    .with_sort_keys(vec![format!("{:08}", i)], format!("{:08}", i))
}

fn populated(size: usize) -> OrderedDocumentSet {
    OrderedDocumentSet::from_documents(
        vec![Direction::Ascending],
        (0..size).map(|i| doc(i * 2, 1)).collect(),
    )
}

/// Benchmark a full snapshot arriving for a fresh subscription
fn bench_initial_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("initial_snapshot");

    for size in [100, 1_000, 10_000] {
        let snapshot: Vec<Document> = (0..size).rev().map(|i| doc(i, 1)).collect();
        group.bench_with_input(BenchmarkId::new("documents", size), &snapshot, |b, snapshot| {
            b.iter(|| {
                black_box(reconcile(
                    None,
                    Batch::snapshot(snapshot.clone()),
                    &[Direction::Ascending],
                    None,
                ))
            });
        });
    }

    group.finish();
}

/// Benchmark a snapshot replacing an existing set where half the documents changed
fn bench_snapshot_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_diff");

    for size in [100, 1_000, 10_000] {
        let snapshot: Vec<Document> = (0..size).map(|i| doc(i * 2, (i % 2) as u32 + 1)).collect();
        group.bench_with_input(BenchmarkId::new("documents", size), &size, |b, &size| {
            b.iter(|| {
                black_box(reconcile(
                    Some(populated(size)),
                    Batch::snapshot(snapshot.clone()),
                    &[Direction::Ascending],
                    None,
                ))
            });
        });
    }

    group.finish();
}

/// Benchmark incremental updates into a large set
fn bench_incremental_updates(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental_updates");
    let base = populated(10_000);

    for batch_size in [1, 10, 100] {
        let updates: Vec<Document> = (0..batch_size).map(|i| doc(i * 2 + 1, 1)).collect();
        group.bench_with_input(
            BenchmarkId::new("batch_size", batch_size),
            &updates,
            |b, updates| {
                b.iter(|| {
                    black_box(reconcile(
                        Some(base.clone()),
                        Batch::updates(updates.clone()),
                        &[Direction::Ascending],
                        Some(10_000),
                    ))
                });
            },
        );
    }

    group.finish();
}

/// Benchmark moving one document from the front to the back of the set
fn bench_reposition(c: &mut Criterion) {
    let base = populated(10_000);

    c.bench_function("reposition_front_to_back", |b| {
        b.iter(|| {
            let mut set = base.clone();
            black_box(classify_and_apply(
                doc(0, 2).with_sort_keys(vec!["99999999".into()], "00000000"),
                &mut set,
            ))
        });
    });
}

criterion_group!(
    benches,
    bench_initial_snapshot,
    bench_snapshot_diff,
    bench_incremental_updates,
    bench_reposition
);
criterion_main!(benches);
