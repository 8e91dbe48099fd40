//! B-tree benchmarks.
//!
//! Measures point lookup, insert, and alternating insert/remove throughput
//! at several tree sizes. Syncing is disabled so the numbers reflect tree
//! and codec cost rather than fsync latency.

#![allow(clippy::expect_used, missing_docs)]

use std::hint::black_box;

use acorn::{BTree, TreeConfig};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

fn bench_config() -> TreeConfig {
    TreeConfig { key_size: 16, degree: 32, sync_on_write: false }
}

/// Populate a tree with `count` sequential keys.
fn populate(tree: &mut BTree, count: usize) {
    for i in 0..count {
        let key = format!("key-{i:08}");
        tree.put(key.as_bytes(), i as u64).expect("put");
    }
}

/// Benchmark point lookups as the tree grows deeper.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree/get");
    group.throughput(Throughput::Elements(1));

    for count in [1_000usize, 10_000, 100_000] {
        let dir = TempDir::new().expect("tempdir");
        let mut tree =
            BTree::open(dir.path().join("bench.btree"), bench_config()).expect("open tree");
        populate(&mut tree, count);

        group.bench_with_input(
            BenchmarkId::new("sequential", format!("{}k", count / 1000)),
            &count,
            |b, &count| {
                let mut i = 0usize;
                b.iter(|| {
                    i = (i + 1) % count;
                    let key = format!("key-{i:08}");
                    black_box(tree.get(key.as_bytes()).expect("get"))
                });
            },
        );
    }

    group.finish();
}

/// Benchmark inserts of fresh keys into a pre-grown tree.
fn bench_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree/put");
    group.throughput(Throughput::Elements(1));

    for base in [1_000usize, 10_000] {
        let dir = TempDir::new().expect("tempdir");
        let mut tree =
            BTree::open(dir.path().join("bench.btree"), bench_config()).expect("open tree");
        populate(&mut tree, base);

        group.bench_with_input(
            BenchmarkId::new("fresh", format!("{}k", base / 1000)),
            &base,
            |b, &base| {
                let mut i = base;
                b.iter(|| {
                    i += 1;
                    let key = format!("key-{i:08}");
                    black_box(tree.put(key.as_bytes(), i as u64).expect("put"))
                });
            },
        );
    }

    group.finish();
}

/// Benchmark the insert/remove cycle, which exercises split, borrow, and
/// merge plus the free-node stack.
fn bench_put_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree/put_remove");
    group.throughput(Throughput::Elements(2));

    let dir = TempDir::new().expect("tempdir");
    let mut tree = BTree::open(dir.path().join("bench.btree"), bench_config()).expect("open tree");
    populate(&mut tree, 10_000);

    group.bench_function("cycle/10k", |b| {
        b.iter(|| {
            tree.put(b"churn-key", 1).expect("put");
            black_box(tree.remove(b"churn-key").expect("remove"))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_get, bench_put, bench_put_remove);
criterion_main!(benches);
