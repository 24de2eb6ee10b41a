//! Benchmarks for rbkv tree operations.
//!
//! Run with: cargo bench --package rbkv
//!
//! ## Benchmark Categories
//!
//! - **Insert**: Uncommitted inserts in ascending and shuffled order
//! - **Commit**: Insert batch followed by a commit, per sync mode
//! - **Lookup**: Point reads against a committed tree (cold and cached)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rbkv::{Scalar, Storage, StorageConfig, SyncMode, Tree};
use tempfile::TempDir;

fn open(dir: &TempDir, sync_mode: SyncMode) -> Tree {
    let config = StorageConfig::default().with_sync_mode(sync_mode);
    let storage = Storage::open(dir.path().join("bench.db"), config).unwrap();
    Tree::new(storage).unwrap()
}

/// Deterministic permutation of `0..count` (multiplicative stride).
fn shuffled_keys(count: i64) -> Vec<i64> {
    let stride = 7_919;
    (0..count).map(|i| (i * stride) % count).collect()
}

// ============================================================================
// Insert Benchmarks
// ============================================================================

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_insert");

    for size in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("ascending", size), size, |b, &size| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let tree = open(&dir, SyncMode::None);
                    (dir, tree)
                },
                |(_dir, mut tree)| {
                    for i in 0..size {
                        tree.set(Scalar::Int(i), "value".into()).unwrap();
                    }
                },
                criterion::BatchSize::SmallInput,
            )
        });

        let keys = shuffled_keys(*size);
        group.bench_with_input(BenchmarkId::new("shuffled", size), &keys, |b, keys| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let tree = open(&dir, SyncMode::None);
                    (dir, tree)
                },
                |(_dir, mut tree)| {
                    for &key in keys {
                        tree.set(Scalar::Int(key), "value".into()).unwrap();
                    }
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Commit Benchmarks
// ============================================================================

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_commit");

    for sync_mode in [SyncMode::None, SyncMode::Fsync].iter() {
        let mode_name = match sync_mode {
            SyncMode::None => "nosync",
            SyncMode::Fsync => "fsync",
            SyncMode::Fdatasync => "fdatasync",
        };

        group.throughput(Throughput::Elements(100));
        group.bench_function(BenchmarkId::new("100_keys", mode_name), |b| {
            b.iter_batched(
                || {
                    let dir = TempDir::new().unwrap();
                    let mut tree = open(&dir, *sync_mode);
                    for key in shuffled_keys(100) {
                        tree.set(Scalar::Int(key), key.to_string()).unwrap();
                    }
                    (dir, tree)
                },
                |(_dir, mut tree)| tree.commit().unwrap(),
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

// ============================================================================
// Lookup Benchmarks
// ============================================================================

fn bench_lookup(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench.db");
    {
        let mut tree = open(&dir, SyncMode::None);
        for key in shuffled_keys(10_000) {
            tree.set(Scalar::Int(key), key.to_string()).unwrap();
        }
        tree.commit().unwrap();
    }

    let mut group = c.benchmark_group("tree_lookup");

    // Reopening per batch drops every cached node.
    group.bench_function("cold_10k", |b| {
        b.iter_batched(
            || Tree::new(Storage::open(&path, StorageConfig::default()).unwrap()).unwrap(),
            |mut tree| tree.get(black_box(&Scalar::Int(4_321))).unwrap(),
            criterion::BatchSize::SmallInput,
        )
    });

    // Same root address on every refresh, so resolved nodes stay cached.
    let mut tree = open(&dir, SyncMode::None);
    group.bench_function("warm_10k", |b| {
        b.iter(|| tree.get(black_box(&Scalar::Int(4_321))).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_commit, bench_lookup);
criterion_main!(benches);
