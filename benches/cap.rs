//! Memory database benchmarks for trienode_db
//!
//! Run with: cargo bench --bench cap

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use trienode_db::{ChildRef, Database, Hash, MemoryStore, StorageSize, TrieNode};

/// Stage `roots` two-level tries of 16 leaves each, pinning every root
fn populate(db: &Database, roots: usize) -> Vec<Hash> {
    (0..roots)
        .map(|r| {
            let mut root = TrieNode::branch((r as u64).to_le_bytes().to_vec());
            for i in 0..16u8 {
                let value = format!("root-{r}-value-{i}").into_bytes();
                let leaf = db.insert_node(TrieNode::leaf(vec![i], value)).unwrap();
                root = root.with_child(i, ChildRef::Hash(leaf));
            }
            let hash = db.insert_node(root).unwrap();
            db.reference(hash, Hash::ZERO).unwrap();
            hash
        })
        .collect()
}

fn fresh_db() -> Database {
    Database::new(Arc::new(MemoryStore::new()))
}

// ============================================================================
// Staging
// ============================================================================

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Database_Insert");

    for roots in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements((roots * 17) as u64));
        group.bench_with_input(BenchmarkId::new("tries", roots), &roots, |b, &roots| {
            b.iter_batched(fresh_db, |db| populate(&db, black_box(roots)), BatchSize::SmallInput)
        });
    }

    group.finish();
}

// ============================================================================
// Garbage collection
// ============================================================================

fn bench_dereference(c: &mut Criterion) {
    let mut group = c.benchmark_group("Database_Dereference");

    group.bench_function("release_1000_tries", |b| {
        b.iter_batched(
            || {
                let db = fresh_db();
                let roots = populate(&db, 1000);
                (db, roots)
            },
            |(db, roots)| {
                for root in roots {
                    db.dereference(root).unwrap();
                }
                db
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

// ============================================================================
// Flushing
// ============================================================================

fn bench_cap(c: &mut Criterion) {
    let mut group = c.benchmark_group("Database_Cap");

    for fraction in [0u64, 2, 4] {
        group.bench_with_input(
            BenchmarkId::new("keep_1_in", fraction),
            &fraction,
            |b, &fraction| {
                b.iter_batched(
                    || {
                        let db = fresh_db();
                        populate(&db, 500);
                        let limit = match fraction {
                            0 => StorageSize::ZERO,
                            n => StorageSize(db.size().0.bytes() / n),
                        };
                        (db, limit)
                    },
                    |(db, limit)| {
                        db.cap(limit).unwrap();
                        db
                    },
                    BatchSize::LargeInput,
                )
            },
        );
    }

    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("Database_Commit");

    group.bench_function("commit_500_tries", |b| {
        b.iter_batched(
            || {
                let db = fresh_db();
                let roots = populate(&db, 500);
                (db, roots)
            },
            |(db, roots)| {
                for root in roots {
                    db.commit(root, false).unwrap();
                }
                db
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_dereference, bench_cap, bench_commit);
criterion_main!(benches);
