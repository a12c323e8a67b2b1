//! Performance benchmarks for lounge-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lounge_engine::{reconcile, Category, Mutation, RecordId, RecordStore, Snapshot};
use serde_json::json;

const NOW: u64 = 1_704_067_200_000;

/// Snapshot with `n` expenses, ids offset by `offset`, every tenth tombstoned.
fn make_snapshot(n: i64, offset: i64, minute: u32) -> Snapshot {
    let expenses: Vec<_> = (0..n)
        .map(|i| {
            json!({
                "id": i + offset,
                "date": "2024-01-01",
                "category": "supplies",
                "amount": 100 + i,
                "timestamp": format!("2024-01-01T10:{:02}:00.000Z", minute % 60)
            })
        })
        .collect();
    let tombstones: Vec<_> = (0..n)
        .step_by(10)
        .map(|i| json!({"id": i + offset, "deletedAt": "2024-01-01T11:00:00.000Z"}))
        .collect();
    Snapshot::from_value(json!({
        "expenses": expenses,
        "pendingSavings": 1000,
        "deletedRecords": {"vaultTransactions": tombstones}
    }))
    .unwrap()
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");

    for size in [10, 100, 1000].iter() {
        let local = make_snapshot(*size, 0, 1);
        let remote = make_snapshot(*size, *size / 2, 2);

        group.bench_with_input(BenchmarkId::new("half_overlap", size), size, |b, _| {
            b.iter(|| reconcile(black_box(&local), black_box(&remote)))
        });

        group.bench_with_input(BenchmarkId::new("identical", size), size, |b, _| {
            b.iter(|| reconcile(black_box(&local), black_box(&local)))
        });
    }

    group.finish();
}

fn bench_store_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_operations");

    group.bench_function("record_expense", |b| {
        let mut store = RecordStore::new();
        b.iter(|| {
            store.apply(
                black_box(Mutation::RecordExpense {
                    date: "2024-01-01".into(),
                    category: "supplies".into(),
                    description: String::new(),
                    amount: 500,
                }),
                black_box(NOW),
            )
        })
    });

    group.bench_function("delete_with_cascade", |b| {
        let base = RecordStore::from_snapshot(make_snapshot(1000, 0, 1));
        b.iter_batched(
            || base.clone(),
            |mut store| store.delete(Category::Expenses, RecordId::Int(500), "t"),
            criterion::BatchSize::SmallInput,
        )
    });

    group.bench_function("snapshot_to_json", |b| {
        let snapshot = make_snapshot(1000, 0, 1);
        b.iter(|| black_box(&snapshot).to_json())
    });

    group.bench_function("snapshot_from_json", |b| {
        let json = make_snapshot(1000, 0, 1).to_json().unwrap();
        b.iter(|| Snapshot::from_json(black_box(&json)))
    });

    group.finish();
}

criterion_group!(benches, bench_reconcile, bench_store_operations);
criterion_main!(benches);
