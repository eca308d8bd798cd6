//! Performance benchmarks for photokit-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use photokit_engine::{
    materialize, materialize_asset, reconcile, ChangeDescriptor, Entry, PatchPlan, RawRecord,
    SortOrder,
};
use serde_json::json;

fn create_entries(size: usize) -> Vec<Entry> {
    (0..size)
        .map(|i| {
            let raw = RawRecord::asset(format!("asset_{}", i), "image")
                .with_field("width", 4032)
                .with_field("height", 3024)
                .with_field("creationDateUTCSeconds", 1706745600 + i as i64);
            materialize(raw).unwrap()
        })
        .collect()
}

fn fetch(indices: &[usize]) -> photokit_engine::Result<Vec<RawRecord>> {
    Ok(indices
        .iter()
        .map(|i| RawRecord::asset(format!("fresh_{}", i), "image"))
        .collect())
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("scattered_changes", size), size, |b, &size| {
            let change = ChangeDescriptor::new("bench", size)
                .with_removed((0..size).step_by(10))
                .with_inserted((5..size).step_by(10))
                .with_updated((7..size).step_by(50));

            b.iter(|| PatchPlan::new(black_box(size), black_box(&change), SortOrder::Reversed))
        });
    }

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("head_insert", size), size, |b, &size| {
            let previous = create_entries(size);
            let change = ChangeDescriptor::new("bench", size + 1).with_inserted([size]);

            b.iter(|| {
                reconcile(
                    black_box(&previous),
                    black_box(&change),
                    SortOrder::Reversed,
                    fetch,
                    materialize_asset,
                )
            })
        });

        group.bench_with_input(BenchmarkId::new("scattered", size), size, |b, &size| {
            let previous = create_entries(size);
            let change = ChangeDescriptor::new("bench", size)
                .with_removed((0..size).step_by(10))
                .with_inserted((5..size).step_by(10))
                .with_updated((7..size).step_by(50));

            b.iter(|| {
                reconcile(
                    black_box(&previous),
                    black_box(&change),
                    SortOrder::Normal,
                    fetch,
                    materialize_asset,
                )
            })
        });
    }

    group.finish();
}

fn bench_materialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialization");

    group.bench_function("record_from_json", |b| {
        let json = r#"{"localIdentifier":"ABC/L0/001","mediaType":"image","width":4032,"height":3024,"creationDateUTCSeconds":1706745600}"#;

        b.iter(|| serde_json::from_str::<RawRecord>(black_box(json)))
    });

    group.bench_function("album_with_previews", |b| {
        let raw = RawRecord::album("album_1", "album")
            .with_field("title", "Camera Roll")
            .with_field("permittedOperations", json!([true, true, true, true, true, false, false]))
            .with_field(
                "previewAssets",
                json!([
                    {"localIdentifier": "p1", "mediaType": "image"},
                    {"localIdentifier": "p2", "mediaType": "video"}
                ]),
            );

        b.iter(|| materialize(black_box(raw.clone())))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_planning,
    bench_reconciliation,
    bench_materialization,
);
criterion_main!(benches);
