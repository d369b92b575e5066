//! Criterion benchmarks for the SQLite table store.
//!
//! Measures the replace-load path every loader block takes at the end of a
//! pipeline.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use sheetflow_store::{SqliteTableStore, TableStore, WriteMode};
use sheetflow_types::table::{Column, Table};
use sheetflow_types::value::{Primitive, Value};

fn table(rows: usize) -> Table {
    let mut table = Table::new(vec![
        Column::new("id", "integer", Primitive::Integer),
        Column::new("name", "text", Primitive::Text),
        Column::new("lat", "decimal", Primitive::Decimal),
    ]);
    for i in 0..rows {
        let id = i64::try_from(i).unwrap();
        table
            .push_row(vec![
                Value::Integer(id),
                Value::Text(format!("stop {i}")),
                Value::Decimal(49.0 + f64::from(u32::try_from(i % 1000).unwrap()) / 1000.0),
            ])
            .unwrap();
    }
    table
}

fn bench_replace_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/replace_load");
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteTableStore::new();

    for rows in [100, 1_000, 10_000] {
        let data = table(rows);
        let db = dir.path().join(format!("bench_{rows}.sqlite"));
        group.bench_with_input(BenchmarkId::new("rows", rows), &data, |b, data| {
            b.iter(|| {
                store
                    .write_table(&db, "stops", data, WriteMode::Replace)
                    .unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_replace_load);
criterion_main!(benches);
