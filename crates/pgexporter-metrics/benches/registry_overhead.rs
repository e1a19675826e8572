// Copyright (C) 2026  pgexporter contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Benchmark registry and scrape cycle overhead
//!
//! Measures lookup-or-create on an already registered name, value updates
//! across label tuples, and a full scrape cycle against the mock source.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pgexporter_metrics::collections::{CustomQueryCollection, CustomQueryDefinition, SlowQueryCollection};
use pgexporter_metrics::source::{MockDataSource, RowSet, SqlValue};
use pgexporter_metrics::{encode_text, Exporter, MetricKind, MetricRegistry};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn bench_get_or_create(c: &mut Criterion) {
    let registry = MetricRegistry::with_subsystem("tables");
    registry
        .get_or_create("size_bytes", "Table size", &["table"], MetricKind::Gauge)
        .unwrap();

    c.bench_function("get_or_create_existing", |b| {
        b.iter(|| {
            black_box(
                registry
                    .get_or_create("size_bytes", "Table size", &["table"], MetricKind::Gauge)
                    .unwrap(),
            )
        })
    });
}

fn bench_set_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_value");

    for tables in [10usize, 100, 1000].iter() {
        let registry = MetricRegistry::with_subsystem("tables");
        let handle = registry
            .get_or_create("size_bytes", "Table size", &["table"], MetricKind::Gauge)
            .unwrap();
        let names: Vec<String> = (0..*tables).map(|i| format!("table_{}", i)).collect();

        group.bench_with_input(BenchmarkId::new("gauge", tables), tables, |b, _| {
            b.iter(|| {
                for (i, name) in names.iter().enumerate() {
                    registry.set_value(&handle, &[name.as_str()], i as f64).unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_scrape_cycle(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    let source = MockDataSource::new();
    source.respond("pg_stat_activity", RowSet::new(&["count"]).with_row([3i64]));
    let mut rows = RowSet::new(&["cnt", "region", "host"]);
    for i in 0..100i64 {
        rows = rows.with_row([
            SqlValue::Int(i),
            SqlValue::from(format!("region_{}", i % 5)),
            SqlValue::from(format!("host_{}", i)),
        ]);
    }
    source.respond("from sessions", rows);

    let custom = CustomQueryCollection::new(vec![CustomQueryDefinition::new(
        "sessions",
        "select cnt, region, host from sessions",
    )])
    .unwrap();
    let exporter = Exporter::new(Arc::new(source))
        .unwrap()
        .with_collection(Arc::new(SlowQueryCollection::new(Duration::from_secs(5))))
        .with_collection(Arc::new(custom));

    c.bench_function("collect_and_encode", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let families = exporter.collect().await;
                black_box(encode_text(&families).unwrap())
            })
        })
    });
}

criterion_group!(benches, bench_get_or_create, bench_set_value, bench_scrape_cycle);
criterion_main!(benches);
