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
//! Metric collections
//!
//! A collection owns one statistics family: the SQL it runs, the metric
//! definitions it maps results onto and its own [`MetricRegistry`]. The
//! exporter drives collections through the [`Collection`] trait only and
//! never inspects concrete types.
//!
//! Every collection serializes its own `scrape` and `export_all` with one
//! async mutex, so a slow query in one collection never blocks another
//! collection's export.

pub mod buffers;
pub mod custom_query;
pub mod database;
pub mod slow_query;
pub mod tables;

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use std::fmt::Debug;

use crate::error::{ExporterError, ExporterResult};
use crate::registry::MetricRegistry;
use crate::source::{DataSource, SqlParam};
use crate::types::{MetricDefinition, MetricKind, MetricSnapshot};

pub use buffers::BufferCollection;
pub use custom_query::{CustomQuery, CustomQueryCollection, CustomQueryDefinition};
pub use database::DatabaseCollection;
pub use slow_query::SlowQueryCollection;
pub use tables::{TableCollection, TableSet};

/// A group of related metrics scraped together
#[async_trait]
pub trait Collection: Send + Sync + Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Run this collection's queries and update its metric values
    ///
    /// Values set before a failure are kept; nothing is rolled back.
    ///
    /// # Errors
    ///
    /// Returns the first query, schema or registry failure.
    async fn scrape(&self, source: &dyn DataSource) -> ExporterResult<()>;

    /// Current values of every metric this collection has registered
    async fn export_all(&self) -> Vec<MetricFamily>;

    /// [`Collection::export_all`] keyed by label tuples in declaration order
    async fn snapshot(&self) -> Vec<MetricSnapshot>;
}

/// Percentage of block requests served from cache, rounded to two decimals
///
/// Returns `0.0` when nothing had to be read from disk yet, so a fresh
/// database or table never produces NaN.
pub fn cache_hit_ratio(hit: f64, read: f64) -> f64 {
    if read <= 0.0 {
        return 0.0;
    }
    round2(hit * 100.0 / (hit + read))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Comma-separated column list for a set of definitions
pub(crate) fn select_columns(definitions: &[MetricDefinition]) -> String {
    definitions
        .iter()
        .map(|d| d.source_column.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Run a single-row statement selecting every definition's column and set
/// one gauge per column for the given label tuple
pub(crate) async fn scrape_fixed_row(
    registry: &MetricRegistry,
    source: &dyn DataSource,
    definitions: &[MetricDefinition],
    tail: &str,
    params: &[SqlParam],
    labels: (&[&str], &[&str]),
    context: &str,
) -> ExporterResult<()> {
    let (label_names, label_values) = labels;
    let sql = format!("SELECT {} FROM {}", select_columns(definitions), tail);

    let row = source
        .query_row(&sql, params)
        .await
        .map_err(|e| ExporterError::query(context, e))?;

    if row.len() != definitions.len() {
        return Err(ExporterError::query(
            context,
            crate::source::QueryError::Unexpected(format!(
                "expected {} columns, got {}",
                definitions.len(),
                row.len()
            )),
        ));
    }

    for (definition, value) in definitions.iter().zip(&row) {
        let value = value
            .to_f64(&definition.source_column)
            .map_err(|e| ExporterError::query(context, e))?;
        let handle = registry.get_or_create(
            &definition.exported_name,
            &definition.help,
            label_names,
            MetricKind::Gauge,
        )?;
        registry.set_value(&handle, label_values, value)?;
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::source::{MockDataSource, RowSet, SqlValue};

    #[test]
    fn test_cache_hit_ratio_without_reads_is_zero() {
        assert_eq!(cache_hit_ratio(0.0, 0.0), 0.0);
        assert_eq!(cache_hit_ratio(500.0, 0.0), 0.0);
        assert!(!cache_hit_ratio(0.0, 0.0).is_nan());
    }

    #[test]
    fn test_cache_hit_ratio_rounds_to_two_decimals() {
        assert_eq!(cache_hit_ratio(99.0, 1.0), 99.0);
        assert_eq!(cache_hit_ratio(2.0, 1.0), 66.67);
        assert_eq!(cache_hit_ratio(0.0, 10.0), 0.0);
    }

    #[test]
    fn test_select_columns() {
        let definitions = [
            MetricDefinition::fixed("a", "a", "A"),
            MetricDefinition::fixed("b", "b_total", "B"),
        ];
        assert_eq!(select_columns(&definitions), "a, b");
    }

    #[tokio::test]
    async fn test_scrape_fixed_row_sets_gauges() {
        let source = MockDataSource::new();
        source.respond(
            "FROM pg_stat_bgwriter",
            RowSet::new(&["a", "b"]).with_row([SqlValue::Int(4), SqlValue::Float(2.5)]),
        );
        let registry = MetricRegistry::with_subsystem("test");
        let definitions = [
            MetricDefinition::fixed("a", "a", "A"),
            MetricDefinition::fixed("b", "b_total", "B"),
        ];

        scrape_fixed_row(
            &registry,
            &source,
            &definitions,
            "pg_stat_bgwriter",
            &[],
            (&[], &[]),
            "test query",
        )
        .await
        .unwrap();

        let empty: &[&str] = &[];
        assert_eq!(registry.get("a").unwrap().value(empty), Some(4.0));
        assert_eq!(registry.get("b_total").unwrap().value(empty), Some(2.5));
        assert_eq!(source.executed()[0].0, "SELECT a, b FROM pg_stat_bgwriter");
    }

    #[tokio::test]
    async fn test_scrape_fixed_row_rejects_null() {
        let source = MockDataSource::new();
        source.respond(
            "pg_stat_bgwriter",
            RowSet::new(&["a"]).with_row([SqlValue::Null]),
        );
        let registry = MetricRegistry::new();
        let definitions = [MetricDefinition::fixed("a", "a", "A")];

        let err = scrape_fixed_row(
            &registry,
            &source,
            &definitions,
            "pg_stat_bgwriter",
            &[],
            (&[], &[]),
            "test query",
        )
        .await
        .unwrap_err();

        assert!(err.to_string().starts_with("test query: "));
        assert!(registry.is_empty());
    }
}
