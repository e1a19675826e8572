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
//! Per-table statistics, sizes and cache-hit ratios
//!
//! The monitored set is either an explicit list of table names or every
//! table of the `public` schema. The latter is enumerated on the first
//! successful scrape and cached for the lifetime of the process, so newly
//! created tables only show up after a restart.

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::database::hit_and_read;
use super::{cache_hit_ratio, select_columns, Collection};
use crate::error::{ExporterError, ExporterResult};
use crate::registry::MetricRegistry;
use crate::source::{DataSource, QueryError, RowSet, SqlParam, SqlValue};
use crate::types::{MetricDefinition, MetricKind, MetricSnapshot};

const SUBSYSTEM: &str = "tables";
const LABEL: &str = "table";
const SCHEMA: &str = "public";

/// Configuration entry that selects every table
pub const ALL_TABLES: &str = "*";

/// Enumerates table names of a schema
pub const ENUMERATE_QUERY: &str =
    "SELECT table_name::text FROM information_schema.tables WHERE table_schema = $1";

const SIZE_QUERY: &str = "SELECT table_name::text, \
     pg_total_relation_size(format('%I.%I', table_schema, table_name)::regclass) \
     FROM information_schema.tables WHERE table_schema = $1";

const CACHE_QUERY: &str = "SELECT relname::text, coalesce(heap_blks_hit, 0), coalesce(heap_blks_read, 0) \
     FROM pg_statio_user_tables WHERE schemaname = $1";

/// Columns read from `pg_stat_user_tables`
pub const TABLE_METRICS: &[MetricDefinition] = &[
    MetricDefinition::fixed(
        "seq_scan",
        "seq_scan_total",
        "Number of sequential scans initiated on this table",
    ),
    MetricDefinition::fixed(
        "seq_tup_read",
        "seq_tup_read_total",
        "Number of live rows fetched by sequential scans",
    ),
    MetricDefinition::fixed(
        "vacuum_count",
        "vacuum_count_total",
        "Number of times this table has been manually vacuumed (not counting VACUUM FULL)",
    ),
    MetricDefinition::fixed(
        "autovacuum_count",
        "autovacuum_count_total",
        "Number of times this table has been vacuumed by the autovacuum daemon",
    ),
    MetricDefinition::fixed(
        "analyze_count",
        "analyze_count_total",
        "Number of times this table has been manually analyzed",
    ),
    MetricDefinition::fixed(
        "autoanalyze_count",
        "autoanalyze_count_total",
        "Number of times this table has been analyzed by the autovacuum daemon",
    ),
    MetricDefinition::fixed("n_tup_ins", "n_tup_ins_total", "Number of rows inserted"),
    MetricDefinition::fixed("n_tup_upd", "n_tup_upd_total", "Number of rows updated"),
    MetricDefinition::fixed("n_tup_del", "n_tup_del_total", "Number of rows deleted"),
    MetricDefinition::fixed(
        "n_tup_hot_upd",
        "n_tup_hot_upd_total",
        "Number of rows HOT updated (i.e., with no separate index update required)",
    ),
    MetricDefinition::fixed("n_live_tup", "n_live_tup_total", "Estimated number of live rows"),
    MetricDefinition::fixed("n_dead_tup", "n_dead_tup_total", "Estimated number of dead rows"),
];

/// Tables monitored by a [`TableCollection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSet {
    /// Exactly these tables
    Explicit(Vec<String>),
    /// Every table of the `public` schema, resolved on first scrape
    All,
}

impl TableSet {
    /// Interpret configured table names; a single `*` entry selects every table
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        match names {
            [only] if only.as_ref() == ALL_TABLES => TableSet::All,
            _ => TableSet::Explicit(names.iter().map(|n| n.as_ref().to_string()).collect()),
        }
    }
}

#[derive(Debug)]
struct TableState {
    registry: MetricRegistry,
    resolved: Option<HashSet<String>>,
}

/// Statistics, total size and cache-hit ratio for each monitored table,
/// labeled by table name
#[derive(Debug)]
pub struct TableCollection {
    tables: TableSet,
    state: Mutex<TableState>,
}

impl TableCollection {
    /// Create a collection monitoring `tables`
    pub fn new(tables: TableSet) -> Self {
        Self {
            tables,
            state: Mutex::new(TableState {
                registry: MetricRegistry::with_subsystem(SUBSYSTEM),
                resolved: None,
            }),
        }
    }

    /// Configured table set
    pub fn table_set(&self) -> &TableSet {
        &self.tables
    }

    async fn resolve(&self, source: &dyn DataSource) -> ExporterResult<HashSet<String>> {
        match &self.tables {
            TableSet::Explicit(names) => Ok(names.iter().cloned().collect()),
            TableSet::All => {
                let rows = source
                    .query_rows(ENUMERATE_QUERY, &[SqlParam::from(SCHEMA)])
                    .await
                    .map_err(|e| ExporterError::query("error enumerating tables", e))?;
                let names: HashSet<String> = rows
                    .rows
                    .iter()
                    .filter_map(|row| row.first().map(SqlValue::to_label))
                    .collect();
                info!(schema = SCHEMA, tables = names.len(), "Resolved monitored tables");
                Ok(names)
            }
        }
    }
}

#[async_trait]
impl Collection for TableCollection {
    fn name(&self) -> &'static str {
        "tables"
    }

    async fn scrape(&self, source: &dyn DataSource) -> ExporterResult<()> {
        let mut state = self.state.lock().await;

        if state.resolved.is_none() {
            state.resolved = Some(self.resolve(source).await?);
        }
        let TableState { registry, resolved } = &*state;
        let tables = match resolved {
            Some(tables) => tables,
            None => return Ok(()),
        };

        scrape_stats(registry, source, tables).await?;
        scrape_sizes(registry, source, tables).await?;
        scrape_cache_ratios(registry, source, tables).await?;
        Ok(())
    }

    async fn export_all(&self) -> Vec<MetricFamily> {
        self.state.lock().await.registry.export_all()
    }

    async fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.state.lock().await.registry.snapshot()
    }
}

/// Rows whose first column names a monitored table, with that name split off
fn monitored_rows<'a>(
    rows: &'a RowSet,
    tables: &'a HashSet<String>,
    width: usize,
) -> impl Iterator<Item = Result<(String, &'a [SqlValue]), QueryError>> + 'a {
    rows.rows.iter().filter_map(move |row| {
        if row.len() != width {
            return Some(Err(QueryError::Unexpected(format!(
                "expected {} columns, got {}",
                width,
                row.len()
            ))));
        }
        let name = row[0].to_label();
        if !tables.contains(&name) {
            debug!(table = %name, "Skipping unmonitored table");
            return None;
        }
        Some(Ok((name, &row[1..])))
    })
}

async fn scrape_stats(
    registry: &MetricRegistry,
    source: &dyn DataSource,
    tables: &HashSet<String>,
) -> ExporterResult<()> {
    const CONTEXT: &str = "error running table stats query";
    let sql = format!(
        "SELECT relname::text, {} FROM pg_stat_user_tables WHERE schemaname = $1",
        select_columns(TABLE_METRICS)
    );
    let rows = source
        .query_rows(&sql, &[SqlParam::from(SCHEMA)])
        .await
        .map_err(|e| ExporterError::query(CONTEXT, e))?;

    for entry in monitored_rows(&rows, tables, TABLE_METRICS.len() + 1) {
        let (table, values) = entry.map_err(|e| ExporterError::query(CONTEXT, e))?;
        for (definition, value) in TABLE_METRICS.iter().zip(values) {
            let value = value
                .to_f64(&definition.source_column)
                .map_err(|e| ExporterError::query(CONTEXT, e))?;
            let handle = registry.get_or_create(
                &definition.exported_name,
                &definition.help,
                &[LABEL],
                MetricKind::Gauge,
            )?;
            registry.set_value(&handle, &[table.as_str()], value)?;
        }
    }
    Ok(())
}

async fn scrape_sizes(
    registry: &MetricRegistry,
    source: &dyn DataSource,
    tables: &HashSet<String>,
) -> ExporterResult<()> {
    const CONTEXT: &str = "error running table size query";
    let rows = source
        .query_rows(SIZE_QUERY, &[SqlParam::from(SCHEMA)])
        .await
        .map_err(|e| ExporterError::query(CONTEXT, e))?;

    let handle = registry.get_or_create(
        "size_bytes",
        "Total table size including indexes",
        &[LABEL],
        MetricKind::Gauge,
    )?;
    for entry in monitored_rows(&rows, tables, 2) {
        let (table, values) = entry.map_err(|e| ExporterError::query(CONTEXT, e))?;
        let size = values[0]
            .to_f64("pg_total_relation_size")
            .map_err(|e| ExporterError::query(CONTEXT, e))?;
        registry.set_value(&handle, &[table.as_str()], size)?;
    }
    Ok(())
}

async fn scrape_cache_ratios(
    registry: &MetricRegistry,
    source: &dyn DataSource,
    tables: &HashSet<String>,
) -> ExporterResult<()> {
    const CONTEXT: &str = "error running table cache hit stats query";
    let rows = source
        .query_rows(CACHE_QUERY, &[SqlParam::from(SCHEMA)])
        .await
        .map_err(|e| ExporterError::query(CONTEXT, e))?;

    let handle = registry.get_or_create(
        "cache_hit_ratio_percent",
        "Table cache hit ratio",
        &[LABEL],
        MetricKind::Gauge,
    )?;
    for entry in monitored_rows(&rows, tables, 3) {
        let (table, values) = entry.map_err(|e| ExporterError::query(CONTEXT, e))?;
        let (hit, read) = hit_and_read(values).map_err(|e| ExporterError::query(CONTEXT, e))?;
        registry.set_value(&handle, &[table.as_str()], cache_hit_ratio(hit, read))?;
    }
    Ok(())
}
