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
//! Per-database size, activity and cache statistics

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use tokio::sync::Mutex;
use tracing::debug;

use super::{cache_hit_ratio, scrape_fixed_row, Collection};
use crate::error::{ExporterError, ExporterResult};
use crate::registry::MetricRegistry;
use crate::source::{DataSource, QueryError, QueryResult, SqlParam, SqlValue};
use crate::types::{MetricDefinition, MetricKind, MetricSnapshot};

const SUBSYSTEM: &str = "database";
const LABEL: &str = "database";

const SIZE_QUERY: &str = "SELECT pg_database_size(datname) FROM pg_database WHERE datname = $1";
const CACHE_QUERY: &str = "SELECT blks_hit, blks_read FROM pg_stat_database WHERE datname = $1";

/// Columns read from `pg_stat_database`
pub const DATABASE_METRICS: &[MetricDefinition] = &[
    MetricDefinition::fixed(
        "numbackends",
        "numbackends",
        "Number of backends currently connected to this database",
    ),
    MetricDefinition::fixed(
        "tup_returned",
        "tup_returned",
        "Number of rows returned by queries in this database",
    ),
    MetricDefinition::fixed(
        "tup_fetched",
        "tup_fetched",
        "Number of rows fetched by queries in this database",
    ),
    MetricDefinition::fixed(
        "tup_inserted",
        "tup_inserted",
        "Number of rows inserted by queries in this database",
    ),
    MetricDefinition::fixed(
        "tup_updated",
        "tup_updated",
        "Number of rows updated by queries in this database",
    ),
    MetricDefinition::fixed(
        "tup_deleted",
        "tup_deleted",
        "Number of rows deleted by queries in this database",
    ),
    MetricDefinition::fixed(
        "xact_commit",
        "xact_commit",
        "Number of transactions in this database that have been committed",
    ),
    MetricDefinition::fixed(
        "xact_rollback",
        "xact_rollback",
        "Number of transactions in this database that have been rolled back",
    ),
    MetricDefinition::fixed(
        "deadlocks",
        "deadlocks",
        "Number of deadlocks detected in this database",
    ),
    MetricDefinition::fixed(
        "temp_files",
        "temp_files",
        "Number of temporary files created by queries in this database",
    ),
    MetricDefinition::fixed(
        "temp_bytes",
        "temp_bytes",
        "Total amount of data written to temporary files by queries in this database",
    ),
];

/// Size, activity counters and cache-hit ratio for each configured database,
/// labeled by database name
#[derive(Debug)]
pub struct DatabaseCollection {
    databases: Vec<String>,
    registry: Mutex<MetricRegistry>,
}

impl DatabaseCollection {
    /// Create a collection monitoring the given databases, scraped in order
    pub fn new<I, S>(databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            databases: databases.into_iter().map(Into::into).collect(),
            registry: Mutex::new(MetricRegistry::with_subsystem(SUBSYSTEM)),
        }
    }

    /// Monitored database names
    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    async fn scrape_database(
        &self,
        registry: &MetricRegistry,
        source: &dyn DataSource,
        database: &str,
    ) -> ExporterResult<()> {
        let params = [SqlParam::from(database)];
        let labels: &[&str] = &[database];

        let size = source
            .query_row(SIZE_QUERY, &params)
            .await
            .and_then(|row| first_number(&row, "pg_database_size"))
            .map_err(|e| ExporterError::query("failed to get database size", e))?;
        let handle = registry.get_or_create("size_bytes", "Size of database", &[LABEL], MetricKind::Gauge)?;
        registry.set_value(&handle, labels, size)?;

        scrape_fixed_row(
            registry,
            source,
            DATABASE_METRICS,
            "pg_stat_database WHERE datname = $1",
            &params,
            (&[LABEL], labels),
            "error running database stats query",
        )
        .await?;

        let row = source
            .query_row(CACHE_QUERY, &params)
            .await
            .map_err(|e| ExporterError::query("failed to get database cache hit ratio", e))?;
        let (hit, read) = hit_and_read(&row)
            .map_err(|e| ExporterError::query("failed to get database cache hit ratio", e))?;
        let handle = registry.get_or_create(
            "cache_hit_ratio_percent",
            "Database cache hit ratio",
            &[LABEL],
            MetricKind::Gauge,
        )?;
        registry.set_value(&handle, labels, cache_hit_ratio(hit, read))?;

        debug!(database, size, "Scraped database statistics");
        Ok(())
    }
}

/// First column of a row as a number
fn first_number(row: &[SqlValue], column: &str) -> QueryResult<f64> {
    match row.first() {
        Some(value) => value.to_f64(column),
        None => Err(QueryError::NoRows),
    }
}

/// `(blks_hit, blks_read)` from a two-column row
pub(crate) fn hit_and_read(row: &[SqlValue]) -> QueryResult<(f64, f64)> {
    match row {
        [hit, read, ..] => Ok((hit.to_f64("hit")?, read.to_f64("read")?)),
        _ => Err(QueryError::Unexpected(format!(
            "expected hit and read columns, got {} columns",
            row.len()
        ))),
    }
}

#[async_trait]
impl Collection for DatabaseCollection {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn scrape(&self, source: &dyn DataSource) -> ExporterResult<()> {
        let registry = self.registry.lock().await;
        for database in &self.databases {
            self.scrape_database(&registry, source, database).await?;
        }
        Ok(())
    }

    async fn export_all(&self) -> Vec<MetricFamily> {
        self.registry.lock().await.export_all()
    }

    async fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.registry.lock().await.snapshot()
    }
}
