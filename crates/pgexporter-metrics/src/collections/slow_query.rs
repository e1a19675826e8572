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
//! Counts of long-running active statements

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use std::time::Duration;
use tokio::sync::Mutex;

use super::Collection;
use crate::error::{ExporterError, ExporterResult};
use crate::registry::MetricRegistry;
use crate::source::{DataSource, QueryError, SqlParam};
use crate::types::{MetricKind, MetricSnapshot};

const ACTIVE_OLDER_THAN: &str = "SELECT count(*) FROM pg_stat_activity \
     WHERE state = 'active' AND NOW() - query_start > $1::bigint * interval '1 millisecond'";

struct SlowQueryKind {
    name: &'static str,
    help: &'static str,
    filter: &'static str,
    context: &'static str,
}

const KINDS: &[SlowQueryKind] = &[
    SlowQueryKind {
        name: "slow_queries",
        help: "Number of slow queries",
        filter: "",
        context: "error counting slow queries",
    },
    SlowQueryKind {
        name: "slow_select_queries",
        help: "Number of slow SELECT queries",
        filter: " AND query ilike 'select%'",
        context: "error counting slow select queries",
    },
    SlowQueryKind {
        name: "slow_dml_queries",
        help: "Number of slow data manipulation queries (INSERT, UPDATE, DELETE)",
        filter: " AND (query ilike 'insert%' OR query ilike 'update%' OR query ilike 'delete%')",
        context: "error counting slow dml queries",
    },
];

/// Active statements running longer than a threshold: all of them, reads
/// and writes, each as a no-label gauge
#[derive(Debug)]
pub struct SlowQueryCollection {
    threshold_ms: i64,
    registry: Mutex<MetricRegistry>,
}

impl SlowQueryCollection {
    /// Create a collection counting statements older than `threshold`
    ///
    /// The threshold is truncated to whole milliseconds once, here.
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold_ms: i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX),
            registry: Mutex::new(MetricRegistry::new()),
        }
    }

    /// Threshold bound into every query, in milliseconds
    pub fn threshold_ms(&self) -> i64 {
        self.threshold_ms
    }
}

#[async_trait]
impl Collection for SlowQueryCollection {
    fn name(&self) -> &'static str {
        "slow_queries"
    }

    async fn scrape(&self, source: &dyn DataSource) -> ExporterResult<()> {
        let registry = self.registry.lock().await;
        let params = [SqlParam::Int(self.threshold_ms)];

        for kind in KINDS {
            let sql = format!("{}{}", ACTIVE_OLDER_THAN, kind.filter);
            let count = source
                .query_row(&sql, &params)
                .await
                .and_then(|row| match row.first() {
                    Some(value) => value.to_f64("count"),
                    None => Err(QueryError::NoRows),
                })
                .map_err(|e| ExporterError::query(kind.context, e))?;

            let handle = registry.get_or_create(kind.name, kind.help, &[] as &[&str], MetricKind::Gauge)?;
            registry.set_value(&handle, &[] as &[&str], count)?;
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
