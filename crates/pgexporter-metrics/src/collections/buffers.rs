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
//! Background writer buffer statistics

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use tokio::sync::Mutex;

use super::{scrape_fixed_row, Collection};
use crate::error::ExporterResult;
use crate::registry::MetricRegistry;
use crate::source::DataSource;
use crate::types::{MetricDefinition, MetricSnapshot};

const SUBSYSTEM: &str = "buffers";

/// Columns read from `pg_stat_bgwriter`
pub const BUFFER_METRICS: &[MetricDefinition] = &[
    MetricDefinition::fixed(
        "buffers_checkpoint",
        "buffers_checkpoint",
        "Number of buffers written during checkpoints",
    ),
    MetricDefinition::fixed(
        "buffers_clean",
        "buffers_clean",
        "Number of buffers written by the background writer",
    ),
    MetricDefinition::fixed(
        "maxwritten_clean",
        "maxwritten_clean",
        "Number of times the background writer stopped a cleaning scan because it had written too many buffers",
    ),
    MetricDefinition::fixed(
        "buffers_backend",
        "buffers_backend",
        "Number of buffers written directly by a backend",
    ),
    MetricDefinition::fixed(
        "buffers_backend_fsync",
        "buffers_backend_fsync",
        "Number of times a backend had to execute its own fsync call",
    ),
    MetricDefinition::fixed("buffers_alloc", "buffers_alloc", "Number of buffers allocated"),
];

/// One no-label gauge per `pg_stat_bgwriter` buffer column
#[derive(Debug)]
pub struct BufferCollection {
    registry: Mutex<MetricRegistry>,
}

impl BufferCollection {
    /// Create the collection with an empty registry
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(MetricRegistry::with_subsystem(SUBSYSTEM)),
        }
    }
}

impl Default for BufferCollection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collection for BufferCollection {
    fn name(&self) -> &'static str {
        "buffers"
    }

    async fn scrape(&self, source: &dyn DataSource) -> ExporterResult<()> {
        let registry = self.registry.lock().await;
        scrape_fixed_row(
            &registry,
            source,
            BUFFER_METRICS,
            "pg_stat_bgwriter",
            &[],
            (&[], &[]),
            "error running buffers stats query",
        )
        .await
    }

    async fn export_all(&self) -> Vec<MetricFamily> {
        self.registry.lock().await.export_all()
    }

    async fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.registry.lock().await.snapshot()
    }
}
