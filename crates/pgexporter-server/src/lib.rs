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
//! PostgreSQL exporter wiring
//!
//! Turns a validated [`ExporterConfig`] into a running exporter: the five
//! collections in scrape order, the shared data source and the HTTP
//! endpoint.

pub mod cli;

pub use cli::Cli;

use pgexporter_config::{ConfigLoader, CustomQueryConfig, ExporterConfig};
use pgexporter_metrics::collections::{
    BufferCollection, CustomQueryCollection, CustomQueryDefinition, DatabaseCollection,
    SlowQueryCollection, TableCollection, TableSet,
};
use pgexporter_metrics::source::{DataSource, PoolSettings};
use pgexporter_metrics::{Collection, Exporter, ExporterResult, MetricsConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Load the custom query file named by the configuration, if any
pub async fn load_custom_queries(config: &ExporterConfig) -> anyhow::Result<Vec<CustomQueryConfig>> {
    match &config.collectors.queries_path {
        Some(path) => Ok(ConfigLoader::new().load_custom_queries(path).await?),
        None => Ok(Vec::new()),
    }
}

/// Collections in scrape order: buffers, databases, tables, slow queries,
/// custom queries
///
/// # Errors
///
/// Fails when a custom query's select list cannot be parsed.
pub fn build_collections(
    config: &ExporterConfig,
    queries: Vec<CustomQueryConfig>,
) -> ExporterResult<Vec<Arc<dyn Collection>>> {
    let tables = if config.collectors.all_tables() {
        TableSet::All
    } else {
        TableSet::Explicit(config.collectors.tables.clone())
    };

    let definitions = queries
        .into_iter()
        .map(|q| CustomQueryDefinition {
            name: q.name,
            query: q.query,
            help: q.help,
        })
        .collect();

    let threshold = Duration::from_millis(config.collectors.slow_query_threshold_ms);

    let collections: Vec<Arc<dyn Collection>> = vec![
        Arc::new(BufferCollection::new()),
        Arc::new(DatabaseCollection::new(config.database.names.iter())),
        Arc::new(TableCollection::new(tables)),
        Arc::new(SlowQueryCollection::new(threshold)),
        Arc::new(CustomQueryCollection::new(definitions)?),
    ];
    Ok(collections)
}

/// Build the exporter over `source`
///
/// # Errors
///
/// Fails when a custom query's select list cannot be parsed.
pub fn build_exporter(
    config: &ExporterConfig,
    queries: Vec<CustomQueryConfig>,
    source: Arc<dyn DataSource>,
) -> ExporterResult<Exporter> {
    assemble_exporter(build_collections(config, queries)?, source)
}

/// Register already built collections, in order, on an exporter over `source`
pub fn assemble_exporter(
    collections: Vec<Arc<dyn Collection>>,
    source: Arc<dyn DataSource>,
) -> ExporterResult<Exporter> {
    let mut exporter = Exporter::new(source)?;
    for collection in collections {
        exporter.register(collection);
    }

    info!(
        collections = ?exporter.collection_names(),
        "Exporter ready"
    );
    Ok(exporter)
}

/// HTTP endpoint settings
pub fn metrics_config(config: &ExporterConfig) -> MetricsConfig {
    MetricsConfig {
        listen_address: config.web.bind_address(),
        telemetry_path: config.web.telemetry_path.clone(),
    }
}

/// Pool limits
pub fn pool_settings(config: &ExporterConfig) -> PoolSettings {
    PoolSettings {
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
    }
}
