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
use anyhow::{Context, Result};
use clap::Parser;
use pgexporter_metrics::source::PgDataSource;
use pgexporter_metrics::MetricsServer;
use pgexporter_observability::{init_tracing, LogFormat};
use pgexporter_server::{
    assemble_exporter, build_collections, load_custom_queries, metrics_config, pool_settings, Cli,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Flags, environment and file are needed to pick the log level
    let config = cli.resolve_config().await?;

    let format: LogFormat = config.observability.log_format.parse()?;
    init_tracing(format, Some(&config.observability.log_level))?;

    let queries = load_custom_queries(&config)
        .await
        .context("Failed to load custom queries")?;

    // A custom query that cannot be parsed aborts before any connection is opened
    let collections =
        build_collections(&config, queries).context("Failed to build collections")?;

    let source = PgDataSource::connect(&config.database.dsn, pool_settings(&config))
        .await
        .context("Failed to connect to PostgreSQL")?;

    let exporter = assemble_exporter(collections, Arc::new(source))?;

    let server = MetricsServer::with_config(Arc::new(exporter), metrics_config(&config));
    info!("Press Ctrl+C to stop");

    server
        .serve_with_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
}
