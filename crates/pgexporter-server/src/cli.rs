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
//! Command line flags

use clap::Parser;
use pgexporter_config::{ConfigLoader, ExporterConfig, Validator};
use std::path::PathBuf;

/// PostgreSQL statistics exporter for Prometheus
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pgexporter")]
#[command(version, about = "Exports PostgreSQL statistics as Prometheus metrics")]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Address to listen on for web interface and telemetry
    #[arg(long = "web.listen-address", value_name = "ADDR")]
    pub listen_address: Option<String>,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", value_name = "PATH")]
    pub telemetry_path: Option<String>,

    /// Monitored databases, comma separated
    #[arg(long = "db.names", value_name = "NAMES", value_delimiter = ',')]
    pub databases: Vec<String>,

    /// Monitored tables, comma separated; `*` for all
    #[arg(long = "db.tables", value_name = "TABLES", value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Running time in milliseconds after which a query counts as slow
    #[arg(long = "slow-query-threshold", value_name = "MS")]
    pub slow_query_threshold_ms: Option<u64>,

    /// Custom query file
    #[arg(long, value_name = "PATH")]
    pub queries: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log format (pretty, compact, json)
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,
}

impl Cli {
    /// Overwrite configuration fields with the flags that were given
    pub fn apply_to(&self, config: &mut ExporterConfig) {
        if let Some(addr) = &self.listen_address {
            config.web.listen_address.clone_from(addr);
        }
        if let Some(path) = &self.telemetry_path {
            config.web.telemetry_path.clone_from(path);
        }
        if !self.databases.is_empty() {
            config.database.names.clone_from(&self.databases);
        }
        if !self.tables.is_empty() {
            config.collectors.tables.clone_from(&self.tables);
        }
        if let Some(ms) = self.slow_query_threshold_ms {
            config.collectors.slow_query_threshold_ms = ms;
        }
        if self.queries.is_some() {
            config.collectors.queries_path.clone_from(&self.queries);
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.observability.log_format.clone_from(format);
        }
    }

    /// Build the effective configuration
    ///
    /// Defaults, then the configuration file if one was given, then
    /// environment overrides, then flags. The result is validated.
    pub async fn resolve_config(&self) -> anyhow::Result<ExporterConfig> {
        let loader = ConfigLoader::without_validation();
        let mut config = match &self.config {
            Some(path) => loader.load_file(path).await?,
            None => ExporterConfig::default(),
        };

        loader.apply_env_overrides(&mut config)?;
        self.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }
}
