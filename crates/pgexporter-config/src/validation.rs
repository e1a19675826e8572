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
//! Semantic checks run after parsing

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{
    CollectorsConfig, CustomQueryConfig, DatabaseConfig, ExporterConfig, ObservabilityConfig,
    WebConfig, ALL_TABLES,
};
use std::collections::HashSet;

/// Metric name prefixes owned by the built-in collections
const RESERVED_PREFIXES: &[&str] = &["exporter_", "buffers_", "database_", "tables_", "slow_"];

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

/// Trait for validating configuration
pub trait Validator {
    /// Check the value, returning the first problem found
    fn validate(&self) -> ConfigResult<()>;
}

impl Validator for ExporterConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.web.validate()?;
        self.database.validate()?;
        self.collectors.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

impl Validator for WebConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.listen_address.is_empty() {
            return Err(ConfigError::MissingRequired("web.listen_address".to_string()));
        }

        let bind = self.bind_address();
        let valid = bind
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(ConfigError::invalid_value(
                "web.listen_address",
                format!("expected host:port or :port, got '{}'", self.listen_address),
            ));
        }

        if !self.telemetry_path.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "web.telemetry_path",
                format!("must start with '/', got '{}'", self.telemetry_path),
            ));
        }

        Ok(())
    }
}

impl Validator for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.dsn.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "database.dsn (or DATA_SOURCE_NAME)".to_string(),
            ));
        }

        if self.names.iter().all(|n| n.trim().is_empty()) {
            return Err(ConfigError::MissingRequired("database.names".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "database.max_connections",
                "must be greater than 0",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::invalid_value(
                "database.min_connections",
                format!(
                    "must not exceed max_connections ({})",
                    self.max_connections
                ),
            ));
        }

        Ok(())
    }
}

impl Validator for CollectorsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.slow_query_threshold_ms == 0 {
            return Err(ConfigError::invalid_value(
                "collectors.slow_query_threshold_ms",
                "must be greater than 0",
            ));
        }

        if i64::try_from(self.slow_query_threshold_ms).is_err() {
            return Err(ConfigError::invalid_value(
                "collectors.slow_query_threshold_ms",
                "out of range",
            ));
        }

        if let Some(table) = self.tables.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::invalid_value(
                "collectors.tables",
                format!("empty table name in list ('{}')", table),
            ));
        }

        if self.tables.len() > 1 && self.tables.iter().any(|t| t == ALL_TABLES) {
            return Err(ConfigError::ConflictingValues(format!(
                "collectors.tables: '{}' selects every table and cannot be combined with table names",
                ALL_TABLES
            )));
        }

        Ok(())
    }
}

impl Validator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_level",
                format!("must be one of: {}", LOG_LEVELS.join(", ")),
            ));
        }

        if !LOG_FORMATS.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ConfigError::invalid_value(
                "observability.log_format",
                format!("must be one of: {}", LOG_FORMATS.join(", ")),
            ));
        }

        Ok(())
    }
}

impl Validator for CustomQueryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !is_metric_name_fragment(&self.name) {
            return Err(ConfigError::invalid_value(
                format!("queries.{}", self.name),
                "name must match [a-zA-Z_][a-zA-Z0-9_]*",
            ));
        }

        if let Some(prefix) = RESERVED_PREFIXES
            .iter()
            .find(|p| self.name.starts_with(*p))
        {
            return Err(ConfigError::invalid_value(
                format!("queries.{}", self.name),
                format!("prefix '{}' is reserved for built-in metrics", prefix),
            ));
        }

        if self.query.trim().is_empty() {
            return Err(ConfigError::MissingRequired(format!(
                "queries.{}.query",
                self.name
            )));
        }

        Ok(())
    }
}

impl Validator for [CustomQueryConfig] {
    fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for query in self {
            query.validate()?;
            if !seen.insert(query.name.as_str()) {
                return Err(ConfigError::ConflictingValues(format!(
                    "custom query '{}' defined more than once",
                    query.name
                )));
            }
        }
        Ok(())
    }
}

fn is_metric_name_fragment(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
