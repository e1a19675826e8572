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
//! Configuration schema
//!
//! Every section has serde defaults, so a file only needs the fields it
//! changes. The DSN is usually supplied through `DATA_SOURCE_NAME` rather
//! than written to disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Table list entry that selects every table in the `public` schema
pub const ALL_TABLES: &str = "*";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExporterConfig {
    /// HTTP endpoint settings
    #[serde(default)]
    pub web: WebConfig,

    /// Connection and monitored databases
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Collection settings
    #[serde(default)]
    pub collectors: CollectorsConfig,

    /// Logging settings
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebConfig {
    /// Address to listen on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path under which metrics are exposed
    #[serde(default = "default_telemetry_path")]
    pub telemetry_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        WebConfig {
            listen_address: default_listen_address(),
            telemetry_path: default_telemetry_path(),
        }
    }
}

impl WebConfig {
    /// Address handed to the listener
    ///
    /// An empty host means every interface, so `:9187` binds `0.0.0.0:9187`.
    pub fn bind_address(&self) -> String {
        match self.listen_address.strip_prefix(':') {
            Some(port) if !port.starts_with(':') => format!("0.0.0.0:{}", port),
            _ => self.listen_address.clone(),
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Connection string; required, usually from `DATA_SOURCE_NAME`
    #[serde(default)]
    pub dsn: String,

    /// Databases reported by the per-database collection
    #[serde(default)]
    pub names: Vec<String>,

    /// Pool upper bound
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Idle connections kept open
    #[serde(default)]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            dsn: String::new(),
            names: Vec::new(),
            max_connections: default_max_connections(),
            min_connections: 0,
        }
    }
}

/// Collection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectorsConfig {
    /// Monitored tables; `["*"]` selects all of `public`
    #[serde(default)]
    pub tables: Vec<String>,

    /// Running time after which a query counts as slow
    #[serde(default = "default_slow_query_threshold_ms")]
    pub slow_query_threshold_ms: u64,

    /// Optional custom query file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queries_path: Option<String>,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        CollectorsConfig {
            tables: Vec::new(),
            slow_query_threshold_ms: default_slow_query_threshold_ms(),
            queries_path: None,
        }
    }
}

impl CollectorsConfig {
    /// Whether the table list selects every table
    ///
    /// Only a list holding the single entry `*` does; validation rejects `*`
    /// mixed with table names.
    pub fn all_tables(&self) -> bool {
        matches!(self.tables.as_slice(), [only] if only == ALL_TABLES)
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        ObservabilityConfig {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// One user-defined query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomQueryConfig {
    /// Metric name fragment, prefixed with the exporter namespace
    pub name: String,

    /// SQL text; value column first
    pub query: String,

    /// Help text; the query text is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// Contents of a custom query file
///
/// Either a plain `name: query` mapping or a list of entries with an
/// optional help text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CustomQueriesFile {
    /// `name: query` pairs
    Map(BTreeMap<String, String>),
    /// Full entries
    List(Vec<CustomQueryConfig>),
}

impl CustomQueriesFile {
    /// Entries sorted by name
    pub fn into_queries(self) -> Vec<CustomQueryConfig> {
        let mut queries: Vec<CustomQueryConfig> = match self {
            CustomQueriesFile::Map(map) => map
                .into_iter()
                .map(|(name, query)| CustomQueryConfig {
                    name,
                    query,
                    help: None,
                })
                .collect(),
            CustomQueriesFile::List(list) => list,
        };
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        queries
    }
}

// Default value functions
fn default_listen_address() -> String {
    "0.0.0.0:9104".to_string()
}

fn default_telemetry_path() -> String {
    "/metrics".to_string()
}

fn default_max_connections() -> u32 {
    3
}

fn default_slow_query_threshold_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExporterConfig::default();
        assert_eq!(config.web.listen_address, "0.0.0.0:9104");
        assert_eq!(config.web.telemetry_path, "/metrics");
        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.database.min_connections, 0);
        assert_eq!(config.collectors.slow_query_threshold_ms, 5000);
        assert!(config.collectors.queries_path.is_none());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_all_tables() {
        let mut collectors = CollectorsConfig::default();
        assert!(!collectors.all_tables());
        collectors.tables = vec!["*".to_string()];
        assert!(collectors.all_tables());
        collectors.tables = vec!["orders".to_string(), "*".to_string()];
        assert!(!collectors.all_tables());
    }

    #[test]
    fn test_bind_address_fills_empty_host() {
        let mut web = WebConfig::default();
        assert_eq!(web.bind_address(), "0.0.0.0:9104");

        web.listen_address = ":9187".to_string();
        assert_eq!(web.bind_address(), "0.0.0.0:9187");

        web.listen_address = "[::1]:9187".to_string();
        assert_eq!(web.bind_address(), "[::1]:9187");
    }

    #[test]
    fn test_queries_map_sorted_by_name() {
        let yaml = "zeta: select 1 from a\nalpha: select 2 from b\n";
        let file: CustomQueriesFile = serde_yaml::from_str(yaml).unwrap();
        let queries = file.into_queries();
        assert_eq!(queries[0].name, "alpha");
        assert_eq!(queries[1].name, "zeta");
        assert!(queries[0].help.is_none());
    }

    #[test]
    fn test_queries_list_keeps_help() {
        let yaml = r#"
- name: sessions
  query: select cnt, region from sessions
  help: Open sessions per region
- name: backlog
  query: select n from backlog
"#;
        let file: CustomQueriesFile = serde_yaml::from_str(yaml).unwrap();
        let queries = file.into_queries();
        assert_eq!(queries[0].name, "backlog");
        assert_eq!(queries[1].help.as_deref(), Some("Open sessions per region"));
    }
}
