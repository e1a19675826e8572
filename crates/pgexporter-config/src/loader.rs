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
//! Configuration file loading and environment overrides

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{CustomQueriesFile, CustomQueryConfig, ExporterConfig};
use crate::validation::Validator;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

/// Connection string variable
pub const ENV_DATA_SOURCE_NAME: &str = "DATA_SOURCE_NAME";
/// Listen address override
pub const ENV_LISTEN_ADDRESS: &str = "PGEXPORTER_LISTEN_ADDRESS";
/// Telemetry path override
pub const ENV_TELEMETRY_PATH: &str = "PGEXPORTER_TELEMETRY_PATH";
/// Comma-separated database names
pub const ENV_DATABASES: &str = "PGEXPORTER_DATABASES";
/// Comma-separated table names, or `*`
pub const ENV_TABLES: &str = "PGEXPORTER_TABLES";
/// Slow query threshold in milliseconds
pub const ENV_SLOW_QUERY_THRESHOLD_MS: &str = "PGEXPORTER_SLOW_QUERY_THRESHOLD_MS";
/// Log level override
pub const ENV_LOG_LEVEL: &str = "PGEXPORTER_LOG_LEVEL";

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML
    Toml,
    /// YAML
    Yaml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::InvalidPath(path.to_path_buf())),
        }
    }

    /// Get format name as string
    pub fn name(&self) -> &'static str {
        match self {
            ConfigFormat::Toml => "TOML",
            ConfigFormat::Yaml => "YAML",
            ConfigFormat::Json => "JSON",
        }
    }
}

/// Configuration loader
#[derive(Debug)]
pub struct ConfigLoader {
    validate: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        ConfigLoader { validate: true }
    }

    /// Create a loader without validation
    ///
    /// Used when overrides still have to be applied before the
    /// configuration is complete.
    pub fn without_validation() -> Self {
        ConfigLoader { validate: false }
    }

    /// Load configuration from a file
    pub async fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<ExporterConfig> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await?;

        info!(
            "Loaded {} configuration file: {}",
            format.name(),
            path.display()
        );

        self.load_from_string(&content, format)
    }

    /// Load configuration from a string
    pub fn load_from_string(
        &self,
        content: &str,
        format: ConfigFormat,
    ) -> ConfigResult<ExporterConfig> {
        let config: ExporterConfig = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };

        debug!("Configuration loaded from {}", format.name());

        if self.validate {
            config.validate()?;
            info!("Configuration validated successfully");
        }

        Ok(config)
    }

    /// Load a file, apply environment overrides, then validate
    pub async fn load_with_overrides<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> ConfigResult<ExporterConfig> {
        let mut config = ConfigLoader::without_validation().load_file(path).await?;
        self.apply_env_overrides(&mut config)?;

        if self.validate {
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&self, config: &mut ExporterConfig) -> ConfigResult<()> {
        self.apply_overrides_from(config, |name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&self, config: &mut ExporterConfig, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DATA_SOURCE_NAME) {
            config.database.dsn = value;
        }

        // Web settings
        if let Some(value) = lookup(ENV_LISTEN_ADDRESS) {
            config.web.listen_address = value;
        }
        if let Some(value) = lookup(ENV_TELEMETRY_PATH) {
            config.web.telemetry_path = value;
        }

        // Database and collector settings
        if let Some(value) = lookup(ENV_DATABASES) {
            config.database.names = split_list(&value);
        }
        if let Some(value) = lookup(ENV_TABLES) {
            config.collectors.tables = split_list(&value);
        }
        if let Some(value) = lookup(ENV_SLOW_QUERY_THRESHOLD_MS) {
            config.collectors.slow_query_threshold_ms = value.trim().parse().map_err(|_| {
                ConfigError::env_var_parsing_error(
                    ENV_SLOW_QUERY_THRESHOLD_MS,
                    &value,
                    "expected a whole number of milliseconds",
                )
            })?;
        }

        // Observability settings
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            config.observability.log_level = value;
        }

        Ok(())
    }

    /// Load the custom query file
    ///
    /// Accepts a `name: query` mapping or a list of `{name, query, help}`
    /// entries in any supported format. Entries come back sorted by name.
    pub async fn load_custom_queries<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> ConfigResult<Vec<CustomQueryConfig>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path).await?;
        let queries = self.parse_custom_queries(&content, format)?;

        info!(
            count = queries.len(),
            "Loaded custom queries from {}",
            path.display()
        );
        Ok(queries)
    }

    /// Parse custom queries from a string
    pub fn parse_custom_queries(
        &self,
        content: &str,
        format: ConfigFormat,
    ) -> ConfigResult<Vec<CustomQueryConfig>> {
        let file: CustomQueriesFile = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        let queries = file.into_queries();

        if self.validate {
            queries.as_slice().validate()?;
        }

        Ok(queries)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a comma-separated list, dropping blanks
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ConfigFormat::from_path("config.toml").unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path("config.yaml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.yml").unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path("config.json").unwrap(), ConfigFormat::Json);
    }

    #[test]
    fn test_format_detection_error() {
        assert!(matches!(
            ConfigFormat::from_path("config.xml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            ConfigFormat::from_path("config"),
            Err(ConfigError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c "), vec!["a", "b", "c"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn test_parse_toml_partial() {
        let loader = ConfigLoader::without_validation();
        let toml = r#"
        [web]
        listen_address = "127.0.0.1:9187"
        "#;
        let config = loader.load_from_string(toml, ConfigFormat::Toml).unwrap();
        assert_eq!(config.web.listen_address, "127.0.0.1:9187");
        assert_eq!(config.web.telemetry_path, "/metrics");
    }

    #[test]
    fn test_validation_applies_on_load() {
        let loader = ConfigLoader::new();
        let json = r#"{"web": {"telemetry_path": "/metrics"}}"#;
        assert!(matches!(
            loader.load_from_string(json, ConfigFormat::Json),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let loader = ConfigLoader::new();
        let mut config = ExporterConfig::default();
        loader
            .apply_overrides_from(
                &mut config,
                lookup(&[
                    (ENV_DATA_SOURCE_NAME, "postgres://localhost/app"),
                    (ENV_DATABASES, "app,reporting"),
                    (ENV_TABLES, "*"),
                    (ENV_SLOW_QUERY_THRESHOLD_MS, "250"),
                    (ENV_LOG_LEVEL, "debug"),
                ]),
            )
            .unwrap();

        assert_eq!(config.database.dsn, "postgres://localhost/app");
        assert_eq!(config.database.names, vec!["app", "reporting"]);
        assert!(config.collectors.all_tables());
        assert_eq!(config.collectors.slow_query_threshold_ms, 250);
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_threshold_override() {
        let loader = ConfigLoader::new();
        let mut config = ExporterConfig::default();
        let err = loader
            .apply_overrides_from(&mut config, lookup(&[(ENV_SLOW_QUERY_THRESHOLD_MS, "5s")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarParsingError { .. }));
    }

    #[test]
    fn test_parse_custom_queries_rejects_reserved() {
        let loader = ConfigLoader::new();
        let yaml = "buffers_extra: select 1 from t\n";
        assert!(loader
            .parse_custom_queries(yaml, ConfigFormat::Yaml)
            .is_err());
        assert!(ConfigLoader::without_validation()
            .parse_custom_queries(yaml, ConfigFormat::Yaml)
            .is_ok());
    }
}
