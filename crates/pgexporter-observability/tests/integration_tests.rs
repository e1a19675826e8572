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
//! Integration tests for logging setup
//!
//! The global subscriber can only be installed once per process, so a
//! single test owns installation and asserts that a second attempt fails.

use pgexporter_observability::{
    init_tracing, init_tracing_with_config, LogConfig, LogError, LogFormat, LogOutput,
};

#[test]
fn test_config_builder_chaining() {
    let config = LogConfig::new()
        .with_format(LogFormat::Json)
        .with_level("debug")
        .with_timestamps(false)
        .with_color(false)
        .with_targets(false)
        .with_output(LogOutput::Stdout);

    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, Some("debug".to_string()));
    assert!(!config.use_timestamps);
    assert!(!config.use_color);
    assert!(!config.include_targets);
    assert_eq!(config.output, LogOutput::Stdout);
}

#[test]
fn test_default_config() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Pretty);
    assert_eq!(config.output, LogOutput::Stderr);
    assert!(config.use_color);
    assert!(config.use_timestamps);
}

#[test]
fn test_format_deserializes_lowercase() {
    let format: LogFormat = serde_json::from_str("\"compact\"").unwrap();
    assert_eq!(format, LogFormat::Compact);
    assert!(serde_json::from_str::<LogFormat>("\"fancy\"").is_err());
}

#[test]
fn test_explicit_level_overrides_env() {
    std::env::set_var("RUST_LOG", "trace");
    let config = LogConfig::new()
        .with_format(LogFormat::Compact)
        .with_level("warn");
    assert_eq!(config.get_effective_level(), "warn");
}

#[test]
fn test_global_initialization_once() {
    let config = LogConfig::new()
        .with_format(LogFormat::Json)
        .with_level("pgexporter_metrics=debug,info")
        .with_output(LogOutput::Stdout);
    init_tracing_with_config(config).unwrap();
    tracing::info!(collection = "buffers", "Logging initialized");

    let err = init_tracing(LogFormat::Compact, Some("info")).unwrap_err();
    assert!(matches!(err, LogError::AlreadyInitialized(_)));
}
