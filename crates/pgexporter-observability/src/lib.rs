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
//! PostgreSQL Exporter Observability
//!
//! Structured logging for the exporter binary and its libraries.
//!
//! # Features
//!
//! - **Multiple Output Formats**: Pretty, compact and JSON output
//! - **Environment-based Filtering**: configured filter, then `RUST_LOG`, then `info`
//! - **Structured Logging**: JSON lines for log shippers
//!
//! # Example
//!
//! ```ignore
//! use pgexporter_observability::{init_tracing_with_config, LogConfig, LogFormat};
//!
//! init_tracing_with_config(LogConfig::new().with_format(LogFormat::Json).with_level("info"))?;
//! tracing::info!(listen_address = "0.0.0.0:9104", "Exporter starting");
//! ```

pub mod config;
pub mod initialization;

pub use config::{LogConfig, LogError, LogFormat, LogOutput};
pub use initialization::{init_tracing, init_tracing_with_config};
