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
//! Configuration management for the PostgreSQL exporter
//!
//! Loads the exporter configuration from TOML, YAML or JSON, applies
//! environment overrides and validates the result before anything connects
//! to the database.
//!
//! # Features
//!
//! - Multi-format configuration support (TOML, YAML, JSON)
//! - `DATA_SOURCE_NAME` and `PGEXPORTER_*` environment overrides
//! - Custom query files as a `name: query` mapping or a list of entries
//! - Validation with field-level error messages
//!
//! # Example
//!
//! ```no_run
//! use pgexporter_config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = ConfigLoader::new();
//!     let config = loader.load_with_overrides("pgexporter.toml").await?;
//!
//!     println!("Listening on {}", config.web.listen_address);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

// Re-export commonly used items
pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigFormat, ConfigLoader};
pub use schema::*;
pub use validation::Validator;
