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
//! PostgreSQL Exporter Metrics Core
//!
//! Polls PostgreSQL statistics views and republishes them as Prometheus
//! metrics.
//!
//! # Features
//!
//! - **Dynamic registry**: metric handles are created the first time a name is
//!   seen and reused for the lifetime of the process
//! - **Collections**: buffers, per-database, per-table, slow queries and
//!   user-defined custom queries
//! - **Fail-fast scrape cycles**: the first failing collection ends the cycle;
//!   earlier values are kept
//! - **HTTP Endpoint**: Axum-based telemetry endpoint in Prometheus text format
//!
//! # Example
//!
//! ```ignore
//! use pgexporter_metrics::collections::{BufferCollection, SlowQueryCollection};
//! use pgexporter_metrics::source::{PgDataSource, PoolSettings};
//! use pgexporter_metrics::{Exporter, MetricsServer};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = PgDataSource::connect("postgres://localhost/postgres", PoolSettings::default()).await?;
//!
//!     let exporter = Exporter::new(Arc::new(source))?
//!         .with_collection(Arc::new(BufferCollection::new()))
//!         .with_collection(Arc::new(SlowQueryCollection::new(Duration::from_secs(5))));
//!
//!     MetricsServer::new(Arc::new(exporter)).serve().await
//! }
//! ```

pub mod collections;
pub mod error;
pub mod exporter;
pub mod registry;
pub mod schema;
pub mod server;
pub mod source;
pub mod types;

pub use collections::{cache_hit_ratio, Collection};
pub use error::{ExporterError, ExporterResult};
pub use exporter::Exporter;
pub use registry::{MetricHandle, MetricRegistry};
pub use schema::{infer_schema, InferredSchema};
pub use server::{encode_text, MetricsServer};
pub use types::{
    MetricDefinition, MetricKind, MetricSnapshot, MetricsConfig, ScrapeResult, ScrapeState,
    NAMESPACE,
};

// Re-export prometheus types for convenience
pub use prometheus::proto::MetricFamily;
pub use prometheus::{Encoder, TextEncoder};
