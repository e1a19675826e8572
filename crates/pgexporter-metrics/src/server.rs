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
//! HTTP server for the Prometheus metrics endpoint
//!
//! Provides an Axum-based HTTP server exposing the telemetry path (default
//! `/metrics`) in Prometheus text exposition format. Every request to the
//! telemetry path runs one full scrape cycle before answering.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::exporter::Exporter;
use crate::types::MetricsConfig;

/// Encode families in Prometheus text exposition format
pub fn encode_text(families: &[MetricFamily]) -> prometheus::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(families, &mut buffer)?;
    Ok(buffer)
}

/// HTTP server for Prometheus metrics
#[derive(Debug, Clone)]
pub struct MetricsServer {
    exporter: Arc<Exporter>,
    config: MetricsConfig,
}

impl MetricsServer {
    /// Create a new metrics server with the default listen address and path
    pub fn new(exporter: Arc<Exporter>) -> Self {
        Self::with_config(exporter, MetricsConfig::default())
    }

    /// Create a new metrics server with custom configuration
    pub fn with_config(exporter: Arc<Exporter>, config: MetricsConfig) -> Self {
        Self { exporter, config }
    }

    /// Get the bind address for the server
    pub fn bind_address(&self) -> &str {
        &self.config.listen_address
    }

    /// Path the metrics are served under
    pub fn telemetry_path(&self) -> &str {
        &self.config.telemetry_path
    }

    /// Routes served by this server
    pub fn router(&self) -> Router {
        let landing = landing_page(&self.config.telemetry_path);
        Router::new()
            .route(&self.config.telemetry_path, get(metrics_handler))
            .route("/health", get(health_handler))
            .route("/", get(move || async move { Html(landing) }))
            .with_state(Arc::clone(&self.exporter))
    }

    /// Start the metrics server
    ///
    /// Runs until the listener fails. Use [`MetricsServer::serve_with_shutdown`]
    /// to stop it gracefully.
    pub async fn serve(self) -> anyhow::Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the metrics server and stop once `shutdown` resolves
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.listen_address.clone();
        let app = self.router();

        let listener = TcpListener::bind(&addr).await?;
        info!(
            "Metrics server listening on http://{}{}",
            addr, self.config.telemetry_path
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Metrics server error: {}", e))
    }
}

fn landing_page(telemetry_path: &str) -> String {
    format!(
        "<html>\n\
         <head><title>PostgreSQL exporter</title></head>\n\
         <body>\n\
         <h1>PostgreSQL exporter</h1>\n\
         <p><a href=\"{}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        telemetry_path
    )
}

/// Handler for the telemetry path
///
/// Runs a scrape cycle and returns every metric in Prometheus text format
async fn metrics_handler(State(exporter): State<Arc<Exporter>>) -> Response {
    debug!("Serving metrics");

    let metric_families = exporter.collect().await;

    match encode_text(&metric_families) {
        Ok(buffer) => {
            debug!("Successfully encoded {} metric families", metric_families.len());
            (
                StatusCode::OK,
                [("content-type", prometheus::TEXT_FORMAT)],
                buffer,
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

/// Handler for `/health` endpoint
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
