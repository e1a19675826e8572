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
//! User-defined queries exported as metrics
//!
//! Each query's shape is inferred from its text when the collection is
//! built. The metric itself is only registered on the first execution that
//! returns rows: its label names are the result's column names after the
//! first one. From then on the shape is frozen, and an execution returning a
//! different number of columns fails the scrape without touching any value.

use async_trait::async_trait;
use prometheus::proto::MetricFamily;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::Collection;
use crate::error::{ExporterError, ExporterResult};
use crate::registry::{MetricHandle, MetricRegistry};
use crate::schema::{infer_schema, InferredSchema};
use crate::source::{DataSource, RowSet};
use crate::types::{MetricKind, MetricSnapshot};

/// A named query from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomQueryDefinition {
    /// Metric name, without namespace
    pub name: String,
    /// SQL text; value column first, label columns after it
    pub query: String,
    /// Help text; defaults to the query text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl CustomQueryDefinition {
    /// Definition without explicit help text
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
            help: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Binding {
    handle: MetricHandle,
    column_count: usize,
}

/// One custom query with its inferred and bound shape
#[derive(Debug)]
pub struct CustomQuery {
    definition: CustomQueryDefinition,
    schema: InferredSchema,
    binding: Option<Binding>,
}

impl CustomQuery {
    /// Infer the query's shape from its text
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Configuration`] when the text has no
    /// parseable select list.
    pub fn new(definition: CustomQueryDefinition) -> ExporterResult<Self> {
        let schema = infer_schema(&definition.query).map_err(|e| {
            ExporterError::configuration(format!("custom query '{}': {}", definition.name, e))
        })?;
        Ok(Self {
            definition,
            schema,
            binding: None,
        })
    }

    /// Configured name
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Shape inferred from the query text
    pub fn schema(&self) -> &InferredSchema {
        &self.schema
    }

    /// Label names of the bound metric, once the query has returned rows
    pub fn bound_labels(&self) -> Option<&[String]> {
        self.binding.as_ref().map(|b| b.handle.label_names())
    }

    fn help(&self) -> &str {
        self.definition
            .help
            .as_deref()
            .unwrap_or(&self.definition.query)
    }

    fn mismatch(&self, expected: usize, actual: usize) -> ExporterError {
        ExporterError::SchemaMismatch {
            name: self.definition.name.clone(),
            expected,
            actual,
        }
    }

    fn bind(&mut self, registry: &MetricRegistry, rows: &RowSet) -> ExporterResult<Binding> {
        if let Some(binding) = &self.binding {
            return Ok(binding.clone());
        }

        let columns: Vec<String> = rows.columns.iter().map(|c| c.to_lowercase()).collect();
        if columns.len() != self.schema.column_count() {
            return Err(self.mismatch(self.schema.column_count(), columns.len()));
        }

        let handle = registry.get_or_create(
            &self.definition.name,
            self.help(),
            &columns[1..],
            self.schema.kind,
        )?;
        info!(
            query = %self.definition.name,
            labels = ?&columns[1..],
            kind = self.schema.kind.as_str(),
            "Bound custom query"
        );

        let binding = Binding {
            handle,
            column_count: columns.len(),
        };
        self.binding = Some(binding.clone());
        Ok(binding)
    }

    async fn scrape(&mut self, registry: &MetricRegistry, source: &dyn DataSource) -> ExporterResult<()> {
        let rows = source.query_rows(&self.definition.query, &[]).await.map_err(|e| {
            ExporterError::query(format!("error running custom query '{}'", self.definition.name), e)
        })?;

        if rows.is_empty() {
            debug!(query = %self.definition.name, "Custom query returned no rows");
            return Ok(());
        }

        let binding = self.bind(registry, &rows)?;

        let mut readings = Vec::with_capacity(rows.rows.len());
        for row in &rows.rows {
            if row.len() != binding.column_count {
                return Err(self.mismatch(binding.column_count, row.len()));
            }
            let value = row[0].to_f64(&self.schema.value_column).map_err(|e| {
                ExporterError::query(format!("error reading custom query '{}'", self.definition.name), e)
            })?;
            if binding.handle.kind() == MetricKind::Counter && (!value.is_finite() || value < 0.0) {
                return Err(ExporterError::InvalidCounterValue {
                    name: binding.handle.name().to_string(),
                    value,
                });
            }
            let labels: Vec<String> = row[1..].iter().map(|v| v.to_label()).collect();
            readings.push((labels, value));
        }

        for (labels, value) in &readings {
            registry.set_value(&binding.handle, labels, *value)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct CustomState {
    registry: MetricRegistry,
    queries: Vec<CustomQuery>,
}

/// Runs every configured custom query in order, stopping at the first failure
#[derive(Debug)]
pub struct CustomQueryCollection {
    state: Mutex<CustomState>,
}

impl CustomQueryCollection {
    /// Build the collection, inferring every query's shape up front
    ///
    /// # Errors
    ///
    /// Returns the first [`ExporterError::Configuration`] raised by an
    /// unparseable query.
    pub fn new(definitions: Vec<CustomQueryDefinition>) -> ExporterResult<Self> {
        let queries = definitions
            .into_iter()
            .map(CustomQuery::new)
            .collect::<ExporterResult<Vec<_>>>()?;
        Ok(Self {
            state: Mutex::new(CustomState {
                registry: MetricRegistry::new(),
                queries,
            }),
        })
    }

    /// Names of the configured queries, in scrape order
    pub async fn query_names(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .queries
            .iter()
            .map(|q| q.name().to_string())
            .collect()
    }

    /// Label names bound for `name`, if it has returned rows yet
    pub async fn bound_labels(&self, name: &str) -> Option<Vec<String>> {
        let state = self.state.lock().await;
        state
            .queries
            .iter()
            .find(|q| q.name() == name)
            .and_then(CustomQuery::bound_labels)
            .map(<[String]>::to_vec)
    }
}

#[async_trait]
impl Collection for CustomQueryCollection {
    fn name(&self) -> &'static str {
        "custom_queries"
    }

    async fn scrape(&self, source: &dyn DataSource) -> ExporterResult<()> {
        let mut state = self.state.lock().await;
        let CustomState { registry, queries } = &mut *state;
        for query in queries.iter_mut() {
            query.scrape(registry, source).await?;
        }
        Ok(())
    }

    async fn export_all(&self) -> Vec<MetricFamily> {
        self.state.lock().await.registry.export_all()
    }

    async fn snapshot(&self) -> Vec<MetricSnapshot> {
        self.state.lock().await.registry.snapshot()
    }
}
