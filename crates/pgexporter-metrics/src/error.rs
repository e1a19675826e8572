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
//! Error types for scrape cycles and metric registration

use thiserror::Error;

use crate::source::QueryError;

/// Result type alias for exporter operations
pub type ExporterResult<T> = Result<T, ExporterError>;

/// Errors raised while building collections or running a scrape cycle
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Invalid static setup: an unparseable custom query or a metric
    /// registered twice with different shapes. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A statement failed against the data source. Aborts the current cycle only.
    #[error("{context}: {source}")]
    Query {
        /// What the collection was doing when the query failed
        context: String,
        /// Underlying data source failure
        #[source]
        source: QueryError,
    },

    /// A custom query returned a different row shape than the one its
    /// handle was bound to
    #[error("custom query '{name}' returned {actual} columns, expected {expected}")]
    SchemaMismatch {
        /// Custom query name
        name: String,
        /// Column count the handle was bound with
        expected: usize,
        /// Column count seen in this execution
        actual: usize,
    },

    /// A counter received a reading it cannot represent
    #[error("invalid reading {value} for counter '{name}'")]
    InvalidCounterValue {
        /// Metric name
        name: String,
        /// Offending reading
        value: f64,
    },

    /// Prometheus rejected a metric or label definition
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

impl ExporterError {
    /// Create a Configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        ExporterError::Configuration(msg.into())
    }

    /// Wrap a data source failure with the collection's context
    pub fn query(context: impl Into<String>, source: QueryError) -> Self {
        ExporterError::Query {
            context: context.into(),
            source,
        }
    }

    /// Whether this error only affects the current scrape cycle
    pub fn is_per_cycle(&self) -> bool {
        matches!(
            self,
            ExporterError::Query { .. }
                | ExporterError::SchemaMismatch { .. }
                | ExporterError::InvalidCounterValue { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display_includes_context() {
        let err = ExporterError::query(
            "error running buffers stats query",
            QueryError::NoRows,
        );
        let msg = err.to_string();
        assert!(msg.starts_with("error running buffers stats query: "));
        assert!(err.is_per_cycle());
    }

    #[test]
    fn test_configuration_is_not_per_cycle() {
        let err = ExporterError::configuration("bad query");
        assert!(!err.is_per_cycle());
        assert_eq!(err.to_string(), "configuration error: bad query");
    }
}
