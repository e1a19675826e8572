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
//! Data source boundary
//!
//! Collections never talk to a database driver directly. They go through
//! the [`DataSource`] trait, which offers exactly two capabilities:
//!
//! - [`DataSource::query_row`]: a single-row, parameterized query returning typed scalars
//! - [`DataSource::query_rows`]: multi-row iteration with column-name introspection
//!
//! Parameters are positional and escaped by the driver. Identifiers spliced
//! into SQL text only ever come from trusted startup configuration.
//!
//! Two implementations ship with the crate:
//!
//! - [`postgres::PgDataSource`]: a shared `sqlx` connection pool
//! - [`mock::MockDataSource`]: scripted in-memory responses for tests

pub mod mock;
pub mod postgres;

use async_trait::async_trait;
use std::fmt::{self, Debug};
use thiserror::Error;

pub use mock::MockDataSource;
pub use postgres::{PgDataSource, PoolSettings};

/// Result type alias for data source operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors produced by a data source
#[derive(Error, Debug)]
pub enum QueryError {
    /// Driver, connection or SQL execution failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A single-row query returned nothing
    #[error("query returned no rows")]
    NoRows,

    /// A column could not be converted to a scalar
    #[error("cannot decode column '{column}' of type {type_name}")]
    Decode {
        /// Column name
        column: String,
        /// Database type name
        type_name: String,
    },

    /// A column expected to hold a number was NULL or non-numeric
    #[error("column '{column}' does not hold a number: {value}")]
    NotNumeric {
        /// Column name
        column: String,
        /// Rendered offending value
        value: String,
    },

    /// Failure raised by a non-driver source
    #[error("{0}")]
    Unexpected(String),
}

/// Positional query parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlParam {
    /// 64-bit integer
    Int(i64),
    /// Text
    Text(String),
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

/// Scalar cell value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// Boolean
    Bool(bool),
    /// Any integer type
    Int(i64),
    /// Any floating point type
    Float(f64),
    /// Any character type
    Text(String),
}

impl SqlValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Int(v) => Some(*v as f64),
            SqlValue::Float(v) => Some(*v),
            SqlValue::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            SqlValue::Text(v) => v.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }

    /// Numeric value of a named column, failing on NULL or text
    pub fn to_f64(&self, column: &str) -> QueryResult<f64> {
        self.as_f64().ok_or_else(|| QueryError::NotNumeric {
            column: column.to_string(),
            value: self.to_string(),
        })
    }

    /// Render the value as a label value. NULL becomes the empty string.
    pub fn to_label(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

/// Result of a multi-row query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names in select order. Empty when the driver returned no rows.
    pub columns: Vec<String>,
    /// Row values, each row in column order
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    /// Empty row set with the given columns
    pub fn new<S: AsRef<str>>(columns: &[S]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row
    pub fn with_row<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the query returned any rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Query execution capability consumed by every collection
#[async_trait]
pub trait DataSource: Send + Sync + Debug {
    /// Run a query expected to return exactly one row
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::NoRows`] when the query yields nothing, or the
    /// driver's error when execution or decoding fails.
    async fn query_row(&self, sql: &str, params: &[SqlParam]) -> QueryResult<Vec<SqlValue>>;

    /// Run a query and return every row with its column names
    async fn query_rows(&self, sql: &str, params: &[SqlParam]) -> QueryResult<RowSet>;
}
