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
//! In-memory scripted data source for testing
//!
//! Responses are registered against a SQL *pattern*: any executed statement
//! containing the pattern is answered with the scripted response. When
//! several patterns match, the most recently registered one wins, so a broad
//! pattern can be registered first and refined afterwards.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pgexporter_metrics::source::{DataSource, MockDataSource, RowSet, SqlValue};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = MockDataSource::new();
//!     source.respond(
//!         "pg_stat_activity",
//!         RowSet::new(&["count"]).with_row([SqlValue::Int(3)]),
//!     );
//!
//!     let row = source.query_row("SELECT count(*) FROM pg_stat_activity", &[]).await?;
//!     assert_eq!(row, vec![SqlValue::Int(3)]);
//!     assert_eq!(source.calls("pg_stat_activity"), 1);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use super::{DataSource, QueryError, QueryResult, RowSet, SqlParam, SqlValue};

#[derive(Debug, Clone)]
enum Response {
    Rows(RowSet),
    Fail(String),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    params: Option<Vec<SqlParam>>,
    response: Response,
}

impl Rule {
    fn matches(&self, sql: &str, params: &[SqlParam]) -> bool {
        sql.contains(&self.pattern)
            && self
                .params
                .as_ref()
                .map_or(true, |expected| expected.as_slice() == params)
    }
}

#[derive(Debug, Default)]
struct MockState {
    rules: Vec<Rule>,
    executed: Vec<(String, Vec<SqlParam>)>,
}

/// Scripted data source
///
/// Cloning shares the script and the execution log, so a test can keep a
/// handle while the exporter owns another.
#[derive(Clone, Default)]
pub struct MockDataSource {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockDataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockDataSource")
            .field("rules", &state.rules.len())
            .field("executed", &state.executed.len())
            .finish()
    }
}

impl MockDataSource {
    /// Create a mock with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `pattern` with `rows`
    pub fn respond(&self, pattern: &str, rows: RowSet) -> &Self {
        self.push(pattern, None, Response::Rows(rows))
    }

    /// Answer statements containing `pattern` and bound with exactly `params`
    pub fn respond_with_params(&self, pattern: &str, params: Vec<SqlParam>, rows: RowSet) -> &Self {
        self.push(pattern, Some(params), Response::Rows(rows))
    }

    /// Fail statements containing `pattern`
    pub fn fail(&self, pattern: &str, message: &str) -> &Self {
        self.push(pattern, None, Response::Fail(message.to_string()))
    }

    fn push(&self, pattern: &str, params: Option<Vec<SqlParam>>, response: Response) -> &Self {
        self.state.lock().rules.push(Rule {
            pattern: pattern.to_string(),
            params,
            response,
        });
        self
    }

    /// Number of executed statements containing `pattern`
    pub fn calls(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .executed
            .iter()
            .filter(|(sql, _)| sql.contains(pattern))
            .count()
    }

    /// Every executed statement with its parameters, in execution order
    pub fn executed(&self) -> Vec<(String, Vec<SqlParam>)> {
        self.state.lock().executed.clone()
    }

    /// Forget the execution log, keeping the script
    pub fn reset_calls(&self) {
        self.state.lock().executed.clear();
    }

    fn answer(&self, sql: &str, params: &[SqlParam]) -> QueryResult<RowSet> {
        let mut state = self.state.lock();
        state.executed.push((sql.to_string(), params.to_vec()));

        let rule = state
            .rules
            .iter()
            .rev()
            .find(|rule| rule.matches(sql, params))
            .ok_or_else(|| QueryError::Unexpected(format!("no scripted response for: {}", sql)))?;

        match &rule.response {
            Response::Rows(rows) => Ok(rows.clone()),
            Response::Fail(message) => Err(QueryError::Unexpected(message.clone())),
        }
    }
}

#[async_trait]
impl DataSource for MockDataSource {
    async fn query_row(&self, sql: &str, params: &[SqlParam]) -> QueryResult<Vec<SqlValue>> {
        self.answer(sql, params)?
            .rows
            .into_iter()
            .next()
            .ok_or(QueryError::NoRows)
    }

    async fn query_rows(&self, sql: &str, params: &[SqlParam]) -> QueryResult<RowSet> {
        self.answer(sql, params)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unscripted_query_fails() {
        let source = MockDataSource::new();
        let result = source.query_rows("SELECT 1", &[]).await;
        assert!(matches!(result, Err(QueryError::Unexpected(_))));
        assert_eq!(source.calls("SELECT 1"), 1);
    }

    #[tokio::test]
    async fn test_latest_rule_wins() {
        let source = MockDataSource::new();
        source
            .respond("pg_stat_activity", RowSet::new(&["count"]).with_row([3i64]))
            .respond("ilike 'select%'", RowSet::new(&["count"]).with_row([2i64]));

        let all = source
            .query_row("SELECT count(*) FROM pg_stat_activity", &[])
            .await
            .unwrap();
        let selects = source
            .query_row("SELECT count(*) FROM pg_stat_activity WHERE query ilike 'select%'", &[])
            .await
            .unwrap();

        assert_eq!(all, vec![SqlValue::Int(3)]);
        assert_eq!(selects, vec![SqlValue::Int(2)]);
    }

    #[tokio::test]
    async fn test_param_specific_rule() {
        let source = MockDataSource::new();
        source
            .respond("pg_database_size", RowSet::new(&["size"]).with_row([1i64]))
            .respond_with_params(
                "pg_database_size",
                vec![SqlParam::from("shop")],
                RowSet::new(&["size"]).with_row([2048i64]),
            );

        let shop = source
            .query_row("SELECT pg_database_size($1)", &[SqlParam::from("shop")])
            .await
            .unwrap();
        let other = source
            .query_row("SELECT pg_database_size($1)", &[SqlParam::from("blog")])
            .await
            .unwrap();

        assert_eq!(shop, vec![SqlValue::Int(2048)]);
        assert_eq!(other, vec![SqlValue::Int(1)]);
    }

    #[tokio::test]
    async fn test_query_row_without_rows() {
        let source = MockDataSource::new();
        source.respond("pg_stat_bgwriter", RowSet::new(&["buffers_alloc"]));

        let result = source.query_row("SELECT buffers_alloc FROM pg_stat_bgwriter", &[]).await;
        assert!(matches!(result, Err(QueryError::NoRows)));
    }

    #[tokio::test]
    async fn test_failure_and_reset() {
        let source = MockDataSource::new();
        source.fail("pg_stat_database", "connection refused");

        let err = source.query_rows("SELECT * FROM pg_stat_database", &[]).await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");

        source.reset_calls();
        assert_eq!(source.calls("pg_stat_database"), 0);
        assert!(source.executed().is_empty());
    }
}
