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
//! Schema inference for custom queries
//!
//! A custom query selects its measure first and its label dimensions after
//! it: `select cnt, region, host from stats` exports `cnt` labeled by
//! `region` and `host`. The shape is read from the query text when the
//! configuration is loaded, so a query that cannot be parsed aborts startup
//! instead of failing every scrape.

use crate::error::{ExporterError, ExporterResult};
use crate::types::MetricKind;
use std::ops::Range;

/// Marker that turns a custom query into a gauge; without it the metric is a counter
pub const GAUGE_MARKER: &str = "gauge_value";

/// Shape of a custom query derived from its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredSchema {
    /// Column holding the numeric value (column 0)
    pub value_column: String,
    /// Label dimension names (columns 1..n), in select order
    pub label_names: Vec<String>,
    /// Gauge or counter
    pub kind: MetricKind,
}

impl InferredSchema {
    /// Total number of selected columns
    pub fn column_count(&self) -> usize {
        self.label_names.len() + 1
    }
}

/// Derive value column, label dimensions and kind from a query's text
///
/// # Errors
///
/// Returns [`ExporterError::Configuration`] when no `select ... from`
/// column list can be found or a column is empty.
pub fn infer_schema(query: &str) -> ExporterResult<InferredSchema> {
    let lowered = query.to_lowercase();
    let masked = mask_quoted(&lowered);
    let list = select_list(&masked).ok_or_else(|| {
        ExporterError::configuration(format!(
            "couldn't parse columns from select clause: {}",
            query.trim()
        ))
    })?;

    let mut columns = Vec::new();
    for expr in split_top_level(&masked, list) {
        let name = column_name(&lowered[expr.clone()], &masked[expr]);
        if name.is_empty() {
            return Err(ExporterError::configuration(format!(
                "empty column in select clause: {}",
                query.trim()
            )));
        }
        columns.push(name);
    }

    let mut columns = columns.into_iter();
    let value_column = columns.next().ok_or_else(|| {
        ExporterError::configuration(format!("select clause has no value column: {}", query.trim()))
    })?;

    let kind = if query.contains(GAUGE_MARKER) {
        MetricKind::Gauge
    } else {
        MetricKind::Counter
    };

    Ok(InferredSchema {
        value_column,
        label_names: columns.collect(),
        kind,
    })
}

/// Copy of `sql` with the contents of quoted literals and identifiers blanked
///
/// Byte offsets are preserved, so positions found in the copy index `sql`.
/// The quote characters themselves are kept; a doubled quote inside a
/// quoted run is an escaped quote and does not close it.
fn mask_quoted(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            None => {
                if c == '\'' || c == '"' {
                    quote = Some(c);
                }
                masked.push(c);
            }
            Some(q) if c == q => {
                if chars.peek() == Some(&q) {
                    chars.next();
                    masked.push_str("  ");
                } else {
                    quote = None;
                    masked.push(c);
                }
            }
            Some(_) => masked.push_str(&" ".repeat(c.len_utf8())),
        }
    }
    masked
}

/// Byte range between the first `select` keyword and the first `from`
/// keyword after it that is not nested inside parentheses
fn select_list(masked: &str) -> Option<Range<usize>> {
    let start = find_keyword(masked, "select", 0)?.1;
    let mut depth = 0usize;
    let mut search = start;

    while let Some((at, end)) = find_keyword(masked, "from", search) {
        let (open, close) = paren_delta(&masked[search..at]);
        depth = (depth + open).saturating_sub(close);
        if depth == 0 {
            return Some(start..at);
        }
        search = end;
    }
    None
}

/// Count of opening and closing parentheses in a slice
fn paren_delta(s: &str) -> (usize, usize) {
    s.chars().fold((0, 0), |(open, close), c| match c {
        '(' => (open + 1, close),
        ')' => (open, close + 1),
        _ => (open, close),
    })
}

/// Find `keyword` as a whole word at or after `from`; returns its start and end
fn find_keyword(haystack: &str, keyword: &str, from: usize) -> Option<(usize, usize)> {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut offset = from;

    while let Some(pos) = haystack[offset..].find(keyword) {
        let at = offset + pos;
        let end = at + keyword.len();
        let before_ok = haystack[..at].chars().next_back().map_or(true, |c| !is_ident(c));
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_ident(c));
        if before_ok && after_ok {
            return Some((at, end));
        }
        offset = end;
    }
    None
}

/// Split a column list on commas outside parentheses
fn split_top_level(masked: &str, list: Range<usize>) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = list.start;

    for (i, c) in masked[list.clone()].char_indices() {
        let i = list.start + i;
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(start..i);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(start..list.end);
    parts
}

/// Name of a selected column: its alias when aliased, otherwise the trimmed expression
fn column_name(expr: &str, masked: &str) -> String {
    let leading = expr.len() - expr.trim_start().len();
    let trailing = expr.len() - expr.trim_end().len();
    if leading + trailing >= expr.len() {
        return String::new();
    }
    let (expr, masked) = (
        &expr[leading..expr.len() - trailing],
        &masked[leading..masked.len() - trailing],
    );

    match find_last_keyword(masked, "as") {
        Some(end) => expr[end..].trim().trim_matches('"').to_string(),
        None => expr.trim_matches('"').to_string(),
    }
}

fn find_last_keyword(masked: &str, keyword: &str) -> Option<usize> {
    let mut last = None;
    let mut from = 0;
    while let Some((at, end)) = find_keyword(masked, keyword, from) {
        // only aliases outside function calls count
        let (open, close) = paren_delta(&masked[..at]);
        if open == close {
            last = Some(end);
        }
        from = end;
    }
    last
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_value_first_labels_after() {
        let schema = infer_schema("select cnt, region, host from stats").unwrap();
        assert_eq!(schema.value_column, "cnt");
        assert_eq!(schema.label_names, vec!["region", "host"]);
        assert_eq!(schema.column_count(), 3);
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let schema = infer_schema("SELECT Cnt, Region FROM stats").unwrap();
        assert_eq!(schema.value_column, "cnt");
        assert_eq!(schema.label_names, vec!["region"]);
    }

    #[test]
    fn test_single_column_has_no_labels() {
        let schema = infer_schema("select count(*) from pg_stat_activity").unwrap();
        assert_eq!(schema.value_column, "count(*)");
        assert!(schema.label_names.is_empty());
    }

    #[test]
    fn test_aliases_and_nested_commas() {
        let schema = infer_schema(
            "select coalesce(sum(n_live_tup), 0) as rows, schemaname as schema from pg_stat_user_tables group by schemaname",
        )
        .unwrap();
        assert_eq!(schema.value_column, "rows");
        assert_eq!(schema.label_names, vec!["schema"]);
    }

    #[test]
    fn test_subquery_in_select_list() {
        let schema = infer_schema(
            "select (select count(*) from pg_locks) as locks, datname from pg_database",
        )
        .unwrap();
        assert_eq!(schema.value_column, "locks");
        assert_eq!(schema.label_names, vec!["datname"]);
    }

    #[test]
    fn test_gauge_marker() {
        let gauge = infer_schema("select count(*) as gauge_value, state from pg_stat_activity group by state").unwrap();
        assert_eq!(gauge.kind, MetricKind::Gauge);
        assert_eq!(gauge.value_column, "gauge_value");

        let counter = infer_schema("select xact_commit, datname from pg_stat_database").unwrap();
        assert_eq!(counter.kind, MetricKind::Counter);
    }

    #[test]
    fn test_identifiers_containing_keywords() {
        let schema = infer_schema("select fromage, selection from cheese").unwrap();
        assert_eq!(schema.value_column, "fromage");
        assert_eq!(schema.label_names, vec!["selection"]);
    }

    #[test]
    fn test_commas_inside_string_literals() {
        let schema = infer_schema("select cnt, 'a,b' as tag from stats").unwrap();
        assert_eq!(schema.value_column, "cnt");
        assert_eq!(schema.label_names, vec!["tag"]);
    }

    #[test]
    fn test_keywords_inside_string_literals() {
        let schema = infer_schema("select cnt, 'from' as src, host from stats").unwrap();
        assert_eq!(schema.label_names, vec!["src", "host"]);

        let schema = infer_schema("select cnt, 'came from (nowhere' as origin from stats").unwrap();
        assert_eq!(schema.label_names, vec!["origin"]);
    }

    #[test]
    fn test_escaped_quotes_and_quoted_identifiers() {
        let schema = infer_schema("select cnt, 'it''s, from here' as note from stats").unwrap();
        assert_eq!(schema.label_names, vec!["note"]);

        let schema = infer_schema(r#"select cnt, "host, as from" from stats"#).unwrap();
        assert_eq!(schema.label_names, vec!["host, as from"]);

        let schema = infer_schema(r#"select cnt as "total", region from stats"#).unwrap();
        assert_eq!(schema.value_column, "total");
    }

    #[test]
    fn test_unterminated_literal_is_unparseable() {
        let err = infer_schema("select cnt, 'eu from stats").unwrap_err();
        assert!(matches!(err, ExporterError::Configuration(_)));
    }

    #[test]
    fn test_mask_keeps_offsets() {
        let sql = "select 'héllo, from', x from t";
        let masked = mask_quoted(sql);
        assert_eq!(masked.len(), sql.len());
        assert_eq!(masked.matches("from").count(), 1);
        assert_eq!(masked.matches(',').count(), 1);
    }

    #[test]
    fn test_unparseable_queries() {
        for query in ["", "show all", "select cnt", "select from stats", "select cnt,, host from stats"] {
            let err = infer_schema(query).unwrap_err();
            assert!(
                matches!(err, ExporterError::Configuration(_)),
                "expected configuration error for {:?}",
                query
            );
        }
    }

    proptest! {
        #[test]
        fn prop_labels_follow_value_column(columns in prop::collection::vec("[a-z][a-z0-9_]{0,8}", 1..6)) {
            prop_assume!(columns.iter().all(|c| c != "from" && c != "select" && c != "as"));
            let query = format!("select {} from t", columns.join(", "));
            let schema = infer_schema(&query).unwrap();
            prop_assert_eq!(&schema.value_column, &columns[0]);
            prop_assert_eq!(&schema.label_names[..], &columns[1..]);
        }
    }
}
