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
//! Common types shared by the registry, collections and the exporter

use prometheus::proto::{MetricFamily, MetricType};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

/// Namespace prefixed to every exported metric name
pub const NAMESPACE: &str = "postgresql";

/// Configuration for the metrics HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Address to listen on, `host:port`
    pub listen_address: String,

    /// Path under which metrics are exposed
    pub telemetry_path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:9104".to_string(),
            telemetry_path: "/metrics".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Create new config listening on the given address
    pub fn with_address(listen_address: impl Into<String>) -> Self {
        Self {
            listen_address: listen_address.into(),
            ..Default::default()
        }
    }
}

/// Metric semantics of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Instantaneous reading that moves both ways
    Gauge,
    /// Monotonically non-decreasing total
    Counter,
}

impl MetricKind {
    /// Get string label for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }

    fn from_proto(metric_type: MetricType) -> Self {
        match metric_type {
            MetricType::COUNTER => MetricKind::Counter,
            _ => MetricKind::Gauge,
        }
    }
}

/// Mapping from a statistics view column to an exported metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    /// Column selected from the statistics view
    pub source_column: Cow<'static, str>,
    /// Metric name, without namespace and subsystem
    pub exported_name: Cow<'static, str>,
    /// Help text
    pub help: Cow<'static, str>,
}

impl MetricDefinition {
    /// Definition for a static metric table
    pub const fn fixed(
        source_column: &'static str,
        exported_name: &'static str,
        help: &'static str,
    ) -> Self {
        Self {
            source_column: Cow::Borrowed(source_column),
            exported_name: Cow::Borrowed(exported_name),
            help: Cow::Borrowed(help),
        }
    }

    /// Definition discovered at runtime
    pub fn new(
        source_column: impl Into<String>,
        exported_name: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        Self {
            source_column: Cow::Owned(source_column.into()),
            exported_name: Cow::Owned(exported_name.into()),
            help: Cow::Owned(help.into()),
        }
    }
}

/// Outcome of one scrape cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrapeResult {
    /// Wall-clock duration of the cycle in seconds
    pub duration_seconds: f64,
    /// Whether any collection failed
    pub failed: bool,
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeState {
    /// No cycle in flight
    Idle,
    /// A cycle is running
    Scraping,
}

/// Exported view of a single metric handle
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    /// Fully qualified metric name
    pub name: String,
    /// Help text
    pub help: String,
    /// Gauge or counter
    pub kind: MetricKind,
    /// Label dimension names, in declaration order
    pub label_names: Vec<String>,
    /// Current value for every label tuple seen so far
    pub values: BTreeMap<Vec<String>, f64>,
}

impl MetricSnapshot {
    /// Build a snapshot from a gathered prometheus family
    ///
    /// Label tuples follow the order of the first metric's label pairs,
    /// which prometheus sorts by name. Use [`MetricSnapshot::with_label_order`]
    /// when the declared order is known.
    pub fn from_family(family: &MetricFamily) -> Self {
        let label_names: Vec<String> = family
            .get_metric()
            .first()
            .map(|metric| metric.get_label().iter().map(|l| l.name().to_string()).collect())
            .unwrap_or_default();
        Self::with_label_order(family, label_names)
    }

    /// Build a snapshot whose label tuples follow `label_names`
    pub fn with_label_order(family: &MetricFamily, label_names: Vec<String>) -> Self {
        let kind = MetricKind::from_proto(family.get_field_type());
        let mut values = BTreeMap::new();

        for metric in family.get_metric() {
            let pairs: HashMap<&str, &str> = metric
                .get_label()
                .iter()
                .map(|l| (l.name(), l.value()))
                .collect();
            let tuple: Vec<String> = label_names
                .iter()
                .map(|name| pairs.get(name.as_str()).copied().unwrap_or_default().to_string())
                .collect();
            let value = match kind {
                MetricKind::Counter => metric.get_counter().value(),
                MetricKind::Gauge => metric.get_gauge().value(),
            };
            values.insert(tuple, value);
        }

        Self {
            name: family.name().to_string(),
            help: family.help().to_string(),
            kind,
            label_names,
            values,
        }
    }

    /// Value of the series with the given label values
    pub fn value(&self, label_values: &[&str]) -> Option<f64> {
        let key: Vec<String> = label_values.iter().map(|v| v.to_string()).collect();
        self.values.get(&key).copied()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use prometheus::core::Collector;
    use prometheus::{CounterVec, GaugeVec, Opts};

    #[test]
    fn test_metrics_config_default() {
        let config = MetricsConfig::default();
        assert_eq!(config.listen_address, "0.0.0.0:9104");
        assert_eq!(config.telemetry_path, "/metrics");
    }

    #[test]
    fn test_metrics_config_with_address() {
        let config = MetricsConfig::with_address("127.0.0.1:9187");
        assert_eq!(config.listen_address, "127.0.0.1:9187");
        assert_eq!(config.telemetry_path, "/metrics");
    }

    #[test]
    fn test_metric_kind_labels() {
        assert_eq!(MetricKind::Gauge.as_str(), "gauge");
        assert_eq!(MetricKind::Counter.as_str(), "counter");
    }

    #[test]
    fn test_snapshot_from_gauge_family() {
        let vec = GaugeVec::new(Opts::new("table_size", "Table size"), &["table"]).unwrap();
        vec.with_label_values(&["users"]).set(42.0);
        vec.with_label_values(&["orders"]).set(7.0);

        let families = vec.collect();
        let snapshot = MetricSnapshot::from_family(&families[0]);

        assert_eq!(snapshot.name, "table_size");
        assert_eq!(snapshot.kind, MetricKind::Gauge);
        assert_eq!(snapshot.label_names, vec!["table".to_string()]);
        assert_eq!(snapshot.value(&["users"]), Some(42.0));
        assert_eq!(snapshot.value(&["orders"]), Some(7.0));
        assert_eq!(snapshot.value(&["missing"]), None);
    }

    #[test]
    fn test_snapshot_from_counter_family() {
        let vec = CounterVec::new(Opts::new("hits", "Hits"), &[] as &[&str]).unwrap();
        vec.with_label_values(&[] as &[&str]).inc_by(3.0);

        let snapshot = MetricSnapshot::from_family(&vec.collect()[0]);
        assert_eq!(snapshot.kind, MetricKind::Counter);
        assert!(snapshot.label_names.is_empty());
        assert_eq!(snapshot.value(&[]), Some(3.0));
    }

    #[test]
    fn test_snapshot_keeps_declared_label_order() {
        // prometheus sorts label pairs by name: host before region
        let vec = GaugeVec::new(Opts::new("sessions", "Sessions"), &["region", "host"]).unwrap();
        vec.with_label_values(&["eu", "a"]).set(3.0);

        let family = &vec.collect()[0];
        let declared = vec!["region".to_string(), "host".to_string()];
        let snapshot = MetricSnapshot::with_label_order(family, declared.clone());

        assert_eq!(snapshot.label_names, declared);
        assert_eq!(snapshot.value(&["eu", "a"]), Some(3.0));
        assert_eq!(snapshot.value(&["a", "eu"]), None);

        let sorted = MetricSnapshot::from_family(family);
        assert_eq!(sorted.label_names, vec!["host".to_string(), "region".to_string()]);
        assert_eq!(sorted.value(&["a", "eu"]), Some(3.0));
    }
}
