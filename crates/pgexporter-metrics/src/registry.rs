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
//! Name-keyed registry of lazily created metric handles
//!
//! Collections discover metric names at scrape time. The first time a name
//! is seen a handle is created with a fixed kind and label set; every later
//! lookup returns that same handle. Handles are never removed, so a label
//! tuple that stops appearing keeps its last observed value.

use parking_lot::RwLock;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, Opts};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::error::{ExporterError, ExporterResult};
use crate::types::{MetricKind, MetricSnapshot, NAMESPACE};

#[derive(Clone)]
enum Series {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

/// A named, help-annotated gauge or counter family
///
/// Name, kind and label dimension names are fixed at creation. A handle
/// without label dimensions holds a single series keyed by the empty tuple.
/// Cloning is cheap and clones share their values.
#[derive(Clone)]
pub struct MetricHandle {
    name: Arc<str>,
    help: Arc<str>,
    kind: MetricKind,
    label_names: Arc<[String]>,
    series: Series,
}

impl fmt::Debug for MetricHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricHandle")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("label_names", &self.label_names)
            .finish()
    }
}

impl MetricHandle {
    fn new(opts: Opts, kind: MetricKind, label_names: &[String]) -> ExporterResult<Self> {
        let fq_name = opts.fq_name();
        let help = opts.help.clone();
        let labels: Vec<&str> = label_names.iter().map(String::as_str).collect();

        let series = match kind {
            MetricKind::Gauge => Series::Gauge(GaugeVec::new(opts, &labels)?),
            MetricKind::Counter => Series::Counter(CounterVec::new(opts, &labels)?),
        };

        Ok(Self {
            name: fq_name.into(),
            help: help.into(),
            kind,
            label_names: label_names.into(),
            series,
        })
    }

    /// Fully qualified metric name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Gauge or counter
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Label dimension names
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Whether two handles are the same registered metric
    pub fn same_identity(&self, other: &MetricHandle) -> bool {
        self.name == other.name && self.kind == other.kind && self.label_names == other.label_names
    }

    /// Current value of one series, if it has been set
    pub fn value<S: AsRef<str>>(&self, label_values: &[S]) -> Option<f64> {
        let key: Vec<&str> = label_values.iter().map(AsRef::as_ref).collect();
        self.snapshot().and_then(|snapshot| snapshot.value(&key))
    }

    /// Current values keyed by label tuples in declaration order
    ///
    /// `None` until the first series has been set.
    pub fn snapshot(&self) -> Option<MetricSnapshot> {
        self.families()
            .iter()
            .find(|family| !family.get_metric().is_empty())
            .map(|family| MetricSnapshot::with_label_order(family, self.label_names.to_vec()))
    }

    fn families(&self) -> Vec<MetricFamily> {
        match &self.series {
            Series::Gauge(vec) => vec.collect(),
            Series::Counter(vec) => vec.collect(),
        }
    }
}

/// Store of metric handles for one collection
///
/// Thread-safe and cheap to clone; clones share the same handles.
#[derive(Clone)]
pub struct MetricRegistry {
    inner: Arc<MetricRegistryInner>,
}

struct MetricRegistryInner {
    subsystem: Option<String>,
    handles: RwLock<HashMap<String, MetricHandle>>,
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("subsystem", &self.inner.subsystem)
            .field("handles", &self.len())
            .finish()
    }
}

impl MetricRegistry {
    /// Create an empty registry whose metrics are named `postgresql_<name>`
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create an empty registry whose metrics are named `postgresql_<subsystem>_<name>`
    pub fn with_subsystem(subsystem: impl Into<String>) -> Self {
        Self::build(Some(subsystem.into()))
    }

    fn build(subsystem: Option<String>) -> Self {
        Self {
            inner: Arc::new(MetricRegistryInner {
                subsystem,
                handles: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Return the handle registered under `name`, creating it on first sight
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Configuration`] when `name` already exists with
    /// a different kind or label set, and [`ExporterError::Prometheus`] when
    /// the name or a label name is not a valid metric identifier.
    pub fn get_or_create<S: AsRef<str>>(
        &self,
        name: &str,
        help: &str,
        label_names: &[S],
        kind: MetricKind,
    ) -> ExporterResult<MetricHandle> {
        let label_names: Vec<String> = label_names.iter().map(|l| l.as_ref().to_string()).collect();

        if let Some(handle) = self.inner.handles.read().get(name) {
            return check_shape(handle, &label_names, kind).map(|()| handle.clone());
        }

        let mut handles = self.inner.handles.write();
        // another writer may have created it between the two locks
        if let Some(handle) = handles.get(name) {
            return check_shape(handle, &label_names, kind).map(|()| handle.clone());
        }

        let mut opts = Opts::new(name, help).namespace(NAMESPACE);
        if let Some(subsystem) = &self.inner.subsystem {
            opts = opts.subsystem(subsystem.as_str());
        }
        let handle = MetricHandle::new(opts, kind, &label_names)?;

        info!(
            metric = handle.name(),
            kind = kind.as_str(),
            labels = ?label_names,
            "Registered metric"
        );
        handles.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Set the scalar for one label tuple, creating the tuple on first sight
    ///
    /// Counters take absolute readings: the series advances by the difference
    /// to the current value, and restarts from the reading when it went
    /// backwards (statistics reset on the server).
    pub fn set_value<S: AsRef<str>>(
        &self,
        handle: &MetricHandle,
        label_values: &[S],
        value: f64,
    ) -> ExporterResult<()> {
        if label_values.len() != handle.label_names.len() {
            return Err(ExporterError::SchemaMismatch {
                name: handle.name().to_string(),
                expected: handle.label_names.len(),
                actual: label_values.len(),
            });
        }
        let values: Vec<&str> = label_values.iter().map(AsRef::as_ref).collect();

        match &handle.series {
            Series::Gauge(vec) => vec.get_metric_with_label_values(&values)?.set(value),
            Series::Counter(vec) => {
                if !value.is_finite() || value < 0.0 {
                    return Err(ExporterError::InvalidCounterValue {
                        name: handle.name().to_string(),
                        value,
                    });
                }
                let counter = vec.get_metric_with_label_values(&values)?;
                let current = counter.get();
                if value >= current {
                    counter.inc_by(value - current);
                } else {
                    counter.reset();
                    counter.inc_by(value);
                }
            }
        }
        Ok(())
    }

    /// Handle registered under `name`
    pub fn get(&self, name: &str) -> Option<MetricHandle> {
        self.inner.handles.read().get(name).cloned()
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.inner.handles.read().len()
    }

    /// Whether no handle has been registered yet
    pub fn is_empty(&self) -> bool {
        self.inner.handles.read().is_empty()
    }

    /// Gather every handle's current values, ordered by metric name
    ///
    /// Handles without any series yet are omitted.
    pub fn export_all(&self) -> Vec<MetricFamily> {
        let handles = self.inner.handles.read();
        let mut families: Vec<MetricFamily> = handles
            .values()
            .flat_map(MetricHandle::families)
            .filter(|family| !family.get_metric().is_empty())
            .collect();
        families.sort_by(|a, b| a.name().cmp(b.name()));
        families
    }

    /// Snapshot of every handle with at least one series, ordered by metric name
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        let handles = self.inner.handles.read();
        let mut snapshots: Vec<MetricSnapshot> =
            handles.values().filter_map(MetricHandle::snapshot).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn check_shape(handle: &MetricHandle, label_names: &[String], kind: MetricKind) -> ExporterResult<()> {
    if handle.kind != kind || *handle.label_names != *label_names {
        return Err(ExporterError::configuration(format!(
            "metric '{}' already registered as {} with labels {:?}, requested {} with labels {:?}",
            handle.name(),
            handle.kind.as_str(),
            handle.label_names,
            kind.as_str(),
            label_names
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NO_LABELS: &[&str] = &[];

    #[test]
    fn test_registry_creation() {
        let registry = MetricRegistry::with_subsystem("buffers");
        assert!(registry.is_empty());
        assert!(registry.export_all().is_empty());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = MetricRegistry::with_subsystem("tables");

        let first = registry
            .get_or_create("size_bytes", "Total table size", &["table"], MetricKind::Gauge)
            .unwrap();
        let second = registry
            .get_or_create("size_bytes", "Total table size", &["table"], MetricKind::Gauge)
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(first.same_identity(&second));
        assert_eq!(first.name(), "postgresql_tables_size_bytes");
        assert_eq!(first.label_names(), &["table".to_string()]);

        // clones share values
        registry.set_value(&first, &["users"], 10.0).unwrap();
        assert_eq!(second.value(&["users"]), Some(10.0));
    }

    #[test]
    fn test_label_shape_conflict_is_configuration_error() {
        let registry = MetricRegistry::new();
        registry
            .get_or_create("queries", "Queries", &["region"], MetricKind::Gauge)
            .unwrap();

        let err = registry
            .get_or_create("queries", "Queries", &["region", "host"], MetricKind::Gauge)
            .unwrap_err();
        assert!(matches!(err, ExporterError::Configuration(_)));

        let err = registry
            .get_or_create("queries", "Queries", &["region"], MetricKind::Counter)
            .unwrap_err();
        assert!(matches!(err, ExporterError::Configuration(_)));

        // the original handle is untouched
        let handle = registry.get("queries").unwrap();
        assert_eq!(handle.kind(), MetricKind::Gauge);
        assert_eq!(handle.label_names(), &["region".to_string()]);
    }

    #[test]
    fn test_invalid_label_name_rejected() {
        let registry = MetricRegistry::new();
        let err = registry
            .get_or_create("bad", "Bad", &["count(*)"], MetricKind::Gauge)
            .unwrap_err();
        assert!(matches!(err, ExporterError::Prometheus(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_set_value_per_label_tuple() {
        let registry = MetricRegistry::new();
        let handle = registry
            .get_or_create("sessions", "Sessions", &["region", "host"], MetricKind::Gauge)
            .unwrap();

        registry.set_value(&handle, &["eu", "a"], 1.0).unwrap();
        registry.set_value(&handle, &["eu", "b"], 2.0).unwrap();
        registry.set_value(&handle, &["eu", "a"], 5.0).unwrap();

        assert_eq!(handle.value(&["eu", "a"]), Some(5.0));
        assert_eq!(handle.value(&["eu", "b"]), Some(2.0));
        assert_eq!(handle.value(&["us", "a"]), None);
        // tuples are read back in declaration order, not sorted by label name
        assert_eq!(handle.value(&["a", "eu"]), None);
    }

    #[test]
    fn test_registry_snapshot_uses_declared_label_order() {
        let registry = MetricRegistry::new();
        let handle = registry
            .get_or_create("sessions", "Sessions", &["region", "host"], MetricKind::Gauge)
            .unwrap();
        registry
            .get_or_create("idle", "Idle", NO_LABELS, MetricKind::Gauge)
            .unwrap();
        registry.set_value(&handle, &["eu", "a"], 4.0).unwrap();

        let snapshots = registry.snapshot();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].name, "postgresql_sessions");
        assert_eq!(snapshots[0].label_names, vec!["region", "host"]);
        assert_eq!(snapshots[0].value(&["eu", "a"]), Some(4.0));
    }

    #[test]
    fn test_set_value_wrong_arity() {
        let registry = MetricRegistry::new();
        let handle = registry
            .get_or_create("sessions", "Sessions", &["region"], MetricKind::Gauge)
            .unwrap();

        let err = registry.set_value(&handle, &["eu", "a"], 1.0).unwrap_err();
        assert!(matches!(
            err,
            ExporterError::SchemaMismatch { expected: 1, actual: 2, .. }
        ));
        assert!(registry.export_all().is_empty());
    }

    #[test]
    fn test_counter_follows_absolute_readings() {
        let registry = MetricRegistry::new();
        let handle = registry
            .get_or_create("commits", "Commits", NO_LABELS, MetricKind::Counter)
            .unwrap();

        registry.set_value(&handle, NO_LABELS, 10.0).unwrap();
        registry.set_value(&handle, NO_LABELS, 25.0).unwrap();
        assert_eq!(handle.value(NO_LABELS), Some(25.0));

        // server statistics were reset
        registry.set_value(&handle, NO_LABELS, 4.0).unwrap();
        assert_eq!(handle.value(NO_LABELS), Some(4.0));

        let err = registry.set_value(&handle, NO_LABELS, -1.0).unwrap_err();
        assert!(matches!(err, ExporterError::InvalidCounterValue { .. }));
        let err = registry.set_value(&handle, NO_LABELS, f64::NAN).unwrap_err();
        assert!(matches!(err, ExporterError::InvalidCounterValue { .. }));
        assert_eq!(handle.value(NO_LABELS), Some(4.0));
    }

    #[test]
    fn test_export_all_sorted_and_stable() {
        let registry = MetricRegistry::with_subsystem("buffers");
        for name in ["buffers_clean", "buffers_alloc", "maxwritten_clean"] {
            let handle = registry
                .get_or_create(name, "help", NO_LABELS, MetricKind::Gauge)
                .unwrap();
            registry.set_value(&handle, NO_LABELS, 1.0).unwrap();
        }
        // registered but never set
        registry
            .get_or_create("buffers_backend", "help", NO_LABELS, MetricKind::Gauge)
            .unwrap();

        let names: Vec<String> = registry
            .export_all()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "postgresql_buffers_buffers_alloc",
                "postgresql_buffers_buffers_clean",
                "postgresql_buffers_maxwritten_clean",
            ]
        );
        assert_eq!(registry.export_all(), registry.export_all());
    }

    #[test]
    fn test_concurrent_get_or_create_yields_one_handle() {
        use std::thread;

        let registry = MetricRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let handle = registry
                        .get_or_create("shared", "Shared", &["worker"], MetricKind::Gauge)
                        .unwrap();
                    registry
                        .set_value(&handle, &[i.to_string()], f64::from(i))
                        .unwrap();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 1);
        let families = registry.export_all();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_metric().len(), 8);
    }
}
