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
//! Scrape orchestration
//!
//! The [`Exporter`] owns the shared data source and an ordered list of
//! collections. Every poll of the metrics endpoint runs one full scrape
//! cycle under a single lock, so concurrent polls serialize into separate
//! cycles instead of interleaving.
//!
//! A cycle is fail-fast: collections run in registration order and the
//! first failure skips the rest. Nothing is rolled back, so the exposition
//! always carries the last successfully scraped value of every metric seen
//! so far, plus three meta metrics describing the cycles themselves.

use prometheus::proto::MetricFamily;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::collections::Collection;
use crate::error::ExporterResult;
use crate::registry::{MetricHandle, MetricRegistry};
use crate::source::DataSource;
use crate::types::{MetricKind, MetricSnapshot, ScrapeResult, ScrapeState};

const NO_LABELS: &[&str] = &[];

#[derive(Debug)]
struct MetaMetrics {
    registry: MetricRegistry,
    duration: MetricHandle,
    error: MetricHandle,
    scrapes: MetricHandle,
}

impl MetaMetrics {
    fn new() -> ExporterResult<Self> {
        let registry = MetricRegistry::with_subsystem("exporter");
        let duration = registry.get_or_create(
            "last_scrape_duration_seconds",
            "Duration of the last scrape of metrics from PostgreSQL",
            NO_LABELS,
            MetricKind::Gauge,
        )?;
        let error = registry.get_or_create(
            "last_scrape_error",
            "Whether the last scrape of metrics from PostgreSQL resulted in an error (1 for error, 0 for success)",
            NO_LABELS,
            MetricKind::Gauge,
        )?;
        let scrapes = registry.get_or_create(
            "scrapes_total",
            "Total number of times PostgreSQL was scraped for metrics",
            NO_LABELS,
            MetricKind::Counter,
        )?;

        for handle in [&duration, &error, &scrapes] {
            registry.set_value(handle, NO_LABELS, 0.0)?;
        }

        Ok(Self {
            registry,
            duration,
            error,
            scrapes,
        })
    }
}

#[derive(Debug, Default)]
struct CycleState {
    scrapes: u64,
    last: Option<ScrapeResult>,
}

/// Resets the state flag even when the cycle future is dropped mid-flight
struct ScrapingGuard<'a>(&'a AtomicBool);

impl<'a> ScrapingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ScrapingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives scrape cycles over an ordered list of collections
#[derive(Debug)]
pub struct Exporter {
    source: Arc<dyn DataSource>,
    collections: Vec<Arc<dyn Collection>>,
    cycle: Mutex<CycleState>,
    scraping: AtomicBool,
    meta: MetaMetrics,
}

impl Exporter {
    /// Create an exporter with no collections
    pub fn new(source: Arc<dyn DataSource>) -> ExporterResult<Self> {
        Ok(Self {
            source,
            collections: Vec::new(),
            cycle: Mutex::new(CycleState::default()),
            scraping: AtomicBool::new(false),
            meta: MetaMetrics::new()?,
        })
    }

    /// Append a collection; collections are scraped in the order they were added
    pub fn with_collection(mut self, collection: Arc<dyn Collection>) -> Self {
        self.register(collection);
        self
    }

    /// Append a collection to an exporter under construction
    pub fn register(&mut self, collection: Arc<dyn Collection>) {
        debug!(collection = collection.name(), "Registered collection");
        self.collections.push(collection);
    }

    /// Registered collection names, in scrape order
    pub fn collection_names(&self) -> Vec<&'static str> {
        self.collections.iter().map(|c| c.name()).collect()
    }

    /// Whether a cycle is in flight
    pub fn state(&self) -> ScrapeState {
        if self.scraping.load(Ordering::SeqCst) {
            ScrapeState::Scraping
        } else {
            ScrapeState::Idle
        }
    }

    /// Outcome of the most recent cycle
    pub async fn last_result(&self) -> Option<ScrapeResult> {
        self.cycle.lock().await.last
    }

    /// Run one scrape cycle and return the complete exposition
    ///
    /// Waits for any cycle already in flight, then runs a fresh one. The
    /// returned families reflect exactly this cycle's outcome.
    pub async fn collect(&self) -> Vec<MetricFamily> {
        let mut cycle = self.cycle.lock().await;
        self.run_cycle(&mut cycle).await;
        self.export().await
    }

    /// Run one scrape cycle without exporting
    pub async fn scrape(&self) -> ScrapeResult {
        let mut cycle = self.cycle.lock().await;
        self.run_cycle(&mut cycle).await
    }

    async fn run_cycle(&self, cycle: &mut CycleState) -> ScrapeResult {
        let _scraping = ScrapingGuard::enter(&self.scraping);

        cycle.scrapes += 1;
        if let Err(e) = self
            .meta
            .registry
            .set_value(&self.meta.scrapes, NO_LABELS, cycle.scrapes as f64)
        {
            error!(error = %e, "Failed to record scrape count");
        }

        let start = Instant::now();
        let mut failed = false;

        for collection in &self.collections {
            if let Err(e) = collection.scrape(self.source.as_ref()).await {
                error!(
                    collection = collection.name(),
                    error = %e,
                    "Error scraping PostgreSQL metrics"
                );
                failed = true;
                break;
            }
            debug!(collection = collection.name(), "Scraped collection");
        }

        let result = ScrapeResult {
            duration_seconds: start.elapsed().as_secs_f64(),
            failed,
        };
        self.record(&result);
        cycle.last = Some(result);

        debug!(
            duration_seconds = result.duration_seconds,
            failed = result.failed,
            "Scrape cycle complete"
        );
        result
    }

    fn record(&self, result: &ScrapeResult) {
        let error = if result.failed { 1.0 } else { 0.0 };
        let meta = &self.meta;
        let recorded = meta
            .registry
            .set_value(&meta.duration, NO_LABELS, result.duration_seconds)
            .and_then(|()| meta.registry.set_value(&meta.error, NO_LABELS, error));
        if let Err(e) = recorded {
            error!(error = %e, "Failed to record scrape result");
        }
    }

    /// Current values of the meta metrics and every collection, without scraping
    ///
    /// Meta metrics come first, then each collection's metrics in
    /// registration order, each group sorted by name.
    pub async fn export(&self) -> Vec<MetricFamily> {
        let mut families = self.meta.registry.export_all();
        for collection in &self.collections {
            families.extend(collection.export_all().await);
        }
        families
    }

    /// [`Exporter::export`] as snapshots, label tuples in declaration order
    pub async fn snapshot(&self) -> Vec<MetricSnapshot> {
        let mut snapshots = self.meta.registry.snapshot();
        for collection in &self.collections {
            snapshots.extend(collection.snapshot().await);
        }
        snapshots
    }
}
