//! Bounded rolling buffers of metric samples keyed by category.
//!
//! The store is the foundation every other component reads from. Samples are
//! immutable once recorded and shared as `Arc`s, so a snapshot handed to a
//! consumer can never observe a half-written sample: writers only swap whole
//! samples in under the map's shard lock.
//!
//! Each category is written by a single dedicated collector (single-writer
//! discipline), while snapshot readers may run concurrently with collection of
//! the next cycle's data.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, collections::VecDeque, sync::Arc};

/// A single timestamped metric observation. Immutable once stored.
///
/// Categories are opaque strings ("system", "application", "business",
/// "performance", or synthetic `health_<name>` categories); the payload shape
/// is category-specific and opaque to the engine except for fields referenced
/// by alert conditions and tracked baselines.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    /// Category this sample belongs to.
    pub category: String,
    /// Category-specific key/value payload.
    pub payload: Map<String, Value>,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
}

/// Consistent point-in-time view: the latest sample per known category.
///
/// All evaluations in one cycle (rules, anomaly detection, report generation)
/// run against the same snapshot instance.
#[derive(Debug, Clone)]
pub struct Snapshot {
    samples: BTreeMap<String, Arc<MetricSample>>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Returns the latest sample for `category`, if any.
    #[must_use]
    pub fn sample(&self, category: &str) -> Option<&Arc<MetricSample>> {
        self.samples.get(category)
    }

    /// Extracts a numeric field from a category's latest sample.
    ///
    /// One level of nesting is supported with a `.` separator, e.g.
    /// `"heap.used_percent"` reads `payload["heap"]["used_percent"]`.
    /// Returns `None` if the category, field, or numeric value is absent.
    #[must_use]
    pub fn field(&self, category: &str, field: &str) -> Option<f64> {
        let payload = &self.samples.get(category)?.payload;
        let value = match field.split_once('.') {
            Some((outer, inner)) => payload.get(outer)?.as_object()?.get(inner)?,
            None => payload.get(field)?,
        };
        value.as_f64()
    }

    /// Returns the capture age of a category's latest sample, or `None` if
    /// the category has never been observed.
    #[must_use]
    pub fn age(&self, category: &str) -> Option<chrono::Duration> {
        let sample = self.samples.get(category)?;
        Some(self.taken_at.signed_duration_since(sample.captured_at))
    }

    /// When the snapshot was taken.
    #[must_use]
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Iterates over `(category, sample)` pairs in category order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<MetricSample>)> {
        self.samples.iter()
    }

    /// Number of categories present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the snapshot contains no categories.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Bounded per-category ring buffers with FIFO eviction.
pub struct MetricStore {
    capacity: usize,
    series: DashMap<String, VecDeque<Arc<MetricSample>>>,
}

impl MetricStore {
    /// Creates a store retaining at most `capacity` samples per category.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), series: DashMap::new() }
    }

    /// Appends a timestamped sample, evicting the oldest if the category is
    /// at capacity. Returns the stored sample.
    pub fn record(&self, category: &str, payload: Map<String, Value>) -> Arc<MetricSample> {
        let sample = Arc::new(MetricSample {
            category: category.to_string(),
            payload,
            captured_at: Utc::now(),
        });

        let mut buffer = self.series.entry(category.to_string()).or_default();
        buffer.push_back(Arc::clone(&sample));
        while buffer.len() > self.capacity {
            buffer.pop_front();
        }

        sample
    }

    /// Returns the most recent sample for `category`, if any.
    #[must_use]
    pub fn latest(&self, category: &str) -> Option<Arc<MetricSample>> {
        self.series.get(category).and_then(|buffer| buffer.back().cloned())
    }

    /// Returns up to the `n` most recent samples for `category`, oldest first.
    #[must_use]
    pub fn history(&self, category: &str, n: usize) -> Vec<Arc<MetricSample>> {
        match self.series.get(category) {
            Some(buffer) => {
                let skip = buffer.len().saturating_sub(n);
                buffer.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Returns the number of samples currently retained for `category`.
    #[must_use]
    pub fn len(&self, category: &str) -> usize {
        self.series.get(category).map_or(0, |buffer| buffer.len())
    }

    /// Whether the store holds no samples at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// All known category names, sorted.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.series.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Takes a consistent snapshot of the latest sample per category.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let samples = self
            .series
            .iter()
            .filter_map(|entry| {
                entry.value().back().map(|sample| (entry.key().clone(), Arc::clone(sample)))
            })
            .collect();
        Snapshot { samples, taken_at: Utc::now() }
    }
}
