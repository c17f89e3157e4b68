//! Baseline computation and statistical anomaly detection.
//!
//! The tracker accumulates tracked field values during a warm-up window, then
//! freezes per-field baselines (mean and standard deviation over the window).
//! After the freeze, each observed value is compared against its baseline and
//! flagged when it deviates by more than the configured tolerance in standard
//! deviations. The frozen set is swapped atomically, so readers never see a
//! partially computed baseline.

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{config::BaselineConfig, store::Snapshot};

/// Frozen statistics for one tracked `(category, field)` pair.
#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
    /// Metric category of the tracked field.
    pub category: String,
    /// Payload field name.
    pub field: String,
    /// Mean over the warm-up window.
    pub mean: f64,
    /// Population standard deviation over the warm-up window.
    pub std_dev: f64,
    /// Number of values the statistics were computed from.
    pub samples: usize,
    /// When the baseline was frozen.
    pub computed_at: DateTime<Utc>,
}

/// A value that deviated from its frozen baseline beyond tolerance.
#[derive(Debug, Clone)]
pub struct AnomalyFlag {
    /// Metric category of the anomalous field.
    pub category: String,
    /// Payload field name.
    pub field: String,
    /// Observed value.
    pub value: f64,
    /// Baseline mean.
    pub mean: f64,
    /// Baseline standard deviation.
    pub std_dev: f64,
    /// Absolute deviation from the mean, in standard deviations
    /// (`f64::INFINITY` when the baseline deviation is zero).
    pub deviation: f64,
    /// Tolerance the deviation exceeded.
    pub tolerance: f64,
}

impl AnomalyFlag {
    /// Human-readable summary used as the alert message.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}.{} at {:.2} deviates from baseline mean {:.2} (std dev {:.2}, tolerance {:.1}x)",
            self.category, self.field, self.value, self.mean, self.std_dev, self.tolerance
        )
    }
}

struct TrackedField {
    category: String,
    field: String,
    tolerance: f64,
}

#[derive(Default)]
struct WarmupState {
    /// Accumulated values, one inner vec per tracked field.
    values: Vec<Vec<f64>>,
    snapshots_seen: usize,
}

/// Per-field snapshot statistics, frozen as a unit.
struct BaselineSet {
    baselines: Vec<Option<Baseline>>,
}

/// Accumulates warm-up data and flags post-freeze anomalies.
pub struct BaselineTracker {
    tracked: Vec<TrackedField>,
    warmup_target: usize,
    warmup: Mutex<WarmupState>,
    frozen: ArcSwapOption<BaselineSet>,
}

impl BaselineTracker {
    /// Creates a tracker from configuration. An empty tracked list produces a
    /// tracker that never flags anything.
    #[must_use]
    pub fn new(config: &BaselineConfig) -> Self {
        let tracked: Vec<TrackedField> = config
            .tracked
            .iter()
            .map(|t| TrackedField {
                category: t.category.clone(),
                field: t.field.clone(),
                tolerance: t.tolerance,
            })
            .collect();

        let warmup = WarmupState { values: vec![Vec::new(); tracked.len()], snapshots_seen: 0 };

        Self {
            tracked,
            warmup_target: config.warmup_snapshots.max(1),
            warmup: Mutex::new(warmup),
            frozen: ArcSwapOption::const_empty(),
        }
    }

    /// Whether the warm-up window has completed and baselines are frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load().is_some()
    }

    /// The frozen baselines, if any. Fields whose warm-up window produced no
    /// values are omitted.
    #[must_use]
    pub fn baselines(&self) -> Option<Vec<Baseline>> {
        let set = self.frozen.load_full()?;
        Some(set.baselines.iter().flatten().cloned().collect())
    }

    /// Feeds one low-frequency snapshot to the tracker.
    ///
    /// During warm-up this accumulates tracked values and returns no flags;
    /// the snapshot that completes the window freezes the baselines. After
    /// the freeze, returns a flag for each tracked value deviating beyond its
    /// tolerance. Missing fields are skipped in both phases.
    pub fn observe(&self, snapshot: &Snapshot) -> Vec<AnomalyFlag> {
        if self.tracked.is_empty() {
            return Vec::new();
        }

        if let Some(set) = self.frozen.load_full() {
            return self.detect(&set, snapshot);
        }

        let mut warmup = self.warmup.lock();
        // A concurrent observe may have frozen while we waited on the lock.
        if let Some(set) = self.frozen.load_full() {
            drop(warmup);
            return self.detect(&set, snapshot);
        }

        for (i, tracked) in self.tracked.iter().enumerate() {
            if let Some(value) = snapshot.field(&tracked.category, &tracked.field) {
                warmup.values[i].push(value);
            }
        }
        warmup.snapshots_seen += 1;

        if warmup.snapshots_seen >= self.warmup_target {
            let set = self.freeze(&warmup);
            self.frozen.store(Some(Arc::new(set)));
            info!(
                snapshots = warmup.snapshots_seen,
                fields = self.tracked.len(),
                "baseline warm-up complete, baselines frozen"
            );
        } else {
            debug!(
                snapshots = warmup.snapshots_seen,
                target = self.warmup_target,
                "baseline warm-up in progress"
            );
        }

        Vec::new()
    }

    /// Discards frozen baselines and restarts the warm-up window. Useful
    /// after a known workload shift that would otherwise flag everything.
    pub fn recompute(&self) {
        let mut warmup = self.warmup.lock();
        *warmup = WarmupState { values: vec![Vec::new(); self.tracked.len()], snapshots_seen: 0 };
        self.frozen.store(None);
        info!("baselines discarded, warm-up restarted");
    }

    fn freeze(&self, warmup: &WarmupState) -> BaselineSet {
        let computed_at = Utc::now();
        let baselines = self
            .tracked
            .iter()
            .zip(&warmup.values)
            .map(|(tracked, values)| {
                if values.is_empty() {
                    return None;
                }
                let (mean, std_dev) = mean_and_std_dev(values);
                Some(Baseline {
                    category: tracked.category.clone(),
                    field: tracked.field.clone(),
                    mean,
                    std_dev,
                    samples: values.len(),
                    computed_at,
                })
            })
            .collect();
        BaselineSet { baselines }
    }

    fn detect(&self, set: &BaselineSet, snapshot: &Snapshot) -> Vec<AnomalyFlag> {
        let mut flags = Vec::new();

        for (tracked, baseline) in self.tracked.iter().zip(&set.baselines) {
            let Some(baseline) = baseline else { continue };
            let Some(value) = snapshot.field(&tracked.category, &tracked.field) else { continue };

            let distance = (value - baseline.mean).abs();
            // Zero spread means the field never varied during warm-up; any
            // departure from the mean is anomalous.
            let deviation = if baseline.std_dev == 0.0 {
                if distance == 0.0 {
                    0.0
                } else {
                    f64::INFINITY
                }
            } else {
                distance / baseline.std_dev
            };

            if deviation > tracked.tolerance {
                flags.push(AnomalyFlag {
                    category: tracked.category.clone(),
                    field: tracked.field.clone(),
                    value,
                    mean: baseline.mean,
                    std_dev: baseline.std_dev,
                    deviation,
                    tolerance: tracked.tolerance,
                });
            }
        }

        flags
    }
}

fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
