//! Aggregated monitoring reports.
//!
//! The aggregator pulls every subsystem together into one serializable
//! [`MonitorReport`]: overall health derived from active alerts, per-check
//! health summaries, circuit breaker states, frozen baselines, and the latest
//! sample per category. A report is generated on demand and, when a
//! [`SnapshotSink`] is installed, after every low-frequency cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::BTreeMap, sync::Arc};

use crate::{
    alerts::{Alert, AlertManager, AlertSeverity},
    baseline::{Baseline, BaselineTracker},
    breaker::{BreakerSnapshot, CircuitBreakerRegistry},
    health::HealthStatus,
    store::{MetricSample, MetricStore},
};

/// Overall system health, derived from the active alert set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    /// No active alerts.
    Healthy,
    /// Active alerts below high severity.
    Degraded,
    /// At least one active high-severity alert.
    Warning,
    /// At least one active critical alert.
    Critical,
}

/// Condensed view of one health check's most recent run.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckSummary {
    /// Outcome of the last completed run.
    pub status: HealthStatus,
    /// When the last run completed.
    pub last_run: DateTime<Utc>,
    /// Wall time of the last run across all attempts, in milliseconds.
    pub duration_ms: u64,
    /// Attempts used by the last run.
    pub attempts: u64,
    /// Last error message, present only for unhealthy runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Complete point-in-time monitoring report.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    /// Derived overall health.
    pub overall_health: OverallHealth,
    /// Alerts currently counting as active.
    pub active_alerts: Vec<Alert>,
    /// Most recent alerts regardless of state, oldest first.
    pub recent_alerts: Vec<Alert>,
    /// Latest run summary per health check. Checks that have not completed a
    /// run yet are absent.
    pub health_checks: BTreeMap<String, HealthCheckSummary>,
    /// Every registered circuit breaker, keyed by dependency name.
    pub circuit_breakers: BTreeMap<String, BreakerSnapshot>,
    /// Frozen baselines, absent while warm-up is still in progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baselines: Option<Vec<Baseline>>,
    /// Latest sample per metric category.
    pub snapshot: BTreeMap<String, MetricSample>,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

/// Receives a report after every low-frequency cycle. Implementations must be
/// fast; a slow sink delays the next cycle.
pub trait SnapshotSink: Send + Sync {
    /// Consumes one freshly generated report.
    fn publish(&self, report: &MonitorReport);
}

/// Assembles [`MonitorReport`]s from the live subsystems.
pub struct ReportAggregator {
    store: Arc<MetricStore>,
    manager: Arc<AlertManager>,
    breakers: Arc<CircuitBreakerRegistry>,
    baseline: Arc<BaselineTracker>,
    check_names: Vec<String>,
    active_window: chrono::Duration,
    recent_limit: usize,
}

impl ReportAggregator {
    /// Creates an aggregator over the engine's shared subsystems.
    #[must_use]
    pub fn new(
        store: Arc<MetricStore>,
        manager: Arc<AlertManager>,
        breakers: Arc<CircuitBreakerRegistry>,
        baseline: Arc<BaselineTracker>,
        check_names: Vec<String>,
        active_window: chrono::Duration,
    ) -> Self {
        Self { store, manager, breakers, baseline, check_names, active_window, recent_limit: 20 }
    }

    /// Generates a complete report from current state.
    #[must_use]
    pub fn generate(&self) -> MonitorReport {
        let active_alerts = self.manager.active(self.active_window);
        let recent_alerts = self.manager.recent(self.recent_limit);

        let overall_health = derive_overall_health(&active_alerts);

        let mut health_checks = BTreeMap::new();
        for name in &self.check_names {
            if let Some(summary) = self.summarize_check(name) {
                health_checks.insert(name.clone(), summary);
            }
        }

        let snapshot = self
            .store
            .snapshot()
            .iter()
            .map(|(category, sample)| (category.clone(), (**sample).clone()))
            .collect();

        MonitorReport {
            overall_health,
            active_alerts,
            recent_alerts,
            health_checks,
            circuit_breakers: self.breakers.states(),
            baselines: self.baseline.baselines(),
            snapshot,
            generated_at: Utc::now(),
        }
    }

    fn summarize_check(&self, name: &str) -> Option<HealthCheckSummary> {
        let sample = self.store.latest(&format!("health_{name}"))?;
        let status = match sample.payload.get("status")?.as_str()? {
            "healthy" => HealthStatus::Healthy,
            _ => HealthStatus::Unhealthy,
        };
        Some(HealthCheckSummary {
            status,
            last_run: sample.captured_at,
            duration_ms: sample.payload.get("duration_ms").and_then(|v| v.as_u64()).unwrap_or(0),
            attempts: sample.payload.get("attempts").and_then(|v| v.as_u64()).unwrap_or(0),
            error: sample
                .payload
                .get("error")
                .and_then(|v| v.as_str())
                .map(ToString::to_string),
        })
    }
}

fn derive_overall_health(active_alerts: &[Alert]) -> OverallHealth {
    let mut worst = OverallHealth::Healthy;
    for alert in active_alerts {
        let level = match alert.severity {
            AlertSeverity::Critical => OverallHealth::Critical,
            AlertSeverity::High => OverallHealth::Warning,
            AlertSeverity::Medium | AlertSeverity::Low => OverallHealth::Degraded,
        };
        worst = worst_of(worst, level);
    }
    worst
}

fn worst_of(a: OverallHealth, b: OverallHealth) -> OverallHealth {
    fn rank(h: OverallHealth) -> u8 {
        match h {
            OverallHealth::Healthy => 0,
            OverallHealth::Degraded => 1,
            OverallHealth::Warning => 2,
            OverallHealth::Critical => 3,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}
