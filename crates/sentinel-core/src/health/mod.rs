//! Periodic health checks with timeout, bounded retries, and alerting.
//!
//! Each registered check runs on its own task at its own interval, starting
//! immediately at engine start. Check outcomes are recorded into the metric
//! store as synthetic `health_<name>` categories, so health history is
//! queryable exactly like any other metric series. A failed check (all
//! attempts exhausted) raises a `health_check_<name>` alert through the same
//! raise path rules use, so the shared cooldown applies.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    alerts::{AlertRuleEngine, AlertSeverity},
    store::MetricStore,
};

/// Error returned by a failing health check probe.
#[derive(Debug, Error)]
#[error("health check failed: {0}")]
pub struct HealthCheckError(pub String);

/// A probe of one external dependency or internal subsystem.
///
/// On success a check may return detail fields (connection counts, probe
/// latency breakdowns); these are merged into the recorded sample payload.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Executes one probe attempt.
    async fn check(&self) -> Result<Map<String, Value>, HealthCheckError>;
}

/// Binary outcome of one completed check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The check passed within its attempt budget.
    Healthy,
    /// Every attempt failed, timed out, or panicked.
    Unhealthy,
}

impl HealthStatus {
    /// Stable lowercase label for payloads, logs, and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

/// A named check with its schedule and failure budget.
pub struct HealthCheckSpec {
    /// Unique check name; also names the `health_<name>` metric category and
    /// the `health_check_<name>` alert.
    pub name: String,
    /// The probe to run.
    pub check: Arc<dyn HealthCheck>,
    /// Time between runs. The first run starts immediately.
    pub interval: Duration,
    /// Per-attempt timeout; an attempt exceeding it counts as failed.
    pub timeout: Duration,
    /// Additional attempts after the first within one run.
    pub retries: u32,
}

impl HealthCheckSpec {
    /// Creates a spec with its probe; schedule fields use conservative
    /// defaults (30s interval, 5s timeout, 2 retries) overridable with the
    /// builder methods.
    #[must_use]
    pub fn new(name: impl Into<String>, check: Arc<dyn HealthCheck>) -> Self {
        Self {
            name: name.into(),
            check,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            retries: 2,
        }
    }

    /// Overrides the run interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Overrides the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the retry budget.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Metric category this check's outcomes are recorded under.
    #[must_use]
    pub fn category(&self) -> String {
        format!("health_{}", self.name)
    }

    /// Alert name raised when this check fails.
    #[must_use]
    pub fn alert_name(&self) -> String {
        format!("health_check_{}", self.name)
    }
}

struct CheckOutcome {
    status: HealthStatus,
    attempts: u32,
    duration: Duration,
    error: Option<String>,
    details: Map<String, Value>,
}

/// Runs registered checks on their schedules and records the outcomes.
pub struct HealthCheckRunner {
    specs: Vec<Arc<HealthCheckSpec>>,
    store: Arc<MetricStore>,
    engine: Arc<AlertRuleEngine>,
    /// Last observed status per check, for the report and for edge logging.
    statuses: Arc<DashMap<String, HealthStatus>>,
}

impl HealthCheckRunner {
    /// Creates a runner over a fixed set of checks.
    #[must_use]
    pub fn new(
        specs: Vec<HealthCheckSpec>,
        store: Arc<MetricStore>,
        engine: Arc<AlertRuleEngine>,
    ) -> Self {
        Self {
            specs: specs.into_iter().map(Arc::new).collect(),
            store,
            engine,
            statuses: Arc::new(DashMap::new()),
        }
    }

    /// Names of all registered checks.
    #[must_use]
    pub fn check_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.name.clone()).collect()
    }

    /// Last observed status per check name. Checks that have not completed a
    /// run yet are absent.
    #[must_use]
    pub fn statuses(&self) -> Vec<(String, HealthStatus)> {
        let mut out: Vec<(String, HealthStatus)> =
            self.statuses.iter().map(|e| (e.key().clone(), *e.value())).collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Spawns one task per check. Each task runs its check immediately, then
    /// on its interval, until `shutdown` fires.
    pub fn start(&self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        self.specs
            .iter()
            .map(|spec| {
                let spec = Arc::clone(spec);
                let store = Arc::clone(&self.store);
                let engine = Arc::clone(&self.engine);
                let statuses = Arc::clone(&self.statuses);
                let mut shutdown_rx = shutdown.subscribe();

                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(spec.interval);
                    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                    info!(check = %spec.name, interval_secs = spec.interval.as_secs(), "health check started");

                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                run_and_record(&spec, &store, &engine, &statuses).await;
                            }
                            _ = shutdown_rx.recv() => {
                                debug!(check = %spec.name, "health check stopping");
                                break;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    /// Runs one check by name immediately, outside its schedule. Used by
    /// tests and for operator-triggered probes.
    pub async fn run_once(&self, name: &str) -> Option<HealthStatus> {
        let spec = self.specs.iter().find(|s| s.name == name)?;
        Some(run_and_record(spec, &self.store, &self.engine, &self.statuses).await)
    }
}

async fn run_and_record(
    spec: &HealthCheckSpec,
    store: &MetricStore,
    engine: &AlertRuleEngine,
    statuses: &DashMap<String, HealthStatus>,
) -> HealthStatus {
    let outcome = execute(spec).await;

    let previous = statuses.insert(spec.name.clone(), outcome.status);
    if previous.is_some() && previous != Some(outcome.status) {
        info!(
            check = %spec.name,
            status = outcome.status.as_str(),
            "health check status changed"
        );
    }

    metrics::counter!(
        "sentinel_health_checks_total",
        "check" => spec.name.clone(),
        "status" => outcome.status.as_str()
    )
    .increment(1);

    let mut payload = outcome.details;
    payload.insert("status".to_string(), json!(outcome.status.as_str()));
    payload.insert("duration_ms".to_string(), json!(outcome.duration.as_millis() as u64));
    payload.insert("attempts".to_string(), json!(outcome.attempts));
    if let Some(error) = &outcome.error {
        payload.insert("error".to_string(), json!(error));
    }
    store.record(&spec.category(), payload);

    if outcome.status == HealthStatus::Unhealthy {
        let reason = outcome.error.unwrap_or_else(|| "unknown failure".to_string());
        warn!(
            check = %spec.name,
            attempts = outcome.attempts,
            error = %reason,
            "health check unhealthy"
        );
        engine
            .raise(
                &spec.alert_name(),
                AlertSeverity::High,
                format!(
                    "health check '{}' failed after {} attempt(s): {reason}",
                    spec.name, outcome.attempts
                ),
            )
            .await;
    }

    outcome.status
}

/// Runs up to `1 + retries` attempts, each on its own task with its own
/// timeout, stopping at the first success. A panicking probe counts as a
/// failed attempt rather than taking the runner down.
async fn execute(spec: &HealthCheckSpec) -> CheckOutcome {
    let started = Instant::now();
    let total_attempts = spec.retries + 1;
    let mut last_error = None;

    for attempt in 1..=total_attempts {
        let check = Arc::clone(&spec.check);
        let handle = tokio::spawn(async move { check.check().await });

        match tokio::time::timeout(spec.timeout, handle).await {
            Ok(Ok(Ok(details))) => {
                return CheckOutcome {
                    status: HealthStatus::Healthy,
                    attempts: attempt,
                    duration: started.elapsed(),
                    error: None,
                    details,
                };
            }
            Ok(Ok(Err(e))) => {
                debug!(check = %spec.name, attempt, error = %e, "health check attempt failed");
                last_error = Some(e.to_string());
            }
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    error!(check = %spec.name, attempt, "health check panicked - recovering");
                    last_error = Some("check panicked".to_string());
                } else {
                    last_error = Some("check cancelled".to_string());
                }
            }
            Err(_) => {
                debug!(check = %spec.name, attempt, "health check attempt timed out");
                last_error =
                    Some(format!("timed out after {}ms", spec.timeout.as_millis()));
            }
        }
    }

    CheckOutcome {
        status: HealthStatus::Unhealthy,
        attempts: total_attempts,
        duration: started.elapsed(),
        error: last_error,
        details: Map::new(),
    }
}
