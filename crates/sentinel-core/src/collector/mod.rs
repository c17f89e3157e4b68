//! Dual-cadence metric collection scheduling.
//!
//! Sources declare a cadence: the low-frequency cycle covers system,
//! application, and business metrics and additionally drives baseline
//! observation, rule evaluation, and report publication; the high-frequency
//! cycle covers performance-sensitive counters and does collection only.
//! Missed ticks are skipped, never bunched, so a slow cycle cannot cause a
//! burst of catch-up collections.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    alerts::{AlertRuleEngine, AlertSeverity},
    baseline::BaselineTracker,
    report::{ReportAggregator, SnapshotSink},
    store::MetricStore,
};

/// Which scheduler cycle a source is collected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Performance-sensitive counters, collected every few seconds.
    High,
    /// Everything else, collected on the evaluation cycle.
    Low,
}

/// Error returned by a failing metric source.
#[derive(Debug, Error)]
#[error("metric collection failed: {0}")]
pub struct SourceError(pub String);

/// A producer of samples for one metric category.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Source name, for logs and metrics.
    fn name(&self) -> &str;

    /// Category the collected payloads are recorded under.
    fn category(&self) -> &str;

    /// Cycle this source is collected on.
    fn cadence(&self) -> Cadence {
        Cadence::Low
    }

    /// Collects one payload.
    async fn collect(&self) -> Result<Map<String, Value>, SourceError>;
}

/// Runs the two collection cycles and the per-cycle evaluation pipeline.
pub struct CollectorScheduler {
    low_sources: Vec<Arc<dyn MetricSource>>,
    high_sources: Vec<Arc<dyn MetricSource>>,
    store: Arc<MetricStore>,
    baseline: Arc<BaselineTracker>,
    engine: Arc<AlertRuleEngine>,
    aggregator: Arc<ReportAggregator>,
    sink: Option<Arc<dyn SnapshotSink>>,
    low_interval: Duration,
    high_interval: Duration,
}

impl CollectorScheduler {
    /// Creates a scheduler, splitting `sources` by cadence.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sources: Vec<Arc<dyn MetricSource>>,
        store: Arc<MetricStore>,
        baseline: Arc<BaselineTracker>,
        engine: Arc<AlertRuleEngine>,
        aggregator: Arc<ReportAggregator>,
        sink: Option<Arc<dyn SnapshotSink>>,
        low_interval: Duration,
        high_interval: Duration,
    ) -> Self {
        let (high_sources, low_sources) = sources
            .into_iter()
            .partition(|source| source.cadence() == Cadence::High);
        Self {
            low_sources,
            high_sources,
            store,
            baseline,
            engine,
            aggregator,
            sink,
            low_interval,
            high_interval,
        }
    }

    /// Spawns the collection loops. The low-frequency loop always runs (it
    /// drives evaluation even with no low sources); the high-frequency loop
    /// is spawned only when high-cadence sources exist.
    pub fn start(self: &Arc<Self>, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        {
            let scheduler = Arc::clone(self);
            let mut shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(scheduler.low_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                info!(
                    interval_secs = scheduler.low_interval.as_secs(),
                    sources = scheduler.low_sources.len(),
                    "low-frequency collection loop started"
                );

                loop {
                    tokio::select! {
                        _ = interval.tick() => scheduler.run_low_cycle().await,
                        _ = shutdown_rx.recv() => {
                            debug!("low-frequency collection loop stopping");
                            break;
                        }
                    }
                }
            }));
        }

        if !self.high_sources.is_empty() {
            let scheduler = Arc::clone(self);
            let mut shutdown_rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(scheduler.high_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                info!(
                    interval_secs = scheduler.high_interval.as_secs(),
                    sources = scheduler.high_sources.len(),
                    "high-frequency collection loop started"
                );

                loop {
                    tokio::select! {
                        _ = interval.tick() => scheduler.run_high_cycle().await,
                        _ = shutdown_rx.recv() => {
                            debug!("high-frequency collection loop stopping");
                            break;
                        }
                    }
                }
            }));
        }

        handles
    }

    /// One low-frequency cycle: collect, then run anomaly detection, rule
    /// evaluation, and report publication against a single snapshot.
    pub async fn run_low_cycle(&self) {
        for source in &self.low_sources {
            collect_into(source, &self.store).await;
        }

        let snapshot = self.store.snapshot();

        for flag in self.baseline.observe(&snapshot) {
            let name = format!("anomaly_{}_{}", flag.category, flag.field.replace('.', "_"));
            self.engine.raise(&name, AlertSeverity::Medium, flag.describe()).await;
        }

        self.engine.evaluate(&snapshot).await;

        if let Some(sink) = &self.sink {
            let report = self.aggregator.generate();
            sink.publish(&report);
        }
    }

    /// One high-frequency cycle: collection only.
    pub async fn run_high_cycle(&self) {
        for source in &self.high_sources {
            collect_into(source, &self.store).await;
        }
    }
}

/// Collects one source into the store. Failures and panics are logged and the
/// source is skipped for this cycle; its previous samples stay available.
async fn collect_into(source: &Arc<dyn MetricSource>, store: &MetricStore) {
    let name = source.name().to_string();
    let category = source.category().to_string();
    let source = Arc::clone(source);
    let handle = tokio::spawn(async move { source.collect().await });

    let outcome = match handle.await {
        Ok(Ok(payload)) => {
            store.record(&category, payload);
            "ok"
        }
        Ok(Err(e)) => {
            warn!(source = %name, category = %category, error = %e, "metric source failed, skipping cycle");
            "error"
        }
        Err(join_error) if join_error.is_panic() => {
            error!(source = %name, category = %category, "metric source panicked - recovering");
            "panic"
        }
        Err(_) => {
            warn!(source = %name, category = %category, "metric source cancelled");
            "error"
        }
    };
    metrics::counter!("sentinel_collections_total", "source" => name, "outcome" => outcome)
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alerts::{AlertCondition, AlertManager, AlertRule},
        breaker::CircuitBreakerRegistry,
        config::{BaselineConfig, TrackedFieldConfig},
        remediation::RemediationDispatcher,
        report::MonitorReport,
    };
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    struct CountingSource {
        name: String,
        category: String,
        cadence: Cadence,
        calls: Arc<AtomicU32>,
        value: Arc<AtomicU64>,
    }

    impl CountingSource {
        fn new(name: &str, category: &str, cadence: Cadence) -> Self {
            Self {
                name: name.to_string(),
                category: category.to_string(),
                cadence,
                calls: Arc::new(AtomicU32::new(0)),
                value: Arc::new(AtomicU64::new(50)),
            }
        }
    }

    #[async_trait]
    impl MetricSource for CountingSource {
        fn name(&self) -> &str {
            &self.name
        }

        fn category(&self) -> &str {
            &self.category
        }

        fn cadence(&self) -> Cadence {
            self.cadence
        }

        async fn collect(&self) -> Result<Map<String, Value>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut payload = Map::new();
            payload.insert(
                "memory_percent".to_string(),
                json!(self.value.load(Ordering::SeqCst) as f64),
            );
            Ok(payload)
        }
    }

    struct FailingSource;

    #[async_trait]
    impl MetricSource for FailingSource {
        fn name(&self) -> &str {
            "broken"
        }

        fn category(&self) -> &str {
            "system"
        }

        async fn collect(&self) -> Result<Map<String, Value>, SourceError> {
            Err(SourceError("probe unavailable".to_string()))
        }
    }

    struct CapturingSink(Mutex<Vec<MonitorReport>>);

    impl SnapshotSink for CapturingSink {
        fn publish(&self, report: &MonitorReport) {
            self.0.lock().push(report.clone());
        }
    }

    struct Harness {
        store: Arc<MetricStore>,
        manager: Arc<AlertManager>,
        baseline: Arc<BaselineTracker>,
        engine: Arc<AlertRuleEngine>,
        aggregator: Arc<ReportAggregator>,
    }

    impl Harness {
        fn new(rules: Vec<AlertRule>, baseline_config: &BaselineConfig) -> Self {
            let store = Arc::new(MetricStore::new(10));
            let manager = Arc::new(AlertManager::new(100));
            let breakers = Arc::new(CircuitBreakerRegistry::new());
            let baseline = Arc::new(BaselineTracker::new(baseline_config));
            let engine = Arc::new(AlertRuleEngine::new(
                rules,
                Arc::clone(&manager),
                Arc::clone(&breakers),
                Arc::new(RemediationDispatcher::new(Duration::from_secs(1))),
            ));
            let aggregator = Arc::new(ReportAggregator::new(
                Arc::clone(&store),
                Arc::clone(&manager),
                breakers,
                Arc::clone(&baseline),
                Vec::new(),
                chrono::Duration::hours(1),
            ));
            Self { store, manager, baseline, engine, aggregator }
        }

        fn scheduler(
            &self,
            sources: Vec<Arc<dyn MetricSource>>,
            sink: Option<Arc<dyn SnapshotSink>>,
        ) -> Arc<CollectorScheduler> {
            Arc::new(CollectorScheduler::new(
                sources,
                Arc::clone(&self.store),
                Arc::clone(&self.baseline),
                Arc::clone(&self.engine),
                Arc::clone(&self.aggregator),
                sink,
                Duration::from_millis(20),
                Duration::from_millis(5),
            ))
        }
    }

    #[tokio::test]
    async fn test_low_cycle_records_and_evaluates() {
        let rule = AlertRule::new(
            "high_memory",
            AlertCondition::FieldAbove {
                category: "system".to_string(),
                field: "memory_percent".to_string(),
                threshold: 85.0,
            },
            AlertSeverity::High,
        );
        let harness = Harness::new(vec![rule], &BaselineConfig::default());

        let source = Arc::new(CountingSource::new("sys", "system", Cadence::Low));
        source.value.store(90, Ordering::SeqCst);
        let scheduler = harness.scheduler(vec![source.clone()], None);

        scheduler.run_low_cycle().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(harness.store.latest("system").is_some());
        assert_eq!(harness.manager.len(), 1);
        assert_eq!(harness.manager.all()[0].name, "high_memory");
    }

    #[tokio::test]
    async fn test_failing_source_skipped_others_collected() {
        let harness = Harness::new(Vec::new(), &BaselineConfig::default());
        let good = Arc::new(CountingSource::new("app", "application", Cadence::Low));
        let scheduler =
            harness.scheduler(vec![Arc::new(FailingSource), good.clone()], None);

        scheduler.run_low_cycle().await;

        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
        assert!(harness.store.latest("application").is_some());
        assert!(harness.store.latest("system").is_none());
    }

    #[tokio::test]
    async fn test_anomaly_flag_raises_alert() {
        let baseline_config = BaselineConfig {
            warmup_snapshots: 2,
            tracked: vec![TrackedFieldConfig {
                category: "system".to_string(),
                field: "memory_percent".to_string(),
                tolerance: 2.0,
            }],
        };
        let harness = Harness::new(Vec::new(), &baseline_config);
        let source = Arc::new(CountingSource::new("sys", "system", Cadence::Low));
        let scheduler = harness.scheduler(vec![source.clone()], None);

        // Warm up at 50, then 51 to get a nonzero spread.
        scheduler.run_low_cycle().await;
        source.value.store(51, Ordering::SeqCst);
        scheduler.run_low_cycle().await;
        assert!(harness.baseline.is_frozen());
        assert!(harness.manager.is_empty());

        // Far outside tolerance.
        source.value.store(99, Ordering::SeqCst);
        scheduler.run_low_cycle().await;

        let alerts = harness.manager.all();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "anomaly_system_memory_percent");
        assert_eq!(alerts[0].severity, AlertSeverity::Medium);
    }

    #[tokio::test]
    async fn test_sink_receives_report_each_low_cycle() {
        let harness = Harness::new(Vec::new(), &BaselineConfig::default());
        let sink = Arc::new(CapturingSink(Mutex::new(Vec::new())));
        let source = Arc::new(CountingSource::new("sys", "system", Cadence::Low));
        let scheduler = harness.scheduler(vec![source], Some(sink.clone()));

        scheduler.run_low_cycle().await;
        scheduler.run_low_cycle().await;

        let published = sink.0.lock();
        assert_eq!(published.len(), 2);
        assert!(published[0].snapshot.contains_key("system"));
    }

    #[tokio::test]
    async fn test_high_cycle_only_collects_high_sources() {
        let harness = Harness::new(Vec::new(), &BaselineConfig::default());
        let low = Arc::new(CountingSource::new("sys", "system", Cadence::Low));
        let high = Arc::new(CountingSource::new("perf", "performance", Cadence::High));
        let scheduler = harness.scheduler(vec![low.clone(), high.clone()], None);

        scheduler.run_high_cycle().await;

        assert_eq!(high.calls.load(Ordering::SeqCst), 1);
        assert_eq!(low.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scheduled_loops_run_both_cadences() {
        let harness = Harness::new(Vec::new(), &BaselineConfig::default());
        let low = Arc::new(CountingSource::new("sys", "system", Cadence::Low));
        let high = Arc::new(CountingSource::new("perf", "performance", Cadence::High));
        let scheduler = harness.scheduler(vec![low.clone(), high.clone()], None);

        let (shutdown_tx, _) = broadcast::channel(1);
        let handles = scheduler.start(&shutdown_tx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = shutdown_tx.send(());
        for handle in handles {
            let _ = handle.await;
        }

        assert!(low.calls.load(Ordering::SeqCst) >= 1);
        // High cadence is 4x faster here, so it must have fired more often.
        assert!(high.calls.load(Ordering::SeqCst) > low.calls.load(Ordering::SeqCst));
    }
}
