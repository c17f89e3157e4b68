//! Engine lifecycle management including background tasks and graceful shutdown.

use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::MonitorEngineBuilder, MonitorComponents};
use crate::{
    alerts::Alert,
    breaker::CircuitBreakerRegistry,
    config::MonitorConfig,
    report::MonitorReport,
    store::{MetricSample, Snapshot},
};

/// Main engine container managing component lifecycles and background tasks.
///
/// Owns all assembled components. [`start`](Self::start) launches the
/// collection loops and health check tasks; [`shutdown`](Self::shutdown)
/// broadcasts a stop signal and awaits them. Both are idempotent. Querying
/// methods ([`report`](Self::report), [`snapshot`](Self::snapshot)) work
/// whether or not the engine has been started, so tests and one-shot tools can
/// drive collection manually.
pub struct MonitorEngine {
    components: MonitorComponents,
    config: MonitorConfig,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    shutdown_initiated: Arc<AtomicBool>,
}

impl MonitorEngine {
    /// Creates a new builder for constructing a `MonitorEngine`.
    #[must_use]
    pub fn builder() -> MonitorEngineBuilder {
        MonitorEngineBuilder::new()
    }

    /// Creates a new engine with assembled components.
    ///
    /// Called by [`MonitorEngineBuilder`] during assembly.
    pub(super) fn new(
        components: MonitorComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            components,
            config,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a reference to all engine components.
    #[must_use]
    pub fn components(&self) -> &MonitorComponents {
        &self.components
    }

    /// Returns a reference to the engine configuration.
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Convenience accessor for the circuit breaker registry, the interface
    /// the embedding application reports dependency outcomes through.
    #[must_use]
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        self.components.breakers()
    }

    /// Records a metric sample directly, outside the collection cycles.
    /// Useful for event-driven metrics the scheduler cannot poll.
    pub fn record_metric(&self, category: &str, payload: Map<String, Value>) {
        self.components.store().record(category, payload);
    }

    /// Takes a consistent snapshot of the latest sample per category.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.components.store().snapshot()
    }

    /// Returns recent history for one category, oldest first.
    #[must_use]
    pub fn history(&self, category: &str, n: usize) -> Vec<Arc<MetricSample>> {
        self.components.store().history(category, n)
    }

    /// Generates a complete monitoring report on demand.
    #[must_use]
    pub fn report(&self) -> MonitorReport {
        self.components.aggregator().generate()
    }

    /// Subscribes to alerts as they are raised.
    #[must_use]
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.components.rule_engine().subscribe()
    }

    /// Acknowledges an alert by id. Returns `false` if no such alert exists.
    #[must_use]
    pub fn acknowledge_alert(&self, alert_id: &str) -> bool {
        self.components.alert_manager().acknowledge(alert_id)
    }

    /// Resolves an alert by id. Returns `false` if no such alert exists.
    #[must_use]
    pub fn resolve_alert(&self, alert_id: &str) -> bool {
        self.components.alert_manager().resolve(alert_id)
    }

    /// Discards frozen baselines and restarts the warm-up window.
    pub fn recompute_baseline(&self) {
        self.components.baseline().recompute();
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Starts the collection loops and health check tasks. Idempotent; a
    /// second call is ignored.
    pub fn start(&self) {
        if self.started.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            warn!("engine already started, ignoring duplicate call");
            return;
        }

        let mut tasks = self.tasks.lock();
        tasks.extend(self.components.scheduler().start(&self.shutdown_tx));
        tasks.extend(self.components.health_runner().start(&self.shutdown_tx));

        info!(tasks = tasks.len(), environment = %self.config.environment, "monitoring engine started");
    }

    /// Initiates graceful shutdown of all background tasks.
    ///
    /// Broadcasts the shutdown signal and awaits every spawned task. This
    /// method is idempotent - safe to call multiple times.
    pub async fn shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("initiating monitoring engine shutdown");
        if self.shutdown_tx.send(()).is_err() {
            debug!("no background tasks listening for shutdown");
        }

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => debug!("background task cancelled"),
                Err(e) => error!(error = %e, "background task failed during shutdown"),
            }
        }

        info!("monitoring engine shutdown complete");
    }

    /// Waits indefinitely for a shutdown signal, then awaits task completion.
    ///
    /// Useful for hosts that trigger shutdown from a signal handler holding a
    /// clone of the engine.
    pub async fn wait_for_shutdown(&self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("shutdown signal received, engine terminating");
        self.shutdown().await;
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<MonitorEngine>;
    let _ = assert_sync::<MonitorEngine>;
};
