//! Core component container for the monitoring engine.

use std::sync::Arc;

use crate::{
    alerts::{AlertManager, AlertRuleEngine},
    baseline::BaselineTracker,
    breaker::CircuitBreakerRegistry,
    collector::CollectorScheduler,
    health::HealthCheckRunner,
    remediation::RemediationDispatcher,
    report::ReportAggregator,
    store::MetricStore,
};

/// Container for all initialized engine components.
///
/// All components are wrapped in `Arc` and use interior mutability, so the
/// container is cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct MonitorComponents {
    store: Arc<MetricStore>,
    manager: Arc<AlertManager>,
    breakers: Arc<CircuitBreakerRegistry>,
    baseline: Arc<BaselineTracker>,
    rule_engine: Arc<AlertRuleEngine>,
    remediation: Arc<RemediationDispatcher>,
    health_runner: Arc<HealthCheckRunner>,
    scheduler: Arc<CollectorScheduler>,
    aggregator: Arc<ReportAggregator>,
}

impl MonitorComponents {
    /// Creates a new components container.
    ///
    /// Called by [`super::MonitorEngineBuilder`] during assembly.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<MetricStore>,
        manager: Arc<AlertManager>,
        breakers: Arc<CircuitBreakerRegistry>,
        baseline: Arc<BaselineTracker>,
        rule_engine: Arc<AlertRuleEngine>,
        remediation: Arc<RemediationDispatcher>,
        health_runner: Arc<HealthCheckRunner>,
        scheduler: Arc<CollectorScheduler>,
        aggregator: Arc<ReportAggregator>,
    ) -> Self {
        Self {
            store,
            manager,
            breakers,
            baseline,
            rule_engine,
            remediation,
            health_runner,
            scheduler,
            aggregator,
        }
    }

    /// Returns a reference to the metric store.
    #[must_use]
    pub fn store(&self) -> &Arc<MetricStore> {
        &self.store
    }

    /// Returns a reference to the alert manager.
    #[must_use]
    pub fn alert_manager(&self) -> &Arc<AlertManager> {
        &self.manager
    }

    /// Returns a reference to the circuit breaker registry.
    #[must_use]
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Returns a reference to the baseline tracker.
    #[must_use]
    pub fn baseline(&self) -> &Arc<BaselineTracker> {
        &self.baseline
    }

    /// Returns a reference to the alert rule engine.
    #[must_use]
    pub fn rule_engine(&self) -> &Arc<AlertRuleEngine> {
        &self.rule_engine
    }

    /// Returns a reference to the remediation dispatcher.
    #[must_use]
    pub fn remediation(&self) -> &Arc<RemediationDispatcher> {
        &self.remediation
    }

    /// Returns a reference to the health check runner.
    #[must_use]
    pub fn health_runner(&self) -> &Arc<HealthCheckRunner> {
        &self.health_runner
    }

    /// Returns a reference to the collector scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Arc<CollectorScheduler> {
        &self.scheduler
    }

    /// Returns a reference to the report aggregator.
    #[must_use]
    pub fn aggregator(&self) -> &Arc<ReportAggregator> {
        &self.aggregator
    }
}
