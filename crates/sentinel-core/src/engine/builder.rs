//! Builder pattern for assembling the monitoring engine.

use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{components::MonitorComponents, lifecycle::MonitorEngine};
use crate::{
    alerts::{AlertManager, AlertRule, AlertRuleEngine},
    baseline::BaselineTracker,
    breaker::CircuitBreakerRegistry,
    collector::{CollectorScheduler, MetricSource},
    config::{BreakerConfig, MonitorConfig},
    health::{HealthCheckRunner, HealthCheckSpec},
    remediation::{RemediationAction, RemediationDispatcher},
    report::{ReportAggregator, SnapshotSink},
    store::MetricStore,
};

/// Errors that can occur during engine assembly.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration validation failed
    #[error("configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Two rules were registered under the same alert name
    #[error("duplicate alert rule name: {0}")]
    DuplicateRule(String),

    /// Two health checks were registered under the same name
    #[error("duplicate health check name: {0}")]
    DuplicateHealthCheck(String),
}

/// Builder for constructing a [`MonitorEngine`].
///
/// All registration happens here; the built engine's source, rule, check, and
/// breaker sets are fixed. Building validates the configuration and rejects
/// duplicate rule or check names, so a misassembled engine fails at startup
/// rather than at evaluation time.
pub struct MonitorEngineBuilder {
    config: Option<MonitorConfig>,
    sources: Vec<Arc<dyn MetricSource>>,
    rules: Vec<AlertRule>,
    checks: Vec<HealthCheckSpec>,
    breakers: Vec<(String, Option<BreakerConfig>)>,
    remediations: Vec<(String, Arc<dyn RemediationAction>)>,
    sink: Option<Arc<dyn SnapshotSink>>,
    shutdown_channel_capacity: usize,
}

impl MonitorEngineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: None,
            sources: Vec::new(),
            rules: Vec::new(),
            checks: Vec::new(),
            breakers: Vec::new(),
            remediations: Vec::new(),
            sink: None,
            shutdown_channel_capacity: 16,
        }
    }

    /// Sets the engine configuration. Defaults are used when omitted.
    #[must_use]
    pub fn with_config(mut self, config: MonitorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers a metric source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Registers an alert rule. Rule names must be unique.
    #[must_use]
    pub fn with_rule(mut self, rule: AlertRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Registers a health check. Check names must be unique.
    #[must_use]
    pub fn with_health_check(mut self, check: HealthCheckSpec) -> Self {
        self.checks.push(check);
        self
    }

    /// Registers a circuit breaker with the configured default tuning.
    #[must_use]
    pub fn with_breaker(mut self, name: impl Into<String>) -> Self {
        self.breakers.push((name.into(), None));
        self
    }

    /// Registers a circuit breaker with explicit tuning.
    #[must_use]
    pub fn with_breaker_config(mut self, name: impl Into<String>, config: BreakerConfig) -> Self {
        self.breakers.push((name.into(), Some(config)));
        self
    }

    /// Registers a remediation action for an alert name. The last
    /// registration for a name wins.
    #[must_use]
    pub fn with_remediation(
        mut self,
        alert_name: impl Into<String>,
        action: Arc<dyn RemediationAction>,
    ) -> Self {
        self.remediations.push((alert_name.into(), action));
        self
    }

    /// Installs a sink receiving a report after every low-frequency cycle.
    #[must_use]
    pub fn with_snapshot_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets custom shutdown channel capacity (default: 16).
    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.shutdown_channel_capacity = capacity.max(1);
        self
    }

    /// Assembles the engine. Background tasks are not started until
    /// [`MonitorEngine::start`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] if the configuration is invalid or rule/check
    /// names collide.
    pub fn build(self) -> Result<MonitorEngine, EngineError> {
        let config = self.config.unwrap_or_default();
        config.validate().map_err(EngineError::ConfigValidation)?;

        let mut rule_names = HashSet::new();
        for rule in &self.rules {
            if !rule_names.insert(rule.name.clone()) {
                return Err(EngineError::DuplicateRule(rule.name.clone()));
            }
        }
        let mut check_names = HashSet::new();
        for check in &self.checks {
            if !check_names.insert(check.name.clone()) {
                return Err(EngineError::DuplicateHealthCheck(check.name.clone()));
            }
        }

        info!(
            environment = %config.environment,
            sources = self.sources.len(),
            rules = self.rules.len(),
            health_checks = self.checks.len(),
            breakers = self.breakers.len(),
            "assembling monitoring engine"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.shutdown_channel_capacity);

        let store = Arc::new(MetricStore::new(config.store.capacity_per_category));
        debug!("metric store initialized");

        let breakers = Arc::new(CircuitBreakerRegistry::new());
        for (name, breaker_config) in &self.breakers {
            breakers.register(name, breaker_config.unwrap_or(config.breakers));
        }
        debug!(count = self.breakers.len(), "circuit breakers registered");

        let remediation = Arc::new(RemediationDispatcher::new(config.remediation_timeout()));
        for (alert_name, action) in self.remediations {
            remediation.register(&alert_name, action);
        }

        let manager = Arc::new(AlertManager::new(config.alerts.history_capacity));
        let rule_engine = Arc::new(AlertRuleEngine::new(
            self.rules,
            Arc::clone(&manager),
            Arc::clone(&breakers),
            Arc::clone(&remediation),
        ));
        debug!("alert rule engine initialized");

        let baseline = Arc::new(BaselineTracker::new(&config.baseline));
        debug!(
            tracked_fields = config.baseline.tracked.len(),
            warmup_snapshots = config.baseline.warmup_snapshots,
            "baseline tracker initialized"
        );

        let runner = Arc::new(HealthCheckRunner::new(
            self.checks,
            Arc::clone(&store),
            Arc::clone(&rule_engine),
        ));

        let aggregator = Arc::new(ReportAggregator::new(
            Arc::clone(&store),
            Arc::clone(&manager),
            Arc::clone(&breakers),
            Arc::clone(&baseline),
            runner.check_names(),
            config.active_alert_window(),
        ));

        let scheduler = Arc::new(CollectorScheduler::new(
            self.sources,
            Arc::clone(&store),
            Arc::clone(&baseline),
            Arc::clone(&rule_engine),
            Arc::clone(&aggregator),
            self.sink,
            config.low_frequency_interval(),
            config.high_frequency_interval(),
        ));
        debug!("collector scheduler initialized");

        let components = MonitorComponents::new(
            store, manager, breakers, baseline, rule_engine, remediation, runner, scheduler,
            aggregator,
        );

        info!("monitoring engine assembly complete");

        Ok(MonitorEngine::new(components, shutdown_tx, config))
    }
}

impl Default for MonitorEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
