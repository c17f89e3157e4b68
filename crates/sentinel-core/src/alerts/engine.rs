//! Alert rule evaluation and the shared raise path.
//!
//! Rules, health-check failures, and anomaly detection all raise through the
//! same path and share one cooldown map keyed by alert name, so no alert name
//! can fire twice within its cooldown window regardless of which trigger got
//! there first.

use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{
    manager::AlertManager,
    types::{Alert, AlertCondition, AlertRule, AlertSeverity},
};
use crate::{
    breaker::{BreakerState, CircuitBreakerRegistry},
    remediation::{RemediationContext, RemediationDispatcher},
    store::Snapshot,
};

/// Error evaluating a single rule condition. Caught per-rule so one malformed
/// rule cannot halt evaluation of the others.
#[derive(Debug, Error)]
pub enum RuleEvaluationError {
    /// The condition references a category with no samples yet.
    #[error("category '{category}' has no samples")]
    MissingCategory {
        /// Referenced category.
        category: String,
    },
    /// The condition references a field absent or non-numeric in the latest
    /// sample.
    #[error("field '{field}' missing or non-numeric in category '{category}'")]
    MissingField {
        /// Referenced category.
        category: String,
        /// Referenced field.
        field: String,
    },
    /// The condition references a circuit breaker that was never registered.
    #[error("circuit breaker '{name}' is not registered")]
    UnknownBreaker {
        /// Referenced breaker name.
        name: String,
    },
}

/// Evaluates registered rules against snapshots and raises alerts.
pub struct AlertRuleEngine {
    rules: Vec<AlertRule>,
    manager: Arc<AlertManager>,
    breakers: Arc<CircuitBreakerRegistry>,
    remediation: Arc<RemediationDispatcher>,
    /// Last raise per alert name; shared by rules, health checks, anomalies.
    cooldowns: DashMap<String, Instant>,
    alert_tx: broadcast::Sender<Alert>,
}

impl AlertRuleEngine {
    /// Creates an engine over an immutable rule set.
    #[must_use]
    pub fn new(
        rules: Vec<AlertRule>,
        manager: Arc<AlertManager>,
        breakers: Arc<CircuitBreakerRegistry>,
        remediation: Arc<RemediationDispatcher>,
    ) -> Self {
        let (alert_tx, _) = broadcast::channel(64);
        Self { rules, manager, breakers, remediation, cooldowns: DashMap::new(), alert_tx }
    }

    /// Subscribes to raised alerts. The engine functions correctly with no
    /// subscribers; alerts are still recorded in history.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.alert_tx.subscribe()
    }

    /// The registered rules.
    #[must_use]
    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// The alert history backing this engine.
    #[must_use]
    pub fn manager(&self) -> &Arc<AlertManager> {
        &self.manager
    }

    /// Evaluates every rule against one snapshot instance.
    ///
    /// A rule in cooldown is skipped silently; a rule whose condition errors
    /// is logged and skipped; a triggered rule raises and, where registered,
    /// dispatches remediation inside its own error boundary before the next
    /// rule is evaluated.
    pub async fn evaluate(&self, snapshot: &Snapshot) {
        debug!(rules = self.rules.len(), categories = snapshot.len(), "evaluating alert rules");

        for rule in &self.rules {
            match self.evaluate_condition(&rule.condition, snapshot) {
                Ok(true) => {
                    let message = self.condition_message(&rule.condition, snapshot);
                    self.raise_with_cooldown(&rule.name, rule.severity, message, rule.cooldown)
                        .await;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(rule = %rule.name, error = %e, "failed to evaluate rule condition");
                }
            }
        }
    }

    /// Raises an alert using the severity's default cooldown. Used by the
    /// health-check failure and anomaly paths.
    pub async fn raise(
        &self,
        name: &str,
        severity: AlertSeverity,
        message: String,
    ) -> Option<Alert> {
        self.raise_with_cooldown(name, severity, message, severity.default_cooldown()).await
    }

    /// Raises an alert unless `name` is within its cooldown window.
    ///
    /// The cooldown check-and-set is atomic per key: two near-simultaneous
    /// triggers for the same name cannot both pass.
    pub async fn raise_with_cooldown(
        &self,
        name: &str,
        severity: AlertSeverity,
        message: String,
        cooldown: Duration,
    ) -> Option<Alert> {
        match self.cooldowns.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().elapsed() < cooldown {
                    debug!(alert = %name, "alert in cooldown window, skipping");
                    return None;
                }
                entry.insert(Instant::now());
            }
            Entry::Vacant(entry) => {
                entry.insert(Instant::now());
            }
        }

        let alert = Alert::new(name, severity, message);
        info!(
            alert_id = %alert.id,
            alert = %name,
            severity = severity.as_str(),
            message = %alert.message,
            "alert raised"
        );
        metrics::counter!("sentinel_alerts_raised_total", "severity" => severity.as_str())
            .increment(1);

        self.manager.record(alert.clone());

        // No receivers is fine; history is the source of truth.
        let _ = self.alert_tx.send(alert.clone());

        // Critical alerts always attempt remediation; lower severities only
        // when an action was registered for the name. Either way dispatch is
        // isolated and bounded, so the next rule is never blocked for long.
        if severity == AlertSeverity::Critical || self.remediation.has_action(name) {
            self.remediation
                .dispatch(RemediationContext {
                    alert_name: alert.name.clone(),
                    severity,
                    message: alert.message.clone(),
                    raised_at: alert.raised_at,
                })
                .await;
        }

        Some(alert)
    }

    fn evaluate_condition(
        &self,
        condition: &AlertCondition,
        snapshot: &Snapshot,
    ) -> Result<bool, RuleEvaluationError> {
        match condition {
            AlertCondition::FieldAbove { category, field, threshold } => {
                let value = self.numeric_field(snapshot, category, field)?;
                Ok(value > *threshold)
            }
            AlertCondition::FieldBelow { category, field, threshold } => {
                let value = self.numeric_field(snapshot, category, field)?;
                Ok(value < *threshold)
            }
            AlertCondition::CategoryStale { category, max_age_seconds } => {
                match snapshot.age(category) {
                    // Never observed counts as stale.
                    None => Ok(true),
                    Some(age) => Ok(age > chrono::Duration::seconds(*max_age_seconds as i64)),
                }
            }
            AlertCondition::BreakerOpen { name } => match self.breakers.state(name) {
                Some(state) => Ok(state == BreakerState::Open),
                None => Err(RuleEvaluationError::UnknownBreaker { name: name.clone() }),
            },
            AlertCondition::AllBreakersOpen => Ok(self.breakers.all_open()),
        }
    }

    fn numeric_field(
        &self,
        snapshot: &Snapshot,
        category: &str,
        field: &str,
    ) -> Result<f64, RuleEvaluationError> {
        if snapshot.sample(category).is_none() {
            return Err(RuleEvaluationError::MissingCategory { category: category.to_string() });
        }
        snapshot.field(category, field).ok_or_else(|| RuleEvaluationError::MissingField {
            category: category.to_string(),
            field: field.to_string(),
        })
    }

    fn condition_message(&self, condition: &AlertCondition, snapshot: &Snapshot) -> String {
        match condition {
            AlertCondition::FieldAbove { category, field, threshold } => {
                let value = snapshot.field(category, field).unwrap_or(f64::NAN);
                format!("{category}.{field} at {value:.2} exceeded threshold {threshold:.2}")
            }
            AlertCondition::FieldBelow { category, field, threshold } => {
                let value = snapshot.field(category, field).unwrap_or(f64::NAN);
                format!("{category}.{field} at {value:.2} fell below threshold {threshold:.2}")
            }
            AlertCondition::CategoryStale { category, max_age_seconds } => {
                format!("category '{category}' has no sample newer than {max_age_seconds}s")
            }
            AlertCondition::BreakerOpen { name } => {
                format!("dependency '{name}' is unavailable (circuit breaker open)")
            }
            AlertCondition::AllBreakersOpen => {
                "all registered dependencies are unavailable".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::BreakerConfig, store::MetricStore};
    use serde_json::json;

    fn engine_with_rules(rules: Vec<AlertRule>) -> AlertRuleEngine {
        let manager = Arc::new(AlertManager::new(100));
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        let remediation = Arc::new(RemediationDispatcher::new(Duration::from_secs(1)));
        AlertRuleEngine::new(rules, manager, breakers, remediation)
    }

    fn system_snapshot(memory_percent: f64) -> Snapshot {
        let store = MetricStore::new(10);
        let mut payload = serde_json::Map::new();
        payload.insert("memory_percent".to_string(), json!(memory_percent));
        store.record("system", payload);
        store.snapshot()
    }

    fn high_memory_rule(cooldown: Duration) -> AlertRule {
        AlertRule::new(
            "high_memory",
            AlertCondition::FieldAbove {
                category: "system".to_string(),
                field: "memory_percent".to_string(),
                threshold: 85.0,
            },
            AlertSeverity::High,
        )
        .with_cooldown(cooldown)
    }

    #[tokio::test]
    async fn test_rule_raises_when_condition_true() {
        let engine = engine_with_rules(vec![high_memory_rule(Duration::from_secs(5))]);

        engine.evaluate(&system_snapshot(90.0)).await;

        let alerts = engine.manager.all();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "high_memory");
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert!(alerts[0].message.contains("memory_percent"));
    }

    #[tokio::test]
    async fn test_rule_silent_when_condition_false() {
        let engine = engine_with_rules(vec![high_memory_rule(Duration::from_secs(5))]);
        engine.evaluate(&system_snapshot(50.0)).await;
        assert!(engine.manager.is_empty());
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_second_raise() {
        let engine = engine_with_rules(vec![high_memory_rule(Duration::from_secs(5))]);

        engine.evaluate(&system_snapshot(90.0)).await;
        engine.evaluate(&system_snapshot(95.0)).await;

        assert_eq!(engine.manager.len(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_expires() {
        let engine = engine_with_rules(vec![high_memory_rule(Duration::from_millis(10))]);

        engine.evaluate(&system_snapshot(90.0)).await;
        std::thread::sleep(Duration::from_millis(20));
        engine.evaluate(&system_snapshot(95.0)).await;

        assert_eq!(engine.manager.len(), 2);
    }

    #[tokio::test]
    async fn test_cooldown_shared_across_trigger_paths() {
        let engine = engine_with_rules(vec![]);

        let first = engine.raise("anomaly_system_memory", AlertSeverity::Medium, "m1".into()).await;
        let second = engine.raise("anomaly_system_memory", AlertSeverity::Medium, "m2".into()).await;

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(engine.manager.len(), 1);
    }

    #[tokio::test]
    async fn test_bad_rule_does_not_halt_others() {
        let bad = AlertRule::new(
            "bad_rule",
            AlertCondition::FieldAbove {
                category: "missing".to_string(),
                field: "nope".to_string(),
                threshold: 1.0,
            },
            AlertSeverity::Low,
        );
        let engine = engine_with_rules(vec![bad, high_memory_rule(Duration::from_secs(5))]);

        engine.evaluate(&system_snapshot(90.0)).await;

        let alerts = engine.manager.all();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].name, "high_memory");
    }

    #[tokio::test]
    async fn test_failing_remediation_does_not_halt_evaluation() {
        use crate::remediation::{FnRemediation, RemediationError};

        let manager = Arc::new(AlertManager::new(100));
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        let remediation = Arc::new(RemediationDispatcher::new(Duration::from_secs(1)));
        remediation.register(
            "high_memory",
            Arc::new(FnRemediation(|_ctx: &RemediationContext| {
                Err(RemediationError("remediation exploded".to_string()))
            })),
        );

        let second_rule = AlertRule::new(
            "memory_still_high",
            AlertCondition::FieldAbove {
                category: "system".to_string(),
                field: "memory_percent".to_string(),
                threshold: 80.0,
            },
            AlertSeverity::Medium,
        );
        let engine = AlertRuleEngine::new(
            vec![high_memory_rule(Duration::from_secs(5)), second_rule],
            manager,
            breakers,
            remediation,
        );

        engine.evaluate(&system_snapshot(90.0)).await;

        // Both rules raised despite the first one's remediation failing.
        assert_eq!(engine.manager.len(), 2);
    }

    #[tokio::test]
    async fn test_breaker_conditions() {
        let manager = Arc::new(AlertManager::new(100));
        let breakers = Arc::new(CircuitBreakerRegistry::new());
        breakers.register(
            "database",
            BreakerConfig { failure_threshold: 1, reset_timeout_seconds: 3600 },
        );
        let remediation = Arc::new(RemediationDispatcher::new(Duration::from_secs(1)));

        let rule = AlertRule::new(
            "database_down",
            AlertCondition::BreakerOpen { name: "database".to_string() },
            AlertSeverity::Critical,
        );
        let engine = AlertRuleEngine::new(vec![rule], manager, breakers.clone(), remediation);

        let empty = MetricStore::new(1).snapshot();
        engine.evaluate(&empty).await;
        assert!(engine.manager.is_empty());

        breakers.record_failure("database");
        engine.evaluate(&empty).await;
        assert_eq!(engine.manager.len(), 1);
        assert_eq!(engine.manager.all()[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_stale_category_condition() {
        let rule = AlertRule::new(
            "collector_stalled",
            AlertCondition::CategoryStale {
                category: "performance".to_string(),
                max_age_seconds: 60,
            },
            AlertSeverity::Medium,
        );
        let engine = engine_with_rules(vec![rule]);

        // Never observed counts as stale.
        let empty = MetricStore::new(1).snapshot();
        engine.evaluate(&empty).await;
        assert_eq!(engine.manager.len(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_alert() {
        let engine = engine_with_rules(vec![high_memory_rule(Duration::from_secs(5))]);
        let mut rx = engine.subscribe();

        engine.evaluate(&system_snapshot(90.0)).await;

        let alert = rx.try_recv().expect("subscriber should see the alert");
        assert_eq!(alert.name, "high_memory");
    }
}
