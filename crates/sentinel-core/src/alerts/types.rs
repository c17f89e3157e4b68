//! Alert type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Severity level of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational, worth tracking.
    Low,
    /// Degradation that should be looked at.
    Medium,
    /// Serious problem requiring attention soon.
    High,
    /// Immediate attention required; remediation is attempted.
    Critical,
}

impl AlertSeverity {
    /// Default cooldown between two raises of the same alert name, scaled so
    /// noisier low-severity alerts are suppressed longer.
    #[must_use]
    pub fn default_cooldown(self) -> Duration {
        match self {
            Self::Low => Duration::from_secs(600),
            Self::Medium => Duration::from_secs(300),
            Self::High => Duration::from_secs(120),
            Self::Critical => Duration::from_secs(60),
        }
    }

    /// Stable lowercase label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Condition that triggers an alert rule, evaluated against a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertCondition {
    /// A numeric payload field exceeds a threshold.
    FieldAbove {
        /// Metric category holding the field.
        category: String,
        /// Payload field name (one level of nesting via `.`).
        field: String,
        /// Exclusive upper bound; values above it trigger.
        threshold: f64,
    },
    /// A numeric payload field falls below a threshold.
    FieldBelow {
        /// Metric category holding the field.
        category: String,
        /// Payload field name (one level of nesting via `.`).
        field: String,
        /// Exclusive lower bound; values below it trigger.
        threshold: f64,
    },
    /// A category has not been observed recently (or ever).
    CategoryStale {
        /// Metric category expected to be fresh.
        category: String,
        /// Maximum acceptable sample age in seconds.
        max_age_seconds: u64,
    },
    /// A named dependency's circuit breaker is open.
    BreakerOpen {
        /// Registered breaker name.
        name: String,
    },
    /// Every registered circuit breaker is open.
    AllBreakersOpen,
}

/// A rule defining when to raise alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique alert name this rule raises under.
    pub name: String,
    /// Condition evaluated once per low-frequency cycle.
    pub condition: AlertCondition,
    /// Severity of alerts raised by this rule.
    pub severity: AlertSeverity,
    /// Minimum time between two raises of this rule.
    #[serde(with = "duration_seconds")]
    pub cooldown: Duration,
}

impl AlertRule {
    /// Creates a rule with the severity's default cooldown.
    #[must_use]
    pub fn new(name: impl Into<String>, condition: AlertCondition, severity: AlertSeverity) -> Self {
        Self { name: name.into(), condition, severity, cooldown: severity.default_cooldown() }
    }

    /// Overrides the cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// An active or historical alert instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier.
    pub id: String,
    /// Alert name (rule name, `health_check_<name>`, or `anomaly_<field>`).
    pub name: String,
    /// Severity level.
    pub severity: AlertSeverity,
    /// Descriptive message with the observed values.
    pub message: String,
    /// When the alert was raised.
    pub raised_at: DateTime<Utc>,
    /// Whether an operator has acknowledged the alert.
    pub acknowledged: bool,
    /// When the alert was acknowledged, if it was.
    pub acknowledged_at: Option<DateTime<Utc>>,
    /// When the alert was resolved, if it was.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Creates a new unacknowledged, unresolved alert with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            severity,
            message: message.into(),
            raised_at: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
            resolved_at: None,
        }
    }

    /// Marks the alert as acknowledged. Acknowledging a resolved alert is a
    /// no-op.
    pub fn acknowledge(&mut self) {
        if self.resolved_at.is_none() && !self.acknowledged {
            self.acknowledged = true;
            self.acknowledged_at = Some(Utc::now());
        }
    }

    /// Marks the alert as resolved.
    pub fn resolve(&mut self) {
        if self.resolved_at.is_none() {
            self.resolved_at = Some(Utc::now());
        }
    }

    /// Whether the alert has been resolved.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Whether the alert counts as active within `window` of `now`: not
    /// acknowledged, not resolved, raised recently enough.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        !self.acknowledged
            && self.resolved_at.is_none()
            && now.signed_duration_since(self.raised_at) <= window
    }
}

mod duration_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_cooldown_ordering() {
        assert!(AlertSeverity::Critical.default_cooldown() < AlertSeverity::High.default_cooldown());
        assert!(AlertSeverity::High.default_cooldown() < AlertSeverity::Medium.default_cooldown());
        assert!(AlertSeverity::Medium.default_cooldown() < AlertSeverity::Low.default_cooldown());
    }

    #[test]
    fn test_alert_lifecycle() {
        let mut alert = Alert::new("high_memory", AlertSeverity::High, "memory at 91%");
        assert!(!alert.acknowledged);
        assert!(!alert.is_resolved());

        alert.acknowledge();
        assert!(alert.acknowledged);
        assert!(alert.acknowledged_at.is_some());

        alert.resolve();
        assert!(alert.is_resolved());
    }

    #[test]
    fn test_acknowledge_after_resolve_is_noop() {
        let mut alert = Alert::new("high_memory", AlertSeverity::High, "memory at 91%");
        alert.resolve();
        alert.acknowledge();
        assert!(!alert.acknowledged);
    }

    #[test]
    fn test_active_window() {
        let window = chrono::Duration::hours(1);
        let now = Utc::now();

        let fresh = Alert::new("a", AlertSeverity::Low, "m");
        assert!(fresh.is_active(now, window));

        let mut acked = Alert::new("b", AlertSeverity::Low, "m");
        acked.acknowledge();
        assert!(!acked.is_active(now, window));

        let mut old = Alert::new("c", AlertSeverity::Low, "m");
        old.raised_at = now - chrono::Duration::hours(2);
        assert!(!old.is_active(now, window));
    }

    #[test]
    fn test_rule_serde() {
        let rule = AlertRule::new(
            "high_memory",
            AlertCondition::FieldAbove {
                category: "system".to_string(),
                field: "memory_percent".to_string(),
                threshold: 85.0,
            },
            AlertSeverity::High,
        );

        let json = serde_json::to_string(&rule).unwrap();
        let parsed: AlertRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, "high_memory");
        assert_eq!(parsed.cooldown, Duration::from_secs(120));
        assert_eq!(parsed.condition, rule.condition);
    }
}
