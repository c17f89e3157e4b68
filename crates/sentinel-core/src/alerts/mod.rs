//! Alerting: rule definitions, bounded alert history, and the rule engine
//! that evaluates conditions against metric snapshots.

pub mod engine;
pub mod manager;
pub mod types;

pub use engine::{AlertRuleEngine, RuleEvaluationError};
pub use manager::AlertManager;
pub use types::{Alert, AlertCondition, AlertRule, AlertSeverity};
