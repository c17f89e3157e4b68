//! Auto-remediation actions dispatched per alert name.
//!
//! Actions are intentionally generic callbacks ("force GC", "open circuit
//! breaker"); the engine has no knowledge of their internal effects. Dispatch
//! is fully isolated: an action that fails, panics, or overruns its timeout is
//! logged and never propagates into rule evaluation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertSeverity;

/// Error returned by a remediation action. Caught and logged at the dispatch
/// boundary, never re-raised.
#[derive(Debug, Error)]
#[error("remediation failed: {0}")]
pub struct RemediationError(pub String);

/// Context handed to a remediation action about the alert that triggered it.
#[derive(Debug, Clone)]
pub struct RemediationContext {
    /// Alert name that triggered the dispatch.
    pub alert_name: String,
    /// Severity of the triggering alert.
    pub severity: AlertSeverity,
    /// Message of the triggering alert.
    pub message: String,
    /// When the triggering alert was raised.
    pub raised_at: DateTime<Utc>,
}

/// A side-effecting corrective action bound to an alert name.
#[async_trait]
pub trait RemediationAction: Send + Sync {
    /// Executes the action. Failures are logged by the dispatcher.
    async fn run(&self, context: &RemediationContext) -> Result<(), RemediationError>;
}

/// Adapter turning a plain async-free closure into a [`RemediationAction`].
pub struct FnRemediation<F>(pub F);

#[async_trait]
impl<F> RemediationAction for FnRemediation<F>
where
    F: Fn(&RemediationContext) -> Result<(), RemediationError> + Send + Sync,
{
    async fn run(&self, context: &RemediationContext) -> Result<(), RemediationError> {
        (self.0)(context)
    }
}

/// Maps alert names to registered actions and executes them in isolation.
pub struct RemediationDispatcher {
    actions: DashMap<String, Arc<dyn RemediationAction>>,
    timeout: Duration,
}

impl RemediationDispatcher {
    /// Creates a dispatcher whose actions are bounded by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { actions: DashMap::new(), timeout }
    }

    /// Registers an action for `alert_name`. At most one action per name;
    /// the last registration wins.
    pub fn register(&self, alert_name: &str, action: Arc<dyn RemediationAction>) {
        if self.actions.insert(alert_name.to_string(), action).is_some() {
            warn!(alert = %alert_name, "remediation action replaced by later registration");
        } else {
            debug!(alert = %alert_name, "remediation action registered");
        }
    }

    /// Whether an action is registered for `alert_name`.
    #[must_use]
    pub fn has_action(&self, alert_name: &str) -> bool {
        self.actions.contains_key(alert_name)
    }

    /// Looks up and executes the action for the context's alert name.
    ///
    /// Absence of a registered action is a no-op, not an error. The action is
    /// run on its own task so a panic is caught at the task boundary, and it
    /// is abandoned if it exceeds the dispatcher timeout. Nothing here ever
    /// returns an error to the caller.
    pub async fn dispatch(&self, context: RemediationContext) {
        let Some(action) = self.actions.get(&context.alert_name).map(|a| Arc::clone(&a)) else {
            debug!(alert = %context.alert_name, "no remediation registered, skipping");
            return;
        };

        info!(alert = %context.alert_name, "dispatching remediation action");

        let name = context.alert_name.clone();
        let handle = tokio::spawn(async move { action.run(&context).await });

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(()))) => {
                info!(alert = %name, "remediation action completed");
                metrics::counter!("sentinel_remediations_total", "outcome" => "ok").increment(1);
            }
            Ok(Ok(Err(e))) => {
                error!(alert = %name, error = %e, "remediation action failed");
                metrics::counter!("sentinel_remediations_total", "outcome" => "error")
                    .increment(1);
            }
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    error!(alert = %name, "remediation action panicked - recovering");
                } else {
                    warn!(alert = %name, "remediation action cancelled");
                }
                metrics::counter!("sentinel_remediations_total", "outcome" => "panic")
                    .increment(1);
            }
            Err(_) => {
                error!(
                    alert = %name,
                    timeout_secs = self.timeout.as_secs(),
                    "remediation action timed out, abandoning"
                );
                metrics::counter!("sentinel_remediations_total", "outcome" => "timeout")
                    .increment(1);
            }
        }
    }
}
