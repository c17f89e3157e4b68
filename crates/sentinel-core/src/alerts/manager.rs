//! Alert storage and lifecycle management.

use parking_lot::RwLock;

use super::types::{Alert, AlertSeverity};

/// Stores active and historical alerts in a bounded in-memory history.
///
/// When approaching capacity, resolved alerts are evicted first; if the
/// history is still full, the oldest alerts are dropped FIFO. Active and
/// recent alerts are thereby preserved as long as possible.
pub struct AlertManager {
    alerts: RwLock<Vec<Alert>>,
    capacity: usize,
}

impl AlertManager {
    /// Creates a manager retaining at most `capacity` alerts.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { alerts: RwLock::new(Vec::new()), capacity: capacity.max(1) }
    }

    /// Appends an alert to the history, evicting as needed.
    pub fn record(&self, alert: Alert) {
        let mut alerts = self.alerts.write();

        // Near capacity, shed resolved alerts before dropping anything recent.
        if alerts.len() >= self.capacity * 9 / 10 {
            alerts.retain(|a| !a.is_resolved());
        }
        while alerts.len() >= self.capacity {
            alerts.remove(0);
        }

        alerts.push(alert);
    }

    /// Acknowledges an alert by id. Returns `false` if no such alert exists.
    #[must_use]
    pub fn acknowledge(&self, alert_id: &str) -> bool {
        let mut alerts = self.alerts.write();
        if let Some(alert) = alerts.iter_mut().find(|a| a.id == alert_id) {
            alert.acknowledge();
            true
        } else {
            false
        }
    }

    /// Resolves an alert by id. Returns `false` if no such alert exists.
    #[must_use]
    pub fn resolve(&self, alert_id: &str) -> bool {
        let mut alerts = self.alerts.write();
        if let Some(alert) = alerts.iter_mut().find(|a| a.id == alert_id) {
            alert.resolve();
            true
        } else {
            false
        }
    }

    /// Gets a specific alert by id.
    #[must_use]
    pub fn get(&self, alert_id: &str) -> Option<Alert> {
        self.alerts.read().iter().find(|a| a.id == alert_id).cloned()
    }

    /// All alerts in the history, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<Alert> {
        self.alerts.read().clone()
    }

    /// The `n` most recent alerts, oldest first.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<Alert> {
        let alerts = self.alerts.read();
        let skip = alerts.len().saturating_sub(n);
        alerts[skip..].to_vec()
    }

    /// Active alerts: unacknowledged, unresolved, and raised within `window`.
    /// Older unresolved alerts roll out of this view but remain in history.
    #[must_use]
    pub fn active(&self, window: chrono::Duration) -> Vec<Alert> {
        let now = chrono::Utc::now();
        self.alerts.read().iter().filter(|a| a.is_active(now, window)).cloned().collect()
    }

    /// Count of active alerts at or above `severity` within `window`.
    #[must_use]
    pub fn active_count_at_least(&self, severity: AlertSeverity, window: chrono::Duration) -> usize {
        let now = chrono::Utc::now();
        self.alerts
            .read()
            .iter()
            .filter(|a| a.is_active(now, window) && a.severity >= severity)
            .count()
    }

    /// Total alerts currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(name: &str, severity: AlertSeverity) -> Alert {
        Alert::new(name, severity, format!("{name} fired"))
    }

    #[test]
    fn test_record_and_get() {
        let manager = AlertManager::new(10);
        let a = alert("high_memory", AlertSeverity::High);
        let id = a.id.clone();

        manager.record(a);
        assert_eq!(manager.len(), 1);
        assert!(manager.get(&id).is_some());
        assert!(manager.get("nope").is_none());
    }

    #[test]
    fn test_acknowledge_and_resolve() {
        let manager = AlertManager::new(10);
        let a = alert("high_memory", AlertSeverity::High);
        let id = a.id.clone();
        manager.record(a);

        assert!(manager.acknowledge(&id));
        assert!(manager.get(&id).unwrap().acknowledged);

        assert!(manager.resolve(&id));
        assert!(manager.get(&id).unwrap().is_resolved());

        assert!(!manager.acknowledge("missing"));
        assert!(!manager.resolve("missing"));
    }

    #[test]
    fn test_active_excludes_acked_resolved_and_old() {
        let manager = AlertManager::new(10);
        let window = chrono::Duration::hours(1);

        manager.record(alert("fresh", AlertSeverity::Low));

        let acked = alert("acked", AlertSeverity::Low);
        let acked_id = acked.id.clone();
        manager.record(acked);
        assert!(manager.acknowledge(&acked_id));

        let mut old = alert("old", AlertSeverity::Low);
        old.raised_at = chrono::Utc::now() - chrono::Duration::hours(2);
        manager.record(old);

        let active = manager.active(window);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "fresh");
        // Everything stays in history.
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_severity_counting() {
        let manager = AlertManager::new(10);
        let window = chrono::Duration::hours(1);

        manager.record(alert("a", AlertSeverity::Low));
        manager.record(alert("b", AlertSeverity::High));
        manager.record(alert("c", AlertSeverity::Critical));

        assert_eq!(manager.active_count_at_least(AlertSeverity::Critical, window), 1);
        assert_eq!(manager.active_count_at_least(AlertSeverity::High, window), 2);
        assert_eq!(manager.active_count_at_least(AlertSeverity::Low, window), 3);
    }

    #[test]
    fn test_capacity_fifo_eviction() {
        let manager = AlertManager::new(5);
        let mut first_id = None;
        for i in 0..6 {
            let a = alert(&format!("alert{i}"), AlertSeverity::Low);
            if i == 0 {
                first_id = Some(a.id.clone());
            }
            manager.record(a);
        }

        assert_eq!(manager.len(), 5);
        assert!(manager.get(&first_id.unwrap()).is_none());
    }

    #[test]
    fn test_capacity_prefers_evicting_resolved() {
        let manager = AlertManager::new(10);

        // Fill to the 90% cleanup threshold with a mix.
        for i in 0..9 {
            let a = alert(&format!("alert{i}"), AlertSeverity::Low);
            let id = a.id.clone();
            manager.record(a);
            if i < 4 {
                assert!(manager.resolve(&id));
            }
        }

        // The next record triggers the resolved sweep.
        manager.record(alert("newest", AlertSeverity::High));

        let remaining = manager.all();
        assert!(remaining.iter().all(|a| !a.is_resolved()));
        assert!(remaining.iter().any(|a| a.name == "newest"));
    }

    #[test]
    fn test_recent_returns_tail() {
        let manager = AlertManager::new(10);
        for i in 0..5 {
            manager.record(alert(&format!("alert{i}"), AlertSeverity::Low));
        }

        let recent = manager.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].name, "alert3");
        assert_eq!(recent[1].name, "alert4");
    }
}
