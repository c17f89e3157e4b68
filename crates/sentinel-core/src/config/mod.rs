//! Engine configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: Hardcoded in struct `Default` implementations
//! 2. **Config file**: TOML file specified by `SENTINEL_CONFIG` env var
//! 3. **Environment variables**: `SENTINEL__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`CollectorConfig`]: collection cadences for the two scheduler cycles
//! - [`StoreConfig`]: per-category ring buffer capacity
//! - [`BaselineConfig`]: warm-up window and tracked fields for anomaly detection
//! - [`AlertsConfig`]: alert history capacity and active-alert window
//! - [`BreakerConfig`]: default circuit breaker thresholds
//! - [`RemediationConfig`]: remediation action timeout
//! - [`LoggingConfig`]: log level and format for the embedding application
//!
//! # Validation
//!
//! Configuration is validated at load time. Invalid configurations (zero
//! intervals, zero capacities) return errors rather than failing at runtime.
//!
//! # Example
//!
//! ```toml
//! [collector]
//! low_frequency_interval_seconds = 15
//! high_frequency_interval_seconds = 5
//!
//! [[baseline.tracked]]
//! category = "system"
//! field = "memory_percent"
//! tolerance = 3.0
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

/// Collection cadences for the two scheduler cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Interval for the low-frequency cycle (system/application/business
    /// metrics). Must be greater than 0. Defaults to `15`.
    #[serde(default = "default_low_frequency_interval_seconds")]
    pub low_frequency_interval_seconds: u64,

    /// Interval for the high-frequency cycle (performance-sensitive counters).
    /// Must be greater than 0. Defaults to `5`.
    #[serde(default = "default_high_frequency_interval_seconds")]
    pub high_frequency_interval_seconds: u64,
}

fn default_low_frequency_interval_seconds() -> u64 {
    15
}

fn default_high_frequency_interval_seconds() -> u64 {
    5
}

/// Metric store sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum samples retained per category before FIFO eviction. Must be
    /// greater than 0. Defaults to `1000`.
    #[serde(default = "default_capacity_per_category")]
    pub capacity_per_category: usize,
}

fn default_capacity_per_category() -> usize {
    1000
}

/// A `(category, field)` pair tracked by the anomaly detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedFieldConfig {
    /// Metric category the field lives in (e.g., "system").
    pub category: String,

    /// Numeric payload field to baseline (e.g., "memory_percent"). One level
    /// of nesting is supported with a `.` separator.
    pub field: String,

    /// Standard-deviation multiplier before a sample is flagged as anomalous.
    /// Tighter tolerances suit latency-sensitive fields. Defaults to `3.0`.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    3.0
}

/// Baseline computation and anomaly detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Number of consecutive low-frequency snapshots collected before the
    /// baseline is computed and frozen. Defaults to `240` (one hour at the
    /// default 15s cadence).
    #[serde(default = "default_warmup_snapshots")]
    pub warmup_snapshots: usize,

    /// Fields tracked for anomaly detection. Empty disables detection.
    #[serde(default)]
    pub tracked: Vec<TrackedFieldConfig>,
}

fn default_warmup_snapshots() -> usize {
    240
}

/// Alert history and active-view settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Maximum alerts retained in history before eviction. Defaults to `1000`.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Alerts older than this are excluded from the active view (they remain
    /// in history). Defaults to `3600` seconds.
    #[serde(default = "default_active_window_seconds")]
    pub active_window_seconds: u64,
}

fn default_history_capacity() -> usize {
    1000
}

fn default_active_window_seconds() -> u64 {
    3600
}

/// Default circuit breaker tuning, applied to breakers registered without
/// explicit settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens. Defaults to `5`.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before admitting a half-open trial.
    /// Defaults to `30`.
    #[serde(default = "default_reset_timeout_seconds")]
    pub reset_timeout_seconds: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_seconds() -> u64 {
    30
}

impl BreakerConfig {
    /// Returns the reset timeout as a [`Duration`].
    #[must_use]
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_seconds)
    }
}

/// Remediation dispatch settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Maximum seconds a remediation action may run before it is abandoned
    /// and logged as timed out. Defaults to `10`.
    #[serde(default = "default_remediation_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_remediation_timeout_seconds() -> u64 {
    10
}

/// Logging configuration for the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults
    /// to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

/// Root engine configuration containing all subsystem settings.
///
/// Loaded from TOML files and environment variables with the `SENTINEL__`
/// prefix using `__` as a separator (e.g.,
/// `SENTINEL__COLLECTOR__LOW_FREQUENCY_INTERVAL_SECONDS=30`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Deployment environment (e.g., "development", "production"). Defaults
    /// to `"development"`.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Collection cadences.
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Metric store sizing.
    #[serde(default)]
    pub store: StoreConfig,

    /// Baseline and anomaly detection settings.
    #[serde(default)]
    pub baseline: BaselineConfig,

    /// Alert history settings.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Default circuit breaker tuning.
    #[serde(default)]
    pub breakers: BreakerConfig,

    /// Remediation dispatch settings.
    #[serde(default)]
    pub remediation: RemediationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { low_frequency_interval_seconds: 15, high_frequency_interval_seconds: 5 }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { capacity_per_category: 1000 }
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self { warmup_snapshots: 240, tracked: Vec::new() }
    }
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { history_capacity: 1000, active_window_seconds: 3600 }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, reset_timeout_seconds: 30 }
    }
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            collector: CollectorConfig::default(),
            store: StoreConfig::default(),
            baseline: BaselineConfig::default(),
            alerts: AlertsConfig::default(),
            breakers: BreakerConfig::default(),
            remediation: RemediationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `SENTINEL__` prefix can override any
    /// configuration value, using `__` as a separator for nested fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("environment", "development")?
            .set_default("collector.low_frequency_interval_seconds", 15)?
            .set_default("collector.high_frequency_interval_seconds", 5)?
            .set_default("store.capacity_per_category", 1000)?
            .set_default("baseline.warmup_snapshots", 240)?
            .set_default("alerts.history_capacity", 1000)?
            .set_default("alerts.active_window_seconds", 3600)?
            .set_default("breakers.failure_threshold", 5)?
            .set_default("breakers.reset_timeout_seconds", 30)?
            .set_default("remediation.timeout_seconds", 10)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("SENTINEL").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/sentinel.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `SENTINEL_CONFIG`
    /// environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("SENTINEL_CONFIG").unwrap_or_else(|_| "config/sentinel.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the low-frequency collection interval as a [`Duration`].
    #[must_use]
    pub fn low_frequency_interval(&self) -> Duration {
        Duration::from_secs(self.collector.low_frequency_interval_seconds)
    }

    /// Returns the high-frequency collection interval as a [`Duration`].
    #[must_use]
    pub fn high_frequency_interval(&self) -> Duration {
        Duration::from_secs(self.collector.high_frequency_interval_seconds)
    }

    /// Returns the remediation timeout as a [`Duration`].
    #[must_use]
    pub fn remediation_timeout(&self) -> Duration {
        Duration::from_secs(self.remediation.timeout_seconds)
    }

    /// Returns the active-alert window as a [`chrono::Duration`].
    #[must_use]
    pub fn active_alert_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.alerts.active_window_seconds as i64)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.collector.low_frequency_interval_seconds == 0 {
            return Err("collector.low_frequency_interval_seconds must be greater than 0".into());
        }
        if self.collector.high_frequency_interval_seconds == 0 {
            return Err("collector.high_frequency_interval_seconds must be greater than 0".into());
        }
        if self.store.capacity_per_category == 0 {
            return Err("store.capacity_per_category must be greater than 0".into());
        }
        if self.baseline.warmup_snapshots == 0 {
            return Err("baseline.warmup_snapshots must be greater than 0".into());
        }
        if self.alerts.history_capacity == 0 {
            return Err("alerts.history_capacity must be greater than 0".into());
        }
        if self.breakers.failure_threshold == 0 {
            return Err("breakers.failure_threshold must be greater than 0".into());
        }
        for tracked in &self.baseline.tracked {
            if tracked.category.is_empty() || tracked.field.is_empty() {
                return Err("baseline.tracked entries require category and field".into());
            }
            if tracked.tolerance <= 0.0 {
                return Err(format!(
                    "baseline.tracked tolerance for {}.{} must be positive",
                    tracked.category, tracked.field
                ));
            }
        }
        Ok(())
    }
}
