//! # Sentinel Core
//!
//! Core library for the Sentinel production monitoring and alerting engine.
//!
//! This crate provides the foundational components for:
//!
//! - **[`store`]**: Bounded, append-only rolling buffers of metric samples keyed
//!   by category, with consistent point-in-time snapshots.
//!
//! - **[`collector`]**: Dual-cadence scheduling that pulls values from registered
//!   metric sources and drives rule evaluation and anomaly detection.
//!
//! - **[`health`]**: Independent per-check scheduling loops with timeout and
//!   retry semantics, recording results back into the metric store.
//!
//! - **[`breaker`]**: Per-dependency circuit breaker state machines with lazy
//!   closed/open/half-open transitions.
//!
//! - **[`baseline`]**: Statistical baselines computed from a warm-up window and
//!   frozen thereafter, used for standard-deviation anomaly detection.
//!
//! - **[`alerts`]**: Threshold-based alert rules with per-name cooldown
//!   suppression and a bounded alert history.
//!
//! - **[`remediation`]**: Auto-remediation actions dispatched per alert name,
//!   executed in isolation with their own timeout.
//!
//! - **[`report`]**: A consistent composed report for dashboards and external
//!   broadcasters.
//!
//! ## Data Flow
//!
//! ```text
//! sources ──► CollectorScheduler ──► MetricStore
//!                                        │ snapshot()
//!                     ┌──────────────────┼──────────────────┐
//!                     ▼                  ▼                  ▼
//!              AlertRuleEngine    AnomalyDetector    ReportAggregator
//!                     │                  │                  │
//!                     └───────► raise ◄──┘                  ▼
//!                                 │                   SnapshotSink
//!                                 ▼
//!                        RemediationDispatcher
//! ```
//!
//! Evaluation in one cycle always sees a single consistent snapshot; rule
//! evaluation, anomaly detection, and report generation never block collectors.

pub mod alerts;
pub mod baseline;
pub mod breaker;
pub mod collector;
pub mod config;
pub mod engine;
pub mod health;
pub mod remediation;
pub mod report;
pub mod store;
