//! Engine initialization and lifecycle management.
//!
//! This module provides the single assembly point for all monitoring
//! components, suitable for embedding in any long-running service. It wires
//! the metric store, collector scheduler, health check runner, rule engine,
//! baseline tracker, and report aggregator together, manages their background
//! tasks, and coordinates graceful shutdown.
//!
//! # Examples
//!
//! ```no_run
//! use sentinel_core::{
//!     alerts::{AlertCondition, AlertRule, AlertSeverity},
//!     config::MonitorConfig,
//!     engine::MonitorEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MonitorConfig::load()?;
//!
//!     let engine = MonitorEngine::builder()
//!         .with_config(config)
//!         .with_rule(AlertRule::new(
//!             "high_memory",
//!             AlertCondition::FieldAbove {
//!                 category: "system".to_string(),
//!                 field: "memory_percent".to_string(),
//!                 threshold: 85.0,
//!             },
//!             AlertSeverity::High,
//!         ))
//!         .build()?;
//!
//!     engine.start();
//!
//!     // ... application runs; query engine.report() on demand ...
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{EngineError, MonitorEngineBuilder};
pub use components::MonitorComponents;
pub use lifecycle::MonitorEngine;
