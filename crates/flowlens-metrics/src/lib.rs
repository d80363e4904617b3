#![forbid(unsafe_code)]
//! flowlens-metrics library.
//!
//! Statistical primitives, trend analysis, and the metric calculators that
//! compose them over work item populations.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types; domain faults are
//!   `flowlens_core::error::FlowError` values.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod calc;
pub mod filters;
pub mod stats;
pub mod trend;
