#![forbid(unsafe_code)]
//! flowlens-core library.
//!
//! Work item model, the snapshot read store, and the timeline
//! reconstruction pipeline that every flow metric is computed from.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types; domain faults are
//!   [`error::FlowError`] values carrying a stable [`error::ErrorCode`].
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod timeline;
