//! Fledge statistics history service.
//!
//! Fledge keeps one cumulative counter per statistic (`READINGS`, `PURGED`,
//! ...) in the `statistics` table. This crate periodically turns those
//! counters into a per-period time series in `statistics_history`:
//!
//! ```text
//! statistics          value=100  previous_value=80
//!                          │
//!                          ▼  roll
//! statistics_history  delta=20   history_ts=<roll time>
//! statistics          value=100  previous_value=100
//! ```
//!
//! Baselines only advance after the history rows are stored, so a roll that
//! fails halfway is healed by the next one.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`storage`]: Storage trait, Fledge storage client and in-memory backend
//! - [`history`]: Delta computation, roll cycle and scheduling
//! - [`api`]: Management HTTP API
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Signal handling helpers

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod metrics;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{HistoryError, Result, ServiceError, StorageError};
