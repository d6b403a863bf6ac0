//! Statistics history module.
//!
//! This module handles:
//! - Delta computation between counters and their baselines
//! - The roll cycle that writes history rows and advances baselines
//! - Periodic single-flight scheduling of rolls

pub mod delta;
pub mod roller;
pub mod scheduler;

pub use delta::{compute_delta, CounterDelta, RollOutcome, RollPlan};
pub use roller::{RollReport, StatisticsHistoryRoller};
pub use scheduler::{HistoryScheduler, RollOutcomeStatus, RollStatus};
