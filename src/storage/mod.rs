//! Storage collaborator for the statistics history roller.
//!
//! This module handles:
//! - Counter and snapshot types plus the storage service wire format
//! - The [`StatisticsStorage`] seam the roller depends on
//! - An HTTP client for the Fledge storage service
//! - An in-memory backend for testing

pub mod client;
pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::error::StorageError;

pub use client::StorageClient;
pub use memory::{FailurePoint, MemoryStorage, StorageCall};
pub use types::{BaselineUpdate, Counter, HistorySnapshot};

/// Table holding cumulative counters and their baselines.
pub const STATISTICS_TABLE: &str = "statistics";
/// Append-only table of per-roll deltas.
pub const HISTORY_TABLE: &str = "statistics_history";

/// Operations the roller needs from storage.
///
/// Each batch call is all-or-nothing from the caller's point of view.
#[async_trait]
pub trait StatisticsStorage: Send + Sync {
    /// Fetch every current counter. Order is irrelevant.
    async fn fetch_counters(&self) -> Result<Vec<Counter>, StorageError>;

    /// Append snapshot rows to the history table.
    async fn insert_snapshots(&self, batch: &[HistorySnapshot]) -> Result<(), StorageError>;

    /// Set `previous_value` for each key, matched by exact key equality.
    async fn update_baselines(&self, batch: &[BaselineUpdate]) -> Result<(), StorageError>;
}
