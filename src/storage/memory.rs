//! In-memory statistics storage for testing.
//!
//! Batches are applied under a single lock, so each call lands completely
//! or not at all. Failures can be injected per operation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::StorageError;

use super::types::{BaselineUpdate, Counter, HistorySnapshot};
use super::StatisticsStorage;

/// Storage operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePoint {
    /// `fetch_counters`.
    Fetch,
    /// `insert_snapshots`.
    Insert,
    /// `update_baselines`.
    Update,
}

/// A call observed by the memory backend, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    /// Counters were fetched.
    Fetch,
    /// Snapshots were inserted (number of rows).
    Insert(usize),
    /// Baselines were updated (number of keys).
    Update(usize),
}

#[derive(Debug, Default)]
struct Tables {
    statistics: BTreeMap<String, Counter>,
    history: Vec<HistorySnapshot>,
    calls: Vec<StorageCall>,
}

#[derive(Debug, Default)]
struct Failures {
    fetch: AtomicBool,
    insert: AtomicBool,
    update: AtomicBool,
}

impl Failures {
    fn flag(&self, point: FailurePoint) -> &AtomicBool {
        match point {
            FailurePoint::Fetch => &self.fetch,
            FailurePoint::Insert => &self.insert,
            FailurePoint::Update => &self.update,
        }
    }
}

/// In-memory `statistics` / `statistics_history` tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: Arc<Mutex<Tables>>,
    failures: Arc<Failures>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with counters.
    pub fn with_counters(counters: impl IntoIterator<Item = Counter>) -> Self {
        let storage = Self::new();
        for counter in counters {
            storage.insert_counter(counter);
        }
        storage
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a counter row.
    pub fn insert_counter(&self, counter: Counter) {
        self.tables().statistics.insert(counter.key.clone(), counter);
    }

    /// Set a counter's current value, keeping its baseline.
    /// Unknown keys are created with a zero baseline.
    pub fn set_value(&self, key: &str, value: u64) {
        let mut tables = self.tables();
        tables
            .statistics
            .entry(key.to_string())
            .and_modify(|c| c.value = value)
            .or_insert_with(|| Counter::new(key, value, 0));
    }

    /// Current counter row.
    pub fn counter(&self, key: &str) -> Option<Counter> {
        self.tables().statistics.get(key).cloned()
    }

    /// Every history row written so far.
    pub fn history(&self) -> Vec<HistorySnapshot> {
        self.tables().history.clone()
    }

    /// History rows for one key, oldest first.
    pub fn history_for(&self, key: &str) -> Vec<HistorySnapshot> {
        self.tables()
            .history
            .iter()
            .filter(|s| s.key == key)
            .cloned()
            .collect()
    }

    /// Calls observed so far, including failed ones.
    pub fn calls(&self) -> Vec<StorageCall> {
        self.tables().calls.clone()
    }

    /// Make an operation fail until cleared.
    pub fn set_failure(&self, point: FailurePoint, fail: bool) {
        self.failures.flag(point).store(fail, Ordering::SeqCst);
    }

    fn check_failure(&self, point: FailurePoint) -> Result<(), StorageError> {
        if self.failures.flag(point).load(Ordering::SeqCst) {
            return Err(StorageError::Injected(format!("{:?} failure", point)));
        }
        Ok(())
    }
}

#[async_trait]
impl StatisticsStorage for MemoryStorage {
    async fn fetch_counters(&self) -> Result<Vec<Counter>, StorageError> {
        self.tables().calls.push(StorageCall::Fetch);
        self.check_failure(FailurePoint::Fetch)?;
        Ok(self.tables().statistics.values().cloned().collect())
    }

    async fn insert_snapshots(&self, batch: &[HistorySnapshot]) -> Result<(), StorageError> {
        let mut tables = self.tables();
        tables.calls.push(StorageCall::Insert(batch.len()));
        self.check_failure(FailurePoint::Insert)?;
        tables.history.extend_from_slice(batch);
        Ok(())
    }

    async fn update_baselines(&self, batch: &[BaselineUpdate]) -> Result<(), StorageError> {
        let mut tables = self.tables();
        tables.calls.push(StorageCall::Update(batch.len()));
        self.check_failure(FailurePoint::Update)?;
        for update in batch {
            // No row matches an unknown key.
            if let Some(counter) = tables.statistics.get_mut(&update.key) {
                counter.previous_value = update.previous_value;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    #[tokio::test]
    async fn update_ignores_unknown_keys() {
        let storage = MemoryStorage::with_counters([Counter::new("READINGS", 10, 0)]);
        storage
            .update_baselines(&[
                BaselineUpdate {
                    key: "READINGS".to_string(),
                    previous_value: 10,
                },
                BaselineUpdate {
                    key: "MISSING".to_string(),
                    previous_value: 3,
                },
            ])
            .await
            .unwrap();

        assert_eq!(storage.counter("READINGS").unwrap().previous_value, 10);
        assert!(storage.counter("MISSING").is_none());
    }

    #[tokio::test]
    async fn injected_insert_failure_writes_nothing() {
        let storage = MemoryStorage::new();
        storage.set_failure(FailurePoint::Insert, true);

        let snapshot = HistorySnapshot {
            key: "READINGS".to_string(),
            delta: 1,
            timestamp: Local::now().fixed_offset(),
        };
        let result = storage.insert_snapshots(&[snapshot]).await;

        assert!(matches!(result, Err(StorageError::Injected(_))));
        assert!(storage.history().is_empty());
        assert_eq!(storage.calls(), vec![StorageCall::Insert(1)]);
    }

    #[test]
    fn set_value_keeps_baseline() {
        let storage = MemoryStorage::with_counters([Counter::new("PURGED", 5, 5)]);
        storage.set_value("PURGED", 9);
        storage.set_value("UNSENT", 2);

        assert_eq!(storage.counter("PURGED").unwrap().previous_value, 5);
        assert_eq!(storage.counter("PURGED").unwrap().value, 9);
        assert_eq!(storage.counter("UNSENT").unwrap().previous_value, 0);
    }
}
