//! Statistics history roll cycle.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::error::HistoryError;
use crate::metrics;
use crate::storage::{StatisticsStorage, HISTORY_TABLE, STATISTICS_TABLE};

use super::delta::RollPlan;

/// Summary of a successful roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollReport {
    /// Counters fetched.
    pub counters: usize,
    /// Counters that advanced.
    pub advanced: usize,
    /// Counters that did not move.
    pub unchanged: usize,
    /// Keys of counters found reset.
    pub resets: Vec<String>,
    /// History rows written.
    pub snapshots_written: usize,
    /// Baselines advanced.
    pub baselines_updated: usize,
    /// Timestamp stamped on every snapshot of this roll.
    pub rolled_at: DateTime<FixedOffset>,
}

/// Converts cumulative counters into a delta time series.
///
/// Each run fetches every counter, inserts one history row per counter and only
/// then advances the baselines. A run that fails after the insert leaves the
/// baselines behind, so the next run records the full increment since the last
/// advanced baseline.
///
/// The roller does not guard against concurrent runs; callers must serialize
/// them (see [`super::HistoryScheduler`]).
pub struct StatisticsHistoryRoller {
    storage: Arc<dyn StatisticsStorage>,
    span: Span,
}

impl StatisticsHistoryRoller {
    /// Create a roller logging under a `statistics_history` span.
    pub fn new(storage: Arc<dyn StatisticsStorage>) -> Self {
        Self::with_span(storage, info_span!("statistics_history"))
    }

    /// Create a roller logging under the given span.
    pub fn with_span(storage: Arc<dyn StatisticsStorage>, span: Span) -> Self {
        Self { storage, span }
    }

    /// Run one roll stamped with the current local time.
    pub async fn run(&self) -> Result<RollReport, HistoryError> {
        self.run_at(Local::now().fixed_offset()).await
    }

    /// Run one roll stamped with `rolled_at`.
    pub async fn run_at(
        &self,
        rolled_at: DateTime<FixedOffset>,
    ) -> Result<RollReport, HistoryError> {
        self.roll(rolled_at).instrument(self.span.clone()).await
    }

    async fn roll(&self, rolled_at: DateTime<FixedOffset>) -> Result<RollReport, HistoryError> {
        let _timer = metrics::timer_roll();

        let counters = self.storage.fetch_counters().await.map_err(|e| {
            warn!(error = %e, "Failed to fetch statistics");
            HistoryError::StorageUnavailable {
                reason: e.to_string(),
            }
        })?;

        let plan = RollPlan::build(&counters, rolled_at);
        for key in &plan.resets {
            warn!(key = %key, "Statistics counter went backwards, treating as reset");
        }
        metrics::add_counter_resets(plan.resets.len() as u64);

        if !plan.snapshots.is_empty() {
            self.storage
                .insert_snapshots(&plan.snapshots)
                .await
                .map_err(|e| {
                    warn!(error = %e, rows = plan.snapshots.len(), "Failed to insert statistics history");
                    HistoryError::StorageWriteFailed {
                        table: HISTORY_TABLE,
                        reason: e.to_string(),
                    }
                })?;
            metrics::add_snapshots_written(plan.snapshots.len() as u64);
        }

        if plan.baselines.is_empty() {
            debug!("No statistics baselines to advance");
        } else {
            self.storage
                .update_baselines(&plan.baselines)
                .await
                .map_err(|e| {
                    warn!(error = %e, keys = plan.baselines.len(), "Failed to advance statistics baselines");
                    HistoryError::StorageWriteFailed {
                        table: STATISTICS_TABLE,
                        reason: e.to_string(),
                    }
                })?;
        }

        let report = RollReport {
            counters: counters.len(),
            advanced: plan.advanced,
            unchanged: plan.unchanged,
            snapshots_written: plan.snapshots.len(),
            baselines_updated: plan.baselines.len(),
            resets: plan.resets,
            rolled_at,
        };

        info!(
            counters = report.counters,
            advanced = report.advanced,
            resets = report.resets.len(),
            "Statistics history rolled"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Counter, FailurePoint, MemoryStorage, StorageCall};
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    fn roller(storage: &MemoryStorage) -> StatisticsHistoryRoller {
        StatisticsHistoryRoller::new(Arc::new(storage.clone()))
    }

    #[tokio::test]
    async fn run_inserts_once_and_updates_once() {
        let storage = MemoryStorage::with_counters([
            Counter::new("PURGED", 0, 0)
                .with_description("Readings removed from the buffer by the purge process"),
            Counter::new("READINGS", 4, 0).with_description("Readings received by Fledge"),
        ]);

        let report = assert_ok!(roller(&storage).run().await);

        assert_eq!(
            storage.calls(),
            vec![StorageCall::Fetch, StorageCall::Insert(2), StorageCall::Update(1)]
        );
        assert_eq!(report.counters, 2);
        assert_eq!(report.snapshots_written, 2);
        assert_eq!(report.baselines_updated, 1);
    }

    #[tokio::test]
    async fn worked_scenario() {
        let storage = MemoryStorage::with_counters([Counter::new("READINGS", 100, 80)]);
        let roller = roller(&storage);

        roller.run().await.unwrap();
        assert_eq!(storage.history_for("READINGS")[0].delta, 20);
        assert_eq!(storage.counter("READINGS").unwrap().previous_value, 100);

        roller.run().await.unwrap();
        assert_eq!(storage.history_for("READINGS")[1].delta, 0);
        assert_eq!(
            storage.calls()[3..].to_vec(),
            vec![StorageCall::Fetch, StorageCall::Insert(1)]
        );

        storage.set_value("READINGS", 5);
        let report = roller.run().await.unwrap();
        assert_eq!(storage.history_for("READINGS")[2].delta, 5);
        assert_eq!(storage.counter("READINGS").unwrap().previous_value, 5);
        assert_eq!(report.resets, vec!["READINGS".to_string()]);
    }

    #[tokio::test]
    async fn fetch_failure_writes_nothing() {
        let storage = MemoryStorage::with_counters([Counter::new("READINGS", 10, 0)]);
        storage.set_failure(FailurePoint::Fetch, true);

        let err = assert_err!(roller(&storage).run().await);

        assert!(matches!(err, HistoryError::StorageUnavailable { .. }));
        assert_eq!(storage.calls(), vec![StorageCall::Fetch]);
        assert!(storage.history().is_empty());
        assert_eq!(storage.counter("READINGS").unwrap().previous_value, 0);
    }

    #[tokio::test]
    async fn insert_failure_leaves_baselines() {
        let storage = MemoryStorage::with_counters([Counter::new("READINGS", 10, 0)]);
        storage.set_failure(FailurePoint::Insert, true);

        let err = assert_err!(roller(&storage).run().await);

        assert!(matches!(
            err,
            HistoryError::StorageWriteFailed { table: HISTORY_TABLE, .. }
        ));
        assert_eq!(storage.calls(), vec![StorageCall::Fetch, StorageCall::Insert(1)]);
        assert_eq!(storage.counter("READINGS").unwrap().previous_value, 0);
    }

    #[tokio::test]
    async fn update_failure_is_recovered_by_next_run() {
        let storage = MemoryStorage::with_counters([Counter::new("READINGS", 10, 0)]);
        let roller = roller(&storage);

        storage.set_failure(FailurePoint::Update, true);
        let err = assert_err!(roller.run().await);
        assert!(matches!(
            err,
            HistoryError::StorageWriteFailed { table: STATISTICS_TABLE, .. }
        ));
        assert_eq!(storage.history_for("READINGS")[0].delta, 10);

        storage.set_failure(FailurePoint::Update, false);
        storage.set_value("READINGS", 15);
        roller.run().await.unwrap();

        // 10 from the first period plus 5 from the second.
        assert_eq!(storage.history_for("READINGS")[1].delta, 15);
        assert_eq!(storage.counter("READINGS").unwrap().previous_value, 15);
    }

    #[tokio::test]
    async fn empty_statistics_table_makes_no_writes() {
        let storage = MemoryStorage::new();

        let report = roller(&storage).run().await.unwrap();

        assert_eq!(report.counters, 0);
        assert_eq!(storage.calls(), vec![StorageCall::Fetch]);
    }

    #[tokio::test]
    async fn snapshots_share_the_roll_timestamp() {
        let storage = MemoryStorage::with_counters([
            Counter::new("A", 1, 0),
            Counter::new("B", 2, 0),
        ]);
        let rolled_at = DateTime::parse_from_rfc3339("2024-01-01T00:00:15+00:00").unwrap();

        let report = roller(&storage).run_at(rolled_at).await.unwrap();

        assert_eq!(report.rolled_at, rolled_at);
        assert!(storage.history().iter().all(|s| s.timestamp == rolled_at));
    }
}
