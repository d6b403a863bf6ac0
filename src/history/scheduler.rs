//! Periodic, single-flight invocation of the roller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, instrument};

use crate::error::HistoryError;
use crate::metrics;

use super::roller::{RollReport, StatisticsHistoryRoller};

/// Result of the most recent roll.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RollOutcomeStatus {
    /// The roll completed.
    Succeeded {
        /// Roll summary.
        report: RollReport,
    },
    /// The roll stopped at a storage failure.
    Failed {
        /// Error text.
        error: String,
    },
}

/// Timing and outcome of the most recent roll.
#[derive(Debug, Clone, Serialize)]
pub struct RollStatus {
    /// When the roll started.
    pub started_at: DateTime<Local>,
    /// When the roll finished.
    pub finished_at: DateTime<Local>,
    /// What happened.
    #[serde(flatten)]
    pub outcome: RollOutcomeStatus,
}

/// Runs the roller on a fixed interval, one roll at a time.
#[derive(Clone)]
pub struct HistoryScheduler {
    roller: Arc<StatisticsHistoryRoller>,
    interval: Duration,
    in_flight: Arc<Mutex<()>>,
    last_status: Arc<RwLock<Option<RollStatus>>>,
}

impl HistoryScheduler {
    /// Create a scheduler rolling every `interval`.
    pub fn new(roller: StatisticsHistoryRoller, interval: Duration) -> Self {
        Self {
            roller: Arc::new(roller),
            interval,
            in_flight: Arc::new(Mutex::new(())),
            last_status: Arc::new(RwLock::new(None)),
        }
    }

    /// Interval between scheduled rolls.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Status of the most recent roll, if any ran.
    pub async fn last_status(&self) -> Option<RollStatus> {
        self.last_status.read().await.clone()
    }

    /// Run one roll now, unless one is already running.
    pub async fn trigger(&self) -> Result<RollReport, HistoryError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| HistoryError::RollInProgress)?;

        let started_at = Local::now();
        let result = self.roller.run().await;
        let finished_at = Local::now();

        let outcome = match &result {
            Ok(report) => {
                metrics::inc_rolls();
                RollOutcomeStatus::Succeeded {
                    report: report.clone(),
                }
            }
            Err(e) => {
                metrics::inc_roll_failures();
                error!(error = %e, "Statistics history roll failed");
                RollOutcomeStatus::Failed {
                    error: e.to_string(),
                }
            }
        };

        *self.last_status.write().await = Some(RollStatus {
            started_at,
            finished_at,
            outcome,
        });

        result
    }

    /// Roll every interval until `shutdown` turns true.
    ///
    /// The first roll happens one full interval after start. A failed roll is
    /// retried only by the next tick.
    #[instrument(skip(self, shutdown), fields(interval_s = self.interval.as_secs()))]
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Statistics history scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(HistoryError::RollInProgress) = self.trigger().await {
                        info!("Skipping scheduled roll, previous roll still running");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Statistics history scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Counter, FailurePoint, MemoryStorage};

    fn scheduler(storage: &MemoryStorage, interval: Duration) -> HistoryScheduler {
        HistoryScheduler::new(
            StatisticsHistoryRoller::new(Arc::new(storage.clone())),
            interval,
        )
    }

    #[test]
    fn interval_is_kept_from_construction() {
        let scheduler = scheduler(&MemoryStorage::new(), Duration::from_secs(30));
        assert_eq!(scheduler.interval(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn trigger_records_success() {
        let storage = MemoryStorage::with_counters([Counter::new("READINGS", 3, 1)]);
        let scheduler = scheduler(&storage, Duration::from_secs(15));
        assert!(scheduler.last_status().await.is_none());

        scheduler.trigger().await.unwrap();

        let status = scheduler.last_status().await.unwrap();
        match status.outcome {
            RollOutcomeStatus::Succeeded { report } => assert_eq!(report.advanced, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(status.finished_at >= status.started_at);
    }

    #[tokio::test]
    async fn trigger_records_failure() {
        let storage = MemoryStorage::new();
        storage.set_failure(FailurePoint::Fetch, true);
        let scheduler = scheduler(&storage, Duration::from_secs(15));

        assert!(scheduler.trigger().await.is_err());

        let status = scheduler.last_status().await.unwrap();
        assert!(matches!(status.outcome, RollOutcomeStatus::Failed { .. }));
    }

    #[tokio::test]
    async fn overlapping_trigger_is_rejected() {
        let storage = MemoryStorage::new();
        let scheduler = scheduler(&storage, Duration::from_secs(15));

        let _held = scheduler.in_flight.try_lock().unwrap();
        let result = scheduler.trigger().await;

        assert!(matches!(result, Err(HistoryError::RollInProgress)));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_until_rolls_each_interval_and_stops() {
        let storage = MemoryStorage::with_counters([Counter::new("READINGS", 1, 0)]);
        let scheduler = scheduler(&storage, Duration::from_secs(15));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(scheduler.clone().run_until(rx));

        tokio::time::sleep(Duration::from_secs(31)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(storage.history_for("READINGS").len(), 2);
    }

    #[test]
    fn status_serializes_flat() {
        let status = RollStatus {
            started_at: Local::now(),
            finished_at: Local::now(),
            outcome: RollOutcomeStatus::Failed {
                error: "storage unavailable: down".to_string(),
            },
        };

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "storage unavailable: down");
    }
}
