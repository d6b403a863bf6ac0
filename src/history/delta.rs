//! Delta computation for one roll.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use strum::Display;

use crate::storage::{BaselineUpdate, Counter, HistorySnapshot};

/// How a counter moved since its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RollOutcome {
    /// Value grew past the baseline.
    Advanced,
    /// Value equals the baseline.
    Unchanged,
    /// Value dropped below the baseline; the counter restarted from zero.
    Reset,
}

/// Delta and baseline decision for one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDelta {
    /// Classification.
    pub outcome: RollOutcome,
    /// Increment to record. Never negative.
    pub delta: u64,
    /// New baseline to write, if any.
    pub baseline: Option<u64>,
}

/// Compute the delta between a counter's value and its baseline.
pub fn compute_delta(value: u64, previous_value: u64) -> CounterDelta {
    match value.checked_sub(previous_value) {
        Some(0) => CounterDelta {
            outcome: RollOutcome::Unchanged,
            delta: 0,
            baseline: None,
        },
        Some(delta) => CounterDelta {
            outcome: RollOutcome::Advanced,
            delta,
            baseline: Some(value),
        },
        None => CounterDelta {
            outcome: RollOutcome::Reset,
            delta: value,
            baseline: Some(value),
        },
    }
}

/// Writes to perform for one roll.
#[derive(Debug, Clone, Default)]
pub struct RollPlan {
    /// One snapshot per fetched counter.
    pub snapshots: Vec<HistorySnapshot>,
    /// Baselines to advance after the snapshots land.
    pub baselines: Vec<BaselineUpdate>,
    /// Counters that advanced.
    pub advanced: usize,
    /// Counters that did not move.
    pub unchanged: usize,
    /// Keys of counters found reset.
    pub resets: Vec<String>,
}

impl RollPlan {
    /// Plan a roll over `counters` stamped with `rolled_at`.
    pub fn build(counters: &[Counter], rolled_at: DateTime<FixedOffset>) -> Self {
        let mut plan = Self {
            snapshots: Vec::with_capacity(counters.len()),
            ..Self::default()
        };

        for counter in counters {
            let delta = compute_delta(counter.value, counter.previous_value);

            plan.snapshots.push(HistorySnapshot {
                key: counter.key.clone(),
                delta: delta.delta,
                timestamp: rolled_at,
            });

            if let Some(previous_value) = delta.baseline {
                plan.baselines.push(BaselineUpdate {
                    key: counter.key.clone(),
                    previous_value,
                });
            }

            match delta.outcome {
                RollOutcome::Advanced => plan.advanced += 1,
                RollOutcome::Unchanged => plan.unchanged += 1,
                RollOutcome::Reset => plan.resets.push(counter.key.clone()),
            }
        }

        plan
    }
}
