//! Statistics data model and the storage service wire format.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Timestamp layout used by the Fledge storage service.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

/// A named cumulative statistics counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    /// Unique counter key, e.g. `READINGS`.
    pub key: String,
    /// Current cumulative total.
    pub value: u64,
    /// Cumulative total as of the last successful roll.
    pub previous_value: u64,
    /// Human-readable label.
    pub description: String,
    /// When `value` was last observed.
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl Counter {
    /// Create a counter with no description or timestamp.
    pub fn new(key: impl Into<String>, value: u64, previous_value: u64) -> Self {
        Self {
            key: key.into(),
            value,
            previous_value,
            description: String::new(),
            timestamp: None,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// One delta observation destined for `statistics_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistorySnapshot {
    /// Counter key.
    pub key: String,
    /// Increment since the previous baseline.
    pub delta: u64,
    /// Roll time.
    pub timestamp: DateTime<FixedOffset>,
}

/// New `previous_value` for one counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaselineUpdate {
    /// Counter key, matched by equality.
    pub key: String,
    /// Value to store as `previous_value`.
    pub previous_value: u64,
}

/// Format a timestamp the way the storage service stores them.
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a storage service timestamp. Accepts offsets with or without minutes.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z")
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

// === Wire format ===

/// Result of a table query.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResult<T> {
    /// Number of rows returned.
    #[serde(default)]
    pub count: usize,
    /// Returned rows.
    pub rows: Vec<T>,
}

/// One row of the `statistics` table.
#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsRow {
    /// Counter key.
    pub key: String,
    /// Description text.
    #[serde(default)]
    pub description: Option<String>,
    /// Current value.
    pub value: u64,
    /// Baseline from the last roll.
    pub previous_value: u64,
    /// Last update time.
    #[serde(default)]
    pub ts: Option<String>,
}

impl From<StatisticsRow> for Counter {
    fn from(row: StatisticsRow) -> Self {
        Self {
            timestamp: row.ts.as_deref().and_then(parse_timestamp),
            key: row.key,
            value: row.value,
            previous_value: row.previous_value,
            description: row.description.unwrap_or_default(),
        }
    }
}

/// Bulk insert body for `statistics_history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsertPayload {
    /// Rows to insert.
    pub inserts: Vec<HistoryRow>,
}

/// One `statistics_history` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryRow {
    /// Counter key.
    pub key: String,
    /// Delta for this period.
    pub value: u64,
    /// Roll time.
    pub history_ts: String,
}

impl From<&HistorySnapshot> for HistoryRow {
    fn from(snapshot: &HistorySnapshot) -> Self {
        Self {
            key: snapshot.key.clone(),
            value: snapshot.delta,
            history_ts: format_timestamp(&snapshot.timestamp),
        }
    }
}

impl InsertPayload {
    /// Build an insert body from snapshots.
    pub fn from_snapshots(snapshots: &[HistorySnapshot]) -> Self {
        Self {
            inserts: snapshots.iter().map(HistoryRow::from).collect(),
        }
    }
}

/// Bulk update body for `statistics`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatePayload {
    /// Individual updates.
    pub updates: Vec<UpdateEntry>,
}

/// One conditional update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateEntry {
    /// Row selector.
    #[serde(rename = "where")]
    pub condition: WhereClause,
    /// Columns to set.
    pub values: PreviousValue,
}

/// `column condition value` selector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhereClause {
    /// Column name.
    pub column: String,
    /// Comparison operator.
    pub condition: String,
    /// Value to compare against.
    pub value: String,
}

impl WhereClause {
    /// `column = value`.
    pub fn equals(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            condition: "=".to_string(),
            value: value.into(),
        }
    }
}

/// Column set for a baseline update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviousValue {
    /// New baseline.
    pub previous_value: u64,
}

impl UpdatePayload {
    /// Build an update body from baseline updates, one `key = ...` match each.
    pub fn from_baselines(baselines: &[BaselineUpdate]) -> Self {
        Self {
            updates: baselines
                .iter()
                .map(|b| UpdateEntry {
                    condition: WhereClause::equals("key", b.key.clone()),
                    values: PreviousValue {
                        previous_value: b.previous_value,
                    },
                })
                .collect(),
        }
    }
}

/// Error body returned by the storage service.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageMessage {
    /// Error message.
    pub message: String,
}
