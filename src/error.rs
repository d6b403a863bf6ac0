//! Unified error types for the statistics history service.

use thiserror::Error;

/// Top-level error type for the service binary and wiring code.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Statistics history roll error.
    #[error("history error: {0}")]
    History(#[from] HistoryError),

    /// Storage backend error outside of a roll.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by a statistics history roll.
#[derive(Error, Debug)]
pub enum HistoryError {
    /// Counters could not be read. Nothing was written.
    #[error("storage unavailable: {reason}")]
    StorageUnavailable {
        /// Why the fetch failed.
        reason: String,
    },

    /// A snapshot insert or baseline update batch did not complete.
    #[error("write to {table} failed: {reason}")]
    StorageWriteFailed {
        /// Table the batch targeted.
        table: &'static str,
        /// Why the write failed.
        reason: String,
    },

    /// Another roll is still running against the same storage.
    #[error("a statistics history roll is already in progress")]
    RollInProgress,
}

impl HistoryError {
    /// Whether the error left storage untouched for this run.
    pub fn is_side_effect_free(&self) -> bool {
        match self {
            HistoryError::StorageUnavailable { .. } | HistoryError::RollInProgress => true,
            HistoryError::StorageWriteFailed { table, .. } => *table == crate::storage::HISTORY_TABLE,
        }
    }
}

/// Storage backend errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// HTTP transport failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Storage service answered with a non-success status.
    #[error("storage service returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message reported by the storage service, if any.
        message: String,
    },

    /// Storage endpoint URL could not be built.
    #[error("invalid storage url: {0}")]
    Url(#[from] url::ParseError),

    /// Response body could not be decoded.
    #[error("failed to decode storage response: {0}")]
    Decode(String),

    /// Failure injected by a test backend.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_effect_free_classification() {
        let fetch = HistoryError::StorageUnavailable {
            reason: "down".to_string(),
        };
        assert!(fetch.is_side_effect_free());

        let insert = HistoryError::StorageWriteFailed {
            table: crate::storage::HISTORY_TABLE,
            reason: "rejected".to_string(),
        };
        assert!(insert.is_side_effect_free());

        let update = HistoryError::StorageWriteFailed {
            table: crate::storage::STATISTICS_TABLE,
            reason: "rejected".to_string(),
        };
        assert!(!update.is_side_effect_free());
    }

    #[test]
    fn storage_status_display() {
        let err = StorageError::Status {
            status: 400,
            message: "bad payload".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "storage service returned HTTP 400: bad payload"
        );
    }
}
