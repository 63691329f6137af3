//! Error types for forecasting operations.
//!
//! This module defines [`ForecastError`] which covers every failure the
//! pipeline can surface: missing sales history, short series, solver failures
//! and storage contention.

use thiserror::Error;

use crate::period::PeriodType;
use crate::types::ItemId;

/// Errors that can occur while preparing data, fitting models or persisting results.
#[derive(Error, Debug)]
pub enum ForecastError {
    /// No raw sales events exist for the item under any status or date relaxation.
    #[error("No sales data found for item {item}")]
    Data {
        /// The item that has no history.
        item: ItemId,
    },

    /// The aggregated series is shorter than the period-specific minimum.
    #[error("Insufficient {period} data points. Need at least {required}, got {actual}")]
    InsufficientData {
        /// Period granularity of the series.
        period: PeriodType,
        /// Minimum number of points required.
        required: usize,
        /// Number of points actually available.
        actual: usize,
    },

    /// The numerical solver failed while fitting a model.
    #[error("Model fit failed: {0}")]
    ModelFit(String),

    /// The store stayed locked after every retry attempt.
    #[error("Storage contention after {attempts} attempts: {message}")]
    StorageContention {
        /// Number of attempts made.
        attempts: u32,
        /// Last error reported by the store.
        message: String,
    },

    /// The store is temporarily locked or busy. Retryable.
    #[error("Store busy: {0}")]
    StoreBusy(String),

    /// Any other storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A referenced record or item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A best-forecast search produced no usable candidate.
    #[error("No viable forecast candidate: {0}")]
    NoViableCandidate(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error parsing stored or configured data.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error while grouping raw events into periods.
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl ForecastError {
    /// Returns true if the error is a transient lock/busy condition worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreBusy(_))
    }
}

/// Result type alias using [`ForecastError`].
pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_busy_is_transient() {
        assert!(ForecastError::StoreBusy("database is locked".into()).is_transient());
        assert!(!ForecastError::Storage("disk I/O error".into()).is_transient());
        assert!(!ForecastError::ModelFit("singular".into()).is_transient());
    }

    #[test]
    fn test_insufficient_data_message() {
        let err = ForecastError::InsufficientData {
            period: PeriodType::Weekly,
            required: 12,
            actual: 11,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient weekly data points. Need at least 12, got 11"
        );
    }
}
