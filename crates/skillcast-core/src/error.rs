//! Engine error types.
//!
//! These represent failures of the scoring and forecasting engine itself.
//! Aggregations never produce them for empty or zero-maximum input; "no data"
//! is a valid state, not an error.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by validation, series filtering and forecasting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A raw score was missing, negative, non-numeric, or violated the maxima policy.
    #[error("invalid score for {field}: {reason}")]
    InvalidScore { field: String, reason: String },

    /// A forecast was requested without at least two distinct-date points.
    #[error("not enough history: {points} assessment(s) on {distinct_dates} distinct date(s), need at least 2 dates")]
    InsufficientData { points: usize, distinct_dates: usize },

    /// The numerical trend fit did not produce a usable model.
    #[error("forecast fit failed: {0}")]
    FitFailure(String),

    /// A date filter was given a start after its end.
    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

impl EngineError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidScore {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` if the caller can fix this by correcting its input
    /// (re-prompting for scores or choosing another range).
    pub fn is_recoverable_by_input(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidScore { .. } | EngineError::InvalidDateRange { .. }
        )
    }

    /// Returns `true` if this error means "no forecast available" rather than a failure.
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, EngineError::InsufficientData { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let err = EngineError::invalid("fractions.achieved", "must not be negative");
        assert_eq!(
            err.to_string(),
            "invalid score for fractions.achieved: must not be negative"
        );

        let err = EngineError::InsufficientData {
            points: 1,
            distinct_dates: 1,
        };
        assert!(err.to_string().starts_with("not enough history"));
    }

    #[test]
    fn classification() {
        assert!(EngineError::invalid("x", "y").is_recoverable_by_input());
        assert!(!EngineError::FitFailure("nan".into()).is_recoverable_by_input());
        assert!(EngineError::InsufficientData {
            points: 0,
            distinct_dates: 0
        }
        .is_insufficient_data());
    }
}
