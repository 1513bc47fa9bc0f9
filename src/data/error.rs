//! Error types for time-series input
//!
//! [`DataError`] covers problems with the sampled curves themselves: empty
//! series, mismatched lengths, non-monotonic time axes and unreadable files.
//! Model construction propagates these via the [`From`] impl on
//! [`CompartmentError`](crate::CompartmentError).

use thiserror::Error;

/// Errors arising from time-series validation and file input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// A series without any samples
    #[error("Time series is empty")]
    EmptySeries,

    /// Array length mismatch between parallel input arrays
    #[error("Array length mismatch: {description}")]
    LengthMismatch {
        /// Description of which arrays mismatched and their lengths
        description: String,
    },

    /// Time values are not strictly increasing
    #[error("Invalid time sequence: time[{index}] does not increase")]
    NonIncreasingTime {
        /// Index of the first offending sample
        index: usize,
    },

    /// A NaN or infinite sample
    #[error("Non-finite value in {series} at index {index}")]
    NonFinite {
        /// Name of the series (`time`, `curve`, `aif`)
        series: &'static str,
        /// Index of the offending sample
        index: usize,
    },

    /// Error encountered when reading or writing delimited text
    #[error("CSV error: {0}")]
    Csv(String),

    /// A field that could not be parsed as a number
    #[error("Parse error on line {line}: '{value}' is not a number")]
    Parse {
        /// 1-based record number
        line: usize,
        /// The offending field
        value: String,
    },

    /// Wrong number of columns for the requested conversion
    #[error("Expected {expected} columns, found {found}")]
    ColumnCount {
        /// Number of columns present
        found: usize,
        /// Accepted column counts
        expected: &'static str,
    },
}
