//! Error types for the batch data model

use thiserror::Error;

/// Result type alias for data model operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while constructing schemas and batches
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Row {row} has {actual} fields, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),
}
