//! Error types for the ingestion pipeline
//!
//! Every fatal kind aborts the run. Messages are user-facing and say what to
//! check next. Non-fatal outcomes (a verification mismatch, a skipped cleaning
//! rule) are carried in the report instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Source file is missing or unreadable; raised before the sink is touched
    #[error("Source not found: '{}': {reason}. Verify the path exists and is readable.", path.display())]
    SourceNotFound { path: PathBuf, reason: String },

    /// Source became unreadable or malformed mid-stream
    #[error("Failed to read batch from source: {0}. Earlier batches remain loaded; fix the file and re-run.")]
    BatchReadFailure(String),

    /// A later batch disagrees with the table created from the first batch
    #[error("Schema mismatch: table has columns [{}], batch has [{}]. Earlier batches remain loaded.", expected.join(", "), actual.join(", "))]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// The batch transaction failed and was rolled back
    #[error("Sink write failed: {0}. The failing batch was rolled back; earlier batches remain loaded.")]
    SinkWriteFailure(String),

    /// Another run holds the destination table
    #[error("Table '{table}' is being loaded by run {run_id}. Wait for it to finish, or pass --force if that run is dead.")]
    ConcurrentRun { table: String, run_id: String },

    /// Stopped between batches on request
    #[error("Ingestion cancelled after {batches} committed batch(es); the table is flagged incomplete.")]
    Cancelled { batches: usize },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check your flags, config file, or TABLOAD_* environment variables.")]
    Config(String),
}

impl IngestError {
    pub fn source_not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn batch_read(msg: impl Into<String>) -> Self {
        Self::BatchReadFailure(msg.into())
    }

    pub fn sink_write(msg: impl Into<String>) -> Self {
        Self::SinkWriteFailure(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn schema_mismatch(expected: &[&str], actual: &[&str]) -> Self {
        Self::SchemaMismatch {
            expected: expected.iter().map(|s| s.to_string()).collect(),
            actual: actual.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Short stable name of the error kind, used in logs and JSON reports
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::SourceNotFound { .. } => "source_not_found",
            IngestError::BatchReadFailure(_) => "batch_read_failure",
            IngestError::SchemaMismatch { .. } => "schema_mismatch",
            IngestError::SinkWriteFailure(_) => "sink_write_failure",
            IngestError::ConcurrentRun { .. } => "concurrent_run",
            IngestError::Cancelled { .. } => "cancelled",
            IngestError::Config(_) => "config",
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        Self::SinkWriteFailure(err.to_string())
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        Self::BatchReadFailure(err.to_string())
    }
}

impl From<tabload_common::Error> for IngestError {
    fn from(err: tabload_common::Error) -> Self {
        Self::BatchReadFailure(err.to_string())
    }
}
