//! Destination sinks
//!
//! A [`TableSink`] owns one destination table per run. Every batch write is a
//! single transaction: either all of its rows become visible or none do.
//! Load bookkeeping (owner run, state, counts) lives next to the data so a
//! half-loaded table is distinguishable from a complete one.

mod sqlite;

pub use sqlite::{SqliteSink, TablePreview};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tabload_common::Batch;

use crate::error::{IngestError, Result};

/// Name of the bookkeeping table maintained by every sink
pub const RUNS_TABLE: &str = "_tabload_runs";

/// How a batch is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Drop and recreate the table from the batch schema, then insert
    Replace,
    /// Insert into the existing table
    Append,
}

/// Completeness flag of a destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Loading,
    Complete,
    Incomplete,
}

impl LoadState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadState::Loading => "loading",
            LoadState::Complete => "complete",
            LoadState::Incomplete => "incomplete",
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadState {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "loading" => Ok(LoadState::Loading),
            "complete" => Ok(LoadState::Complete),
            "incomplete" => Ok(LoadState::Incomplete),
            other => Err(IngestError::sink_write(format!(
                "unknown load state '{}' in {}",
                other, RUNS_TABLE
            ))),
        }
    }
}

/// Bookkeeping row for one destination table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadStatus {
    pub table_name: String,
    pub run_id: String,
    pub state: LoadState,
    pub batches: u64,
    pub rows: u64,
    pub started_at: String,
    pub updated_at: String,
}

/// A relational destination the pipeline writes batches into
pub trait TableSink {
    /// Register `run_id` as the sole writer of `table`.
    ///
    /// Fails with `ConcurrentRun` when another run still has the table in
    /// `loading` state, unless `force` is set.
    fn claim_table(&mut self, table: &str, run_id: &str, force: bool) -> Result<()>;

    /// Write one batch atomically; returns the number of rows committed
    fn write_batch(
        &mut self,
        table: &str,
        run_id: &str,
        batch: &Batch,
        mode: WriteMode,
    ) -> Result<u64>;

    /// Committed row count of `table`
    fn count_rows(&self, table: &str) -> Result<u64>;

    fn mark_load_state(&mut self, table: &str, run_id: &str, state: LoadState) -> Result<()>;
}

impl<T: TableSink + ?Sized> TableSink for &mut T {
    fn claim_table(&mut self, table: &str, run_id: &str, force: bool) -> Result<()> {
        (**self).claim_table(table, run_id, force)
    }

    fn write_batch(
        &mut self,
        table: &str,
        run_id: &str,
        batch: &Batch,
        mode: WriteMode,
    ) -> Result<u64> {
        (**self).write_batch(table, run_id, batch, mode)
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        (**self).count_rows(table)
    }

    fn mark_load_state(&mut self, table: &str, run_id: &str, state: LoadState) -> Result<()> {
        (**self).mark_load_state(table, run_id, state)
    }
}
