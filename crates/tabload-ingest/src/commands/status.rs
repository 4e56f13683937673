//! `tabload status` command implementation
//!
//! Shows the load bookkeeping of a table and its live row count.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::HumanCount;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::DEFAULT_BUSY_TIMEOUT_MS;
use crate::sink::{LoadState, LoadStatus, SqliteSink, TableSink};

/// Everything `status` knows about one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStatus {
    pub table_name: String,
    pub load: Option<LoadStatus>,
    /// `None` when the table does not exist
    pub row_count: Option<u64>,
}

/// Read the status of `table` in the database at `sink`
pub fn inspect(sink: &Path, table: &str) -> Result<TableStatus> {
    if !sink.is_file() {
        bail!(
            "Sink database '{}' does not exist. Run 'tabload load' first.",
            sink.display()
        );
    }

    let sink =
        SqliteSink::open_read_only(sink, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    let load = sink.load_status(table)?;
    let row_count = if sink.table_exists(table)? {
        Some(sink.count_rows(table)?)
    } else {
        None
    };

    Ok(TableStatus {
        table_name: table.to_string(),
        load,
        row_count,
    })
}

/// Print the status of `table`
pub async fn run(sink: PathBuf, table: String, json: bool) -> Result<()> {
    let status = tokio::task::spawn_blocking(move || inspect(&sink, &table))
        .await
        .context("Status task panicked")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} {}", "Table:".cyan().bold(), status.table_name);

    match &status.load {
        None => {
            println!("  No load recorded for this table.");
        }
        Some(load) => {
            let state = match load.state {
                LoadState::Complete => load.state.as_str().green(),
                LoadState::Loading => load.state.as_str().yellow(),
                LoadState::Incomplete => load.state.as_str().red(),
            };
            println!("  State:    {}", state);
            println!("  Run:      {}", load.run_id);
            println!("  Batches:  {}", load.batches);
            println!("  Rows:     {}", HumanCount(load.rows));
            println!("  Started:  {}", load.started_at);
            println!("  Updated:  {}", load.updated_at);
        }
    }

    match status.row_count {
        Some(count) => println!("  In table: {}", HumanCount(count)),
        None => println!("  Table does not exist."),
    }

    Ok(())
}
