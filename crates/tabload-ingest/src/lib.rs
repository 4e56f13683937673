//! Tabload Ingest Library
//!
//! Streams a comma-delimited file into a SQLite table in bounded batches,
//! cleaning each batch with a declarative policy on the way.
//!
//! # Overview
//!
//! - **Source**: [`source::CsvSource`] yields batches of at most `batch_size` rows
//! - **Cleaning**: [`cleaner::clean`] applies a [`cleaner::CleaningPolicy`] to one batch
//! - **Sink**: [`sink::SqliteSink`] writes each batch in its own transaction
//! - **Pipeline**: [`pipeline::IngestionPipeline`] drives the run and produces an
//!   [`report::IngestionReport`]
//!
//! # Example
//!
//! ```no_run
//! use tabload_ingest::cleaner::{CleaningPolicy, CleaningRule};
//! use tabload_ingest::{IngestConfig, IngestionPipeline};
//!
//! let policy = CleaningPolicy::new(vec![
//!     CleaningRule::rename("old_column_1", "new_column_1"),
//!     CleaningRule::impute_median("numeric_column"),
//!     CleaningRule::impute_unknown("new_column_2"),
//!     CleaningRule::coerce_datetime("date_column", None),
//! ]);
//! let config = IngestConfig::new("data/raw/data.csv", "data/processed/analytics.db")
//!     .with_policy(policy);
//!
//! match IngestionPipeline::new(config).run() {
//!     Ok(report) => println!("{}", report),
//!     Err(failure) => eprintln!("{}", failure),
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod cleaner;
pub mod commands;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod sink;
pub mod source;

// Re-export commonly used types
pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use pipeline::{IngestionPipeline, PipelineFailure, PipelineState};
pub use report::{IngestionReport, Verification};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// tabload - stream CSV files into SQLite
#[derive(Parser, Debug)]
#[command(name = "tabload")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a CSV file into a SQLite table
    Load(LoadArgs),

    /// Show the load state of a table
    Status {
        /// SQLite database file
        #[arg(long)]
        sink: PathBuf,

        /// Table name
        #[arg(short, long, default_value = config::DEFAULT_TABLE_NAME)]
        table: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Arguments of `tabload load`; flags override the config file and environment
#[derive(Args, Debug, Clone, Default)]
pub struct LoadArgs {
    /// CSV file to load
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// SQLite database file (created if missing)
    #[arg(long)]
    pub sink: Option<PathBuf>,

    /// Destination table [default: analytics_data]
    #[arg(short, long)]
    pub table: Option<String>,

    /// Rows per batch [default: 100000]
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// TOML config file with paths and cleaning rules
    #[arg(short, long, env = "TABLOAD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Take over a table left in loading state by another run
    #[arg(short, long)]
    pub force: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Skip the preview of the first loaded rows
    #[arg(long)]
    pub no_preview: bool,
}
