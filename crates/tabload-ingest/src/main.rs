//! tabload - CSV to SQLite loader

use clap::Parser;
use std::process;
use tabload_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use tabload_ingest::{Cli, Commands};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Verbose mode logs debug events to the console; otherwise warnings only
    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        })
        .output(LogOutput::Console)
        .log_file_prefix("tabload")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let guard = init_logging(&log_config).ok();

    let result = match cli.command {
        Commands::Load(args) => tabload_ingest::commands::load::run(args).await,
        Commands::Status { sink, table, json } => {
            tabload_ingest::commands::status::run(sink, table, json).await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        drop(guard);
        process::exit(1);
    }
}
