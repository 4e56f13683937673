//! `tabload load` command implementation
//!
//! Runs the pipeline on a blocking task. Ctrl+C cancels between batches.

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::HumanCount;
use std::io::IsTerminal;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::format_as_table;
use crate::config::IngestConfig;
use crate::pipeline::{IngestionPipeline, PipelineFailure};
use crate::progress::create_row_counter;
use crate::report::{IngestionReport, Verification};
use crate::sink::{SqliteSink, TablePreview};
use crate::LoadArgs;

/// Rows shown after a successful load
pub const PREVIEW_ROWS: usize = 5;

/// Resolve the configuration: defaults, config file, environment, then flags
pub fn resolve_config(args: &LoadArgs) -> Result<IngestConfig> {
    let mut config = IngestConfig::load(args.config.as_deref())?;

    if let Some(source) = &args.source {
        config.source_path = source.clone();
    }
    if let Some(sink) = &args.sink {
        config.sink_path = sink.clone();
    }
    if let Some(table) = &args.table {
        config.table_name = table.clone();
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if args.force {
        config.force = true;
    }

    config.validate()?;
    Ok(config)
}

/// Load the configured source into the sink and print the report
pub async fn run(args: LoadArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    let cancel = CancellationToken::new();

    let mut pipeline = IngestionPipeline::new(config.clone()).with_cancellation(cancel.clone());
    if !args.json && std::io::stderr().is_terminal() {
        pipeline = pipeline.with_progress(create_row_counter("Loading"));
    }

    let want_preview = !args.no_preview && !args.json;
    let task = tokio::task::spawn_blocking(move || {
        let result = pipeline.run();
        let preview = match &result {
            Ok(report) if want_preview && report.batches_processed > 0 => {
                fetch_preview(&config)
            }
            _ => None,
        };
        (result, preview)
    });

    let interrupt = tokio::spawn(cancel_on_ctrl_c(cancel));
    let (result, preview) = task.await.context("Ingestion task panicked")?;
    interrupt.abort();

    match result {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_summary(&report, preview.as_ref());
            }
            Ok(())
        }
        Err(failure) => {
            if args.json {
                println!("{}", failure_json(&failure)?);
            } else {
                eprintln!("{}", "Ingestion failed".red().bold());
                eprintln!("{}", failure.report);
            }
            Err(failure.into())
        }
    }
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Interrupt received, stopping after the current batch");
        eprintln!(
            "{}",
            "Interrupt received, finishing the current batch...".yellow()
        );
        token.cancel();
    }
}

fn fetch_preview(config: &IngestConfig) -> Option<TablePreview> {
    let preview = SqliteSink::open(
        &config.sink_path,
        Duration::from_millis(config.busy_timeout_ms),
    )
    .and_then(|sink| sink.preview(&config.table_name, PREVIEW_ROWS));

    match preview {
        Ok(preview) => Some(preview),
        Err(e) => {
            warn!(error = %e, "Could not read preview rows");
            None
        }
    }
}

fn print_summary(report: &IngestionReport, preview: Option<&TablePreview>) {
    println!(
        "{} Loaded {} rows into '{}' ({} batches)",
        "✓".green().bold(),
        HumanCount(report.rows_written),
        report.table_name,
        report.batches_processed
    );
    println!();
    println!("{}", report);

    if let Verification::Mismatch { expected, actual } = report.verification {
        println!();
        println!(
            "{} table '{}' has {} rows, expected {}",
            "WARNING: row count verification failed:".yellow().bold(),
            report.table_name,
            HumanCount(actual),
            HumanCount(expected)
        );
    }

    if let Some(preview) = preview {
        println!();
        let heading = format!("First {} rows:", PREVIEW_ROWS);
        println!("{}", heading.as_str().cyan().bold());
        print!("{}", format_as_table(preview));
    }
}

fn failure_json(failure: &PipelineFailure) -> Result<String> {
    let value = serde_json::json!({
        "error": failure.error.kind(),
        "message": failure.error.to_string(),
        "batch_index": failure.batch_index,
        "report": failure.report,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("tabload.toml");
        std::fs::write(
            &config_path,
            r#"
            source_path = "from_file.csv"
            sink_path = "from_file.db"
            table_name = "file_table"
            batch_size = 10
            "#,
        )
        .unwrap();

        let args = LoadArgs {
            config: Some(config_path),
            table: Some("flag_table".to_string()),
            ..LoadArgs::default()
        };

        let config = resolve_config(&args).unwrap();

        assert_eq!(config.source_path, PathBuf::from("from_file.csv"));
        assert_eq!(config.table_name, "flag_table");
        assert_eq!(config.batch_size, 10);
    }

    #[test]
    fn test_failure_json_carries_kind_and_partial_report() {
        let failure = PipelineFailure {
            batch_index: Some(2),
            error: crate::IngestError::sink_write("disk full"),
            report: IngestionReport::new("run", "t"),
        };

        let json: serde_json::Value = serde_json::from_str(&failure_json(&failure).unwrap()).unwrap();

        assert_eq!(json["error"], "sink_write_failure");
        assert_eq!(json["batch_index"], 2);
        assert_eq!(json["report"]["table_name"], "t");
    }
}
