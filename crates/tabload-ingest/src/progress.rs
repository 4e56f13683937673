//! Progress indicators for the CLI
//!
//! The source length is unknown while streaming, so ingestion progress is a
//! running row counter rather than a bounded bar.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Create a row counter advanced once per committed batch
pub fn create_row_counter(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg} {human_pos} rows ({per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
