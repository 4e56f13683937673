//! Ingestion pipeline
//!
//! Drives one run through `Idle -> Opening -> Streaming -> Verifying -> Done`,
//! or into `Failed` from any non-terminal state. Batches are handled strictly
//! one at a time: read, clean, write in a single sink transaction, then the
//! next. The first batch replaces the destination table; later batches append
//! and must carry the same columns.
//!
//! The source is opened before the sink, so a missing source never touches
//! the destination.

use indicatif::ProgressBar;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabload_common::Schema;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::cleaner::clean;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::report::{IngestionReport, Verification};
use crate::sink::{LoadState, SqliteSink, TableSink, WriteMode};
use crate::source::{BatchSource, CsvSource};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Opening,
    Streaming { batch_index: usize },
    Verifying,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Opening => write!(f, "opening"),
            PipelineState::Streaming { batch_index } => write!(f, "streaming (batch {})", batch_index),
            PipelineState::Verifying => write!(f, "verifying"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Failed => write!(f, "failed"),
        }
    }
}

/// A fatal error, with where it happened and what was done before it
#[derive(Debug)]
pub struct PipelineFailure {
    /// Zero-based batch being processed; `None` when the run failed before streaming
    pub batch_index: Option<usize>,
    pub error: IngestError,
    pub report: IngestionReport,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.batch_index {
            Some(index) => write!(f, "batch {}: {}", index, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

type StreamResult = std::result::Result<(), (IngestError, Option<usize>)>;

/// Streams a source into a destination table
pub struct IngestionPipeline {
    config: IngestConfig,
    state: PipelineState,
    run_id: String,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
}

impl IngestionPipeline {
    pub fn new(config: IngestConfig) -> Self {
        Self {
            config,
            state: PipelineState::Idle,
            run_id: String::new(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Stop between batches once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Advance `progress` by the rows of each committed batch
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Id of the current or most recent run; empty before the first run
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Load the configured CSV file into the configured SQLite database
    pub fn run(&mut self) -> std::result::Result<IngestionReport, PipelineFailure> {
        self.execute(
            |config| CsvSource::open(&config.source_path, config.batch_size),
            |config| {
                SqliteSink::open(
                    &config.sink_path,
                    Duration::from_millis(config.busy_timeout_ms),
                )
            },
        )
    }

    /// Load an already-open source into an already-open sink
    pub fn run_with<S, K>(
        &mut self,
        source: S,
        sink: &mut K,
    ) -> std::result::Result<IngestionReport, PipelineFailure>
    where
        S: BatchSource,
        K: TableSink + ?Sized,
    {
        self.execute(|_| Ok(source), |_| Ok(sink))
    }

    fn execute<S, K, OpenSource, OpenSink>(
        &mut self,
        open_source: OpenSource,
        open_sink: OpenSink,
    ) -> std::result::Result<IngestionReport, PipelineFailure>
    where
        S: BatchSource,
        K: TableSink,
        OpenSource: FnOnce(&IngestConfig) -> Result<S>,
        OpenSink: FnOnce(&IngestConfig) -> Result<K>,
    {
        let started = Instant::now();
        self.run_id = Uuid::new_v4().to_string();
        self.state = PipelineState::Idle;
        let mut report = IngestionReport::new(&self.run_id, &self.config.table_name);
        let span = info_span!("ingest", run_id = %self.run_id, table = %self.config.table_name);
        let _entered = span.enter();

        info!(
            run_id = %self.run_id,
            source = %self.config.source_path.display(),
            sink = %self.config.sink_path.display(),
            table = %self.config.table_name,
            batch_size = self.config.batch_size,
            rules = self.config.policy.len(),
            "Starting ingestion"
        );

        self.transition(PipelineState::Opening);

        let opened = self
            .config
            .validate()
            .and_then(|_| open_source(&self.config))
            .and_then(|source| Ok((source, open_sink(&self.config)?)));
        let (source, mut sink) = match opened {
            Ok(pair) => pair,
            Err(e) => return Err(self.fail::<K>(None, e, None, report, started)),
        };

        if let Err(e) = sink.claim_table(&self.config.table_name, &self.run_id, self.config.force) {
            return Err(self.fail::<K>(None, e, None, report, started));
        }

        if let Err((e, batch_index)) = self.stream(source, &mut sink, &mut report) {
            return Err(self.fail(Some(&mut sink), e, batch_index, report, started));
        }

        self.transition(PipelineState::Verifying);

        if report.batches_processed > 0 {
            match sink.count_rows(&self.config.table_name) {
                Ok(count) => report.verify(count),
                Err(e) => return Err(self.fail(Some(&mut sink), e, None, report, started)),
            }
        } else {
            warn!(table = %self.config.table_name, "Source produced no batches, table was not replaced");
        }

        if let Verification::Mismatch { expected, actual } = report.verification {
            warn!(
                table = %self.config.table_name,
                expected,
                actual,
                "Verification failed: table row count differs from rows written"
            );
        }

        // a table this run never wrote is not reported as a complete load
        let final_state = if report.batches_processed > 0 {
            LoadState::Complete
        } else {
            LoadState::Incomplete
        };
        if let Err(e) = sink.mark_load_state(&self.config.table_name, &self.run_id, final_state) {
            return Err(self.fail(Some(&mut sink), e, None, report, started));
        }

        report.elapsed_ms = elapsed_ms(started);
        self.transition(PipelineState::Done);
        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        info!(
            run_id = %self.run_id,
            batches = report.batches_processed,
            rows_read = report.rows_read,
            rows_written = report.rows_written,
            skipped_rules = report.skipped_rules.len(),
            elapsed_ms = report.elapsed_ms,
            "Ingestion complete"
        );

        Ok(report)
    }

    fn stream<S, K>(&mut self, mut source: S, sink: &mut K, report: &mut IngestionReport) -> StreamResult
    where
        S: BatchSource,
        K: TableSink,
    {
        let mut table_schema: Option<Arc<Schema>> = None;
        let mut batch_index = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!(batches = report.batches_processed, "Cancellation requested, stopping");
                return Err((
                    IngestError::Cancelled {
                        batches: report.batches_processed,
                    },
                    Some(batch_index),
                ));
            }

            let Some(next) = source.next() else {
                break;
            };
            self.transition(PipelineState::Streaming { batch_index });
            let at = |e: IngestError| (e, Some(batch_index));

            let batch = next.map_err(at)?;
            report.rows_read += batch.row_count() as u64;

            let outcome = clean(&batch, &self.config.policy).map_err(|e| at(e.into()))?;
            if !outcome.diagnostics.skipped_rules.is_empty() {
                info!(
                    batch_index,
                    skipped = outcome.diagnostics.skipped_rules.len(),
                    "Cleaning rules skipped for batch"
                );
            }
            report.absorb(outcome.diagnostics);
            let cleaned = outcome.batch;

            let mode = match &table_schema {
                None => WriteMode::Replace,
                Some(expected) => {
                    if !expected.same_columns(cleaned.schema()) {
                        return Err(at(IngestError::schema_mismatch(
                            &expected.column_names(),
                            &cleaned.column_names(),
                        )));
                    }
                    if **expected != **cleaned.schema() {
                        debug!(
                            batch_index,
                            table = %expected,
                            batch = %cleaned.schema(),
                            "Column types differ from the first batch"
                        );
                    }
                    WriteMode::Append
                }
            };

            let written = sink
                .write_batch(&self.config.table_name, &self.run_id, &cleaned, mode)
                .map_err(at)?;

            if table_schema.is_none() {
                info!(table = %self.config.table_name, schema = %cleaned.schema(), "Created table");
                table_schema = Some(Arc::clone(cleaned.schema()));
            }

            report.rows_written += written;
            report.batches_processed += 1;
            if let Some(pb) = &self.progress {
                pb.inc(written);
            }

            info!(
                batch_index,
                rows = written,
                total_rows = report.rows_written,
                "Batch committed"
            );

            batch_index += 1;
        }

        Ok(())
    }

    fn fail<K: TableSink>(
        &mut self,
        sink: Option<&mut K>,
        error: IngestError,
        batch_index: Option<usize>,
        mut report: IngestionReport,
        started: Instant,
    ) -> PipelineFailure {
        if let Some(sink) = sink {
            if let Err(mark_err) =
                sink.mark_load_state(&self.config.table_name, &self.run_id, LoadState::Incomplete)
            {
                warn!(error = %mark_err, "Could not flag table as incomplete");
            }
        }

        report.elapsed_ms = elapsed_ms(started);
        self.transition(PipelineState::Failed);
        if let Some(pb) = &self.progress {
            pb.abandon();
        }

        error!(
            run_id = %self.run_id,
            kind = error.kind(),
            batch_index = ?batch_index,
            batches_committed = report.batches_processed,
            error = %error,
            "Ingestion failed"
        );

        PipelineFailure {
            batch_index,
            error,
            report,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "Pipeline state change");
        self.state = next;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
