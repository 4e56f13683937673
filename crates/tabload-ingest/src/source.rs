//! Batch sources
//!
//! A source is a forward-only cursor over bounded batches. It is consumed once;
//! nothing is buffered beyond the batch currently being built.

use csv::{Reader, ReaderBuilder, StringRecord};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use tabload_common::Batch;
use tracing::{debug, info};

use crate::error::{IngestError, Result};

/// Anything that yields batches in order.
///
/// Implemented for every iterator of `Result<Batch>`, so in-memory sources are
/// plain iterators.
pub trait BatchSource: Iterator<Item = Result<Batch>> {}

impl<T> BatchSource for T where T: Iterator<Item = Result<Batch>> {}

/// Comma-delimited text file with a header row
pub struct CsvSource {
    path: PathBuf,
    reader: Reader<File>,
    headers: Vec<String>,
    batch_size: usize,
    record: StringRecord,
    rows_read: u64,
    batches: usize,
    done: bool,
}

impl CsvSource {
    /// Open `path` and read its header row.
    ///
    /// A missing or unreadable file is `SourceNotFound`; a file without a
    /// header row is a `BatchReadFailure`.
    pub fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path)
            .map_err(|e| IngestError::source_not_found(path, e.to_string()))?;
        if !metadata.is_file() {
            return Err(IngestError::source_not_found(path, "not a regular file"));
        }

        let file =
            File::open(path).map_err(|e| IngestError::source_not_found(path, e.to_string()))?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let raw_headers = reader.headers()?.clone();
        if raw_headers.is_empty() {
            return Err(IngestError::batch_read(format!(
                "'{}' has no header row",
                path.display()
            )));
        }
        let headers = normalize_headers(&raw_headers);

        info!(
            path = %path.display(),
            columns = headers.len(),
            batch_size,
            "Opened CSV source"
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            headers,
            batch_size: batch_size.max(1),
            record: StringRecord::new(),
            rows_read: 0,
            batches: 0,
            done: false,
        })
    }

    /// Data rows read so far
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn read_batch(&mut self) -> Result<Option<Batch>> {
        let mut rows = Vec::with_capacity(self.batch_size.min(8_192));

        while rows.len() < self.batch_size {
            if !self.reader.read_record(&mut self.record)? {
                self.done = true;
                break;
            }
            rows.push(self.widen_record()?);
        }

        if rows.is_empty() {
            if self.batches > 0 {
                return Ok(None);
            }
            // header-only file: one empty batch so the table is still replaced
            self.batches += 1;
            debug!(columns = self.headers.len(), "Source has no data rows");
            return Ok(Some(Batch::from_text_rows(&self.headers, rows)?));
        }

        self.rows_read += rows.len() as u64;
        self.batches += 1;
        debug!(
            batch = self.batches,
            rows = rows.len(),
            total_rows = self.rows_read,
            "Read batch"
        );

        Ok(Some(Batch::from_text_rows(&self.headers, rows)?))
    }

    /// Current record as one cell per header. Missing trailing fields become
    /// empty cells; extra fields are an error.
    fn widen_record(&self) -> Result<Vec<String>> {
        let width = self.headers.len();
        if self.record.len() > width {
            let line = self.record.position().map(|p| p.line()).unwrap_or(0);
            return Err(IngestError::batch_read(format!(
                "line {} of '{}' has {} fields, header has {}",
                line,
                self.path.display(),
                self.record.len(),
                width
            )));
        }

        let mut row: Vec<String> = self.record.iter().map(str::to_string).collect();
        row.resize(width, String::new());
        Ok(row)
    }
}

impl Iterator for CsvSource {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_batch() {
            Ok(batch) => batch.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Make header names unique and non-empty.
///
/// An empty name becomes `Unnamed: <index>`; a repeated name gets a `.1`,
/// `.2`, ... suffix.
pub fn normalize_headers(raw: &StringRecord) -> Vec<String> {
    let mut seen = HashSet::with_capacity(raw.len());
    let mut headers = Vec::with_capacity(raw.len());

    for (index, name) in raw.iter().enumerate() {
        let base = if name.trim().is_empty() {
            format!("Unnamed: {}", index)
        } else {
            name.to_string()
        };

        let mut candidate = base.clone();
        let mut suffix = 0;
        while seen.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}.{}", base, suffix);
        }

        seen.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}
