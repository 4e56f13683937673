//! Ingestion run report

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::cleaner::{CleaningDiagnostics, SkippedRule};

/// Outcome of the post-load row count check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    Matched,
    /// Table holds a different number of rows than were written
    Mismatch { expected: u64, actual: u64 },
    NotRun,
}

/// Summary of one run, complete or partial
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionReport {
    pub run_id: String,
    pub table_name: String,
    pub rows_read: u64,
    pub rows_written: u64,
    pub batches_processed: usize,
    pub verified_row_count: Option<u64>,
    pub verification: Verification,
    pub skipped_rules: Vec<SkippedRule>,
    pub coercion_failures: BTreeMap<String, u64>,
    pub imputed_cells: BTreeMap<String, u64>,
    pub elapsed_ms: u64,
}

impl IngestionReport {
    pub fn new(run_id: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            table_name: table_name.into(),
            rows_read: 0,
            rows_written: 0,
            batches_processed: 0,
            verified_row_count: None,
            verification: Verification::NotRun,
            skipped_rules: Vec::new(),
            coercion_failures: BTreeMap::new(),
            imputed_cells: BTreeMap::new(),
            elapsed_ms: 0,
        }
    }

    /// Fold one batch's cleaning diagnostics into the run totals
    pub fn absorb(&mut self, diagnostics: CleaningDiagnostics) {
        self.skipped_rules.extend(diagnostics.skipped_rules);
        for (column, n) in diagnostics.coercion_failures {
            *self.coercion_failures.entry(column).or_insert(0) += n;
        }
        for (column, n) in diagnostics.imputed_cells {
            *self.imputed_cells.entry(column).or_insert(0) += n;
        }
    }

    /// Compare the sink's row count with the rows this run wrote
    pub fn verify(&mut self, actual: u64) {
        self.verified_row_count = Some(actual);
        self.verification = if actual == self.rows_written {
            Verification::Matched
        } else {
            Verification::Mismatch {
                expected: self.rows_written,
                actual,
            }
        };
    }

    /// True when the run completed with a verification mismatch
    pub fn has_warnings(&self) -> bool {
        matches!(self.verification, Verification::Mismatch { .. })
    }
}

impl fmt::Display for IngestionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run:        {}", self.run_id)?;
        writeln!(f, "Table:      {}", self.table_name)?;
        writeln!(f, "Batches:    {}", self.batches_processed)?;
        writeln!(f, "Rows read:  {}", self.rows_read)?;
        writeln!(f, "Rows written: {}", self.rows_written)?;

        match self.verification {
            Verification::Matched => writeln!(
                f,
                "Verified:   {} rows in table",
                self.verified_row_count.unwrap_or_default()
            )?,
            Verification::Mismatch { expected, actual } => writeln!(
                f,
                "Verified:   MISMATCH, expected {} rows, table has {}",
                expected, actual
            )?,
            Verification::NotRun => writeln!(f, "Verified:   not run")?,
        }

        if !self.skipped_rules.is_empty() {
            writeln!(f, "Skipped rules: {}", self.skipped_rules.len())?;
            for skipped in &self.skipped_rules {
                writeln!(f, "  #{} {}: {}", skipped.rule_index, skipped.rule, skipped.reason)?;
            }
        }

        for (column, n) in &self.imputed_cells {
            writeln!(f, "Imputed:    {} cell(s) in '{}'", n, column)?;
        }

        for (column, n) in &self.coercion_failures {
            writeln!(f, "Coercion failures: {} in '{}'", n, column)?;
        }

        write!(f, "Elapsed:    {} ms", self.elapsed_ms)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_match_and_mismatch() {
        let mut report = IngestionReport::new("r", "t");
        report.rows_written = 10;

        report.verify(10);
        assert_eq!(report.verification, Verification::Matched);
        assert!(!report.has_warnings());

        report.verify(12);
        assert_eq!(
            report.verification,
            Verification::Mismatch {
                expected: 10,
                actual: 12
            }
        );
        assert!(report.has_warnings());
        assert!(report.to_string().contains("MISMATCH"));
    }

    #[test]
    fn test_absorb_accumulates_per_column() {
        let mut report = IngestionReport::new("r", "t");
        let mut diagnostics = CleaningDiagnostics::default();
        diagnostics.imputed_cells.insert("n".into(), 2);
        diagnostics.skipped_rules.push(SkippedRule {
            rule_index: 0,
            rule: "impute_constant 'region' = 'Unknown'".into(),
            reason: "column 'region' not present in batch".into(),
        });

        report.absorb(diagnostics.clone());
        report.absorb(diagnostics);

        assert_eq!(report.imputed_cells["n"], 4);
        assert_eq!(report.skipped_rules.len(), 2);
    }

    #[test]
    fn test_serializes_verification_tag() {
        let mut report = IngestionReport::new("r", "t");
        report.verify(0);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["verification"]["status"], "matched");
        assert_eq!(json["verified_row_count"], 0);
    }
}
