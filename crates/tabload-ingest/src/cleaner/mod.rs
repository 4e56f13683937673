//! Record cleaning
//!
//! [`clean`] applies a [`CleaningPolicy`] to one batch and returns a new batch
//! plus diagnostics. The input batch is never modified, and nothing is carried
//! from one batch to the next: medians are computed within the batch.
//!
//! A rule that references a column the batch does not have is skipped and
//! recorded, never raised.

mod policy;

pub use policy::{CleaningPolicy, CleaningRule, DEFAULT_FILL_VALUE};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tabload_common::{Batch, Result, ScalarType, Schema, Value};
use tracing::debug;

/// Date/time layouts tried, in order, when a rule has no explicit format
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// A rule that did not apply to a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRule {
    /// Position of the rule in the policy
    pub rule_index: usize,
    pub rule: String,
    pub reason: String,
}

/// What cleaning did to one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningDiagnostics {
    pub skipped_rules: Vec<SkippedRule>,
    /// Cells per column that failed date/time coercion and became null
    pub coercion_failures: BTreeMap<String, u64>,
    /// Cells per column filled by an imputation rule
    pub imputed_cells: BTreeMap<String, u64>,
}

impl CleaningDiagnostics {
    fn skip(&mut self, rule_index: usize, rule: &CleaningRule, reason: String) {
        debug!(rule_index, rule = %rule, reason = %reason, "Cleaning rule skipped");
        self.skipped_rules.push(SkippedRule {
            rule_index,
            rule: rule.to_string(),
            reason,
        });
    }
}

/// Result of cleaning one batch
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub batch: Batch,
    pub diagnostics: CleaningDiagnostics,
}

/// Apply every rule of `policy`, in order, to a copy of `batch`
pub fn clean(batch: &Batch, policy: &CleaningPolicy) -> Result<CleanOutcome> {
    let mut schema: Schema = batch.schema().as_ref().clone();
    let mut rows = batch.rows().to_vec();
    let mut diagnostics = CleaningDiagnostics::default();

    for (rule_index, rule) in policy.rules.iter().enumerate() {
        match rule {
            CleaningRule::Rename { from, to } => {
                if schema.index_of(from).is_none() {
                    diagnostics.skip(rule_index, rule, absent(from));
                } else if schema.index_of(to).is_some() {
                    diagnostics.skip(
                        rule_index,
                        rule,
                        format!("column '{}' already exists", to),
                    );
                } else {
                    schema = schema.with_renamed(from, to)?;
                }
            }

            CleaningRule::ImputeMedian { column } => {
                let Some(index) = schema.index_of(column) else {
                    diagnostics.skip(rule_index, rule, absent(column));
                    continue;
                };
                let data_type = schema
                    .field(index)
                    .map(|f| f.data_type)
                    .unwrap_or(ScalarType::Text);
                if !data_type.is_numeric() {
                    diagnostics.skip(
                        rule_index,
                        rule,
                        format!("column '{}' is {}, not numeric", column, data_type),
                    );
                    continue;
                }

                if let Some(filled) = impute_median(&mut rows, index, data_type) {
                    if filled.widened {
                        schema = schema.with_type(index, ScalarType::Real)?;
                    }
                    record(&mut diagnostics.imputed_cells, column, filled.cells);
                }
            }

            CleaningRule::ImputeConstant { column, value } => {
                let Some(index) = schema.index_of(column) else {
                    diagnostics.skip(rule_index, rule, absent(column));
                    continue;
                };
                let nulls = rows.iter().filter(|r| r[index].is_null()).count() as u64;
                if nulls == 0 {
                    continue;
                }

                for row in rows.iter_mut() {
                    let cell = &mut row[index];
                    *cell = match &*cell {
                        Value::Null => Value::Text(value.clone()),
                        Value::Text(_) => continue,
                        other => Value::Text(other.to_string()),
                    };
                }
                schema = schema.with_type(index, ScalarType::Text)?;
                record(&mut diagnostics.imputed_cells, column, nulls);
            }

            CleaningRule::CoerceDatetime { column, format } => {
                let Some(index) = schema.index_of(column) else {
                    diagnostics.skip(rule_index, rule, absent(column));
                    continue;
                };

                let mut failures = 0u64;
                for row in rows.iter_mut() {
                    let cell = &mut row[index];
                    let coerced = match &*cell {
                        Value::Null => continue,
                        Value::Timestamp(ts) => Some(*ts),
                        other => parse_datetime(&other.to_string(), format.as_deref()),
                    };
                    *cell = match coerced {
                        Some(ts) => Value::Timestamp(ts),
                        None => {
                            failures += 1;
                            Value::Null
                        }
                    };
                }
                schema = schema.with_type(index, ScalarType::Timestamp)?;
                record(&mut diagnostics.coercion_failures, column, failures);
            }
        }
    }

    Ok(CleanOutcome {
        batch: Batch::new(Arc::new(schema), rows)?,
        diagnostics,
    })
}

fn absent(column: &str) -> String {
    format!("column '{}' not present in batch", column)
}

fn record(counts: &mut BTreeMap<String, u64>, column: &str, n: u64) {
    if n > 0 {
        *counts.entry(column.to_string()).or_insert(0) += n;
    }
}

struct MedianFill {
    cells: u64,
    widened: bool,
}

/// Fill nulls at `index` with the median of the non-null numeric cells.
/// Returns `None` when there was nothing to fill or nothing to compute from.
fn impute_median(rows: &mut [Vec<Value>], index: usize, data_type: ScalarType) -> Option<MedianFill> {
    let nulls = rows.iter().filter(|r| r[index].is_null()).count() as u64;
    if nulls == 0 {
        return None;
    }

    let mut present: Vec<f64> = rows.iter().filter_map(|r| r[index].as_f64()).collect();
    let median = median(&mut present)?;

    let widened = data_type == ScalarType::Integer && median.fract() != 0.0;
    let fill = if data_type == ScalarType::Integer && !widened {
        Value::Integer(median as i64)
    } else {
        Value::Real(median)
    };

    for row in rows.iter_mut() {
        let cell = &mut row[index];
        match cell {
            Value::Null => *cell = fill.clone(),
            Value::Integer(v) if widened => *cell = Value::Real(*v as f64),
            _ => {}
        }
    }

    Some(MedianFill {
        cells: nulls,
        widened,
    })
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Parse a date/time with the explicit format, or else the known layouts.
/// Date-only layouts resolve to midnight.
pub fn parse_datetime(raw: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(raw, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn batch(headers: &[&str], rows: &[&[&str]]) -> Batch {
        let headers: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        Batch::from_text_rows(&headers, rows).unwrap()
    }

    fn column(batch: &Batch, name: &str) -> Vec<Value> {
        let index = batch.schema().index_of(name).unwrap();
        batch.column(index).cloned().collect()
    }

    #[test]
    fn test_median_imputation_odd() {
        let input = batch(&["numeric_column"], &[&["1"], &[""], &["3"]]);
        let policy = CleaningPolicy::default().with_rule(CleaningRule::impute_median("numeric_column"));

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(
            column(&outcome.batch, "numeric_column"),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
        assert_eq!(outcome.diagnostics.imputed_cells["numeric_column"], 1);
        assert_eq!(
            outcome.batch.schema().field(0).unwrap().data_type,
            ScalarType::Integer
        );
    }

    #[test]
    fn test_median_imputation_even_widens_to_real() {
        let input = batch(&["n"], &[&["1"], &["NA"], &["2"]]);
        let policy = CleaningPolicy::default().with_rule(CleaningRule::impute_median("n"));

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(
            column(&outcome.batch, "n"),
            vec![Value::Real(1.0), Value::Real(1.5), Value::Real(2.0)]
        );
        assert_eq!(outcome.batch.schema().field(0).unwrap().data_type, ScalarType::Real);
    }

    #[test]
    fn test_median_all_null_column_untouched() {
        let input = batch(&["id", "n"], &[&["1", ""], &["2", ""]]);
        let policy = CleaningPolicy::default().with_rule(CleaningRule::impute_median("id"));
        let outcome = clean(&input, &policy).unwrap();
        assert_eq!(outcome.batch, input);

        // an all-null column infers as text, so median skips it
        let policy = CleaningPolicy::default().with_rule(CleaningRule::impute_median("n"));
        let outcome = clean(&input, &policy).unwrap();
        assert_eq!(outcome.diagnostics.skipped_rules.len(), 1);
        assert_eq!(column(&outcome.batch, "n"), vec![Value::Null, Value::Null]);
    }

    #[test]
    fn test_median_on_text_column_is_skipped() {
        let input = batch(&["city"], &[&["Oslo"], &[""]]);
        let policy = CleaningPolicy::default().with_rule(CleaningRule::impute_median("city"));

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(outcome.diagnostics.skipped_rules.len(), 1);
        assert!(outcome.diagnostics.skipped_rules[0].reason.contains("not numeric"));
    }

    #[test]
    fn test_absent_column_rule_is_skipped() {
        let input = batch(&["id", "name"], &[&["1", "a"], &["2", ""]]);
        let policy = CleaningPolicy::default().with_rule(CleaningRule::impute_unknown("region"));

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(outcome.batch.row_count(), 2);
        assert_eq!(outcome.diagnostics.skipped_rules.len(), 1);
        let skipped = &outcome.diagnostics.skipped_rules[0];
        assert_eq!(skipped.rule_index, 0);
        assert!(skipped.reason.contains("region"));
        assert_eq!(outcome.batch, input);
    }

    #[test]
    fn test_input_batch_is_not_mutated() {
        let input = batch(&["n", "label"], &[&["1", ""], &["", "x"]]);
        let before = input.clone();
        let policy = CleaningPolicy::new(vec![
            CleaningRule::impute_median("n"),
            CleaningRule::impute_unknown("label"),
            CleaningRule::rename("n", "value"),
        ]);

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(input, before);
        assert_ne!(outcome.batch, input);
    }

    #[test]
    fn test_rules_apply_in_order() {
        let input = batch(&["old_column_1", "x"], &[&["", "1"], &["b", "2"]]);
        let policy = CleaningPolicy::new(vec![
            CleaningRule::rename("old_column_1", "new_column_1"),
            CleaningRule::impute_unknown("new_column_1"),
        ]);

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(outcome.batch.column_names(), vec!["new_column_1", "x"]);
        assert_eq!(
            column(&outcome.batch, "new_column_1"),
            vec![Value::Text("Unknown".into()), Value::Text("b".into())]
        );
        assert!(outcome.diagnostics.skipped_rules.is_empty());
    }

    #[test]
    fn test_rename_onto_existing_column_is_skipped() {
        let input = batch(&["a", "b"], &[&["1", "2"]]);
        let policy = CleaningPolicy::default().with_rule(CleaningRule::rename("a", "b"));

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(outcome.batch.column_names(), vec!["a", "b"]);
        assert!(outcome.diagnostics.skipped_rules[0].reason.contains("already exists"));
    }

    #[test]
    fn test_impute_constant_widens_numeric_column() {
        let input = batch(&["code"], &[&["7"], &[""]]);
        let policy =
            CleaningPolicy::default().with_rule(CleaningRule::impute_constant("code", "missing"));

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(outcome.batch.schema().field(0).unwrap().data_type, ScalarType::Text);
        assert_eq!(
            column(&outcome.batch, "code"),
            vec![Value::Text("7".into()), Value::Text("missing".into())]
        );
    }

    #[test]
    fn test_coerce_datetime_counts_failures() {
        let input = batch(
            &["date_column"],
            &[&["2024-01-15"], &["not a date"], &[""], &["2024-02-01 08:30:00"]],
        );
        let policy = CleaningPolicy::default()
            .with_rule(CleaningRule::coerce_datetime("date_column", None));

        let outcome = clean(&input, &policy).unwrap();
        let values = column(&outcome.batch, "date_column");

        assert_eq!(
            values[0],
            Value::Timestamp(parse_datetime("2024-01-15 00:00:00", None).unwrap())
        );
        assert_eq!(values[1], Value::Null);
        assert_eq!(values[2], Value::Null);
        assert!(matches!(values[3], Value::Timestamp(_)));
        assert_eq!(outcome.diagnostics.coercion_failures["date_column"], 1);
        assert_eq!(
            outcome.batch.schema().field(0).unwrap().data_type,
            ScalarType::Timestamp
        );
    }

    #[test]
    fn test_coerce_datetime_explicit_format() {
        let input = batch(&["d"], &[&["15/01/2024"], &["2024-01-15"]]);
        let policy = CleaningPolicy::default()
            .with_rule(CleaningRule::coerce_datetime("d", Some("%d/%m/%Y".to_string())));

        let outcome = clean(&input, &policy).unwrap();

        assert!(matches!(column(&outcome.batch, "d")[0], Value::Timestamp(_)));
        assert_eq!(outcome.diagnostics.coercion_failures["d"], 1);
    }

    #[test]
    fn test_constant_fill_and_coercion_rewrite_cells_in_place() {
        let input = batch(
            &["region", "d"],
            &[&["north", "2024-01-15"], &["", "bad"], &["south", ""]],
        );
        let policy = CleaningPolicy::new(vec![
            CleaningRule::impute_unknown("region"),
            CleaningRule::coerce_datetime("d", None),
            // already-coerced cells pass through unchanged
            CleaningRule::coerce_datetime("d", None),
        ]);

        let outcome = clean(&input, &policy).unwrap();

        assert_eq!(
            column(&outcome.batch, "region"),
            vec![
                Value::Text("north".into()),
                Value::Text(DEFAULT_FILL_VALUE.into()),
                Value::Text("south".into()),
            ]
        );
        let dates = column(&outcome.batch, "d");
        assert!(matches!(dates[0], Value::Timestamp(_)));
        assert_eq!(dates[1], Value::Null);
        assert_eq!(dates[2], Value::Null);
        assert_eq!(outcome.diagnostics.imputed_cells["region"], 1);
        assert_eq!(outcome.diagnostics.coercion_failures["d"], 1);
    }

    #[test]
    fn test_parse_datetime_layouts() {
        for raw in [
            "2024-03-01T12:00:00Z",
            "2024-03-01T12:00:00",
            "2024/03/01",
            "03/01/2024",
            "01.03.2024",
        ] {
            let parsed = parse_datetime(raw, None).unwrap();
            assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), "{}", raw);
        }
        assert!(parse_datetime("yesterday", None).is_none());
    }

    #[test]
    fn test_empty_policy_returns_equal_batch() {
        let input = batch(&["a"], &[&["1"]]);
        let outcome = clean(&input, &CleaningPolicy::default()).unwrap();
        assert_eq!(outcome.batch, input);
        assert_eq!(outcome.diagnostics, CleaningDiagnostics::default());
    }
}
