//! Bounded, row-oriented batches

use std::sync::Arc;

use super::schema::{Field, Schema};
use super::value::{ScalarType, Value};
use crate::error::{Error, Result};

/// An ordered set of rows sharing one schema.
///
/// Every row holds exactly one value per schema column, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    schema: Arc<Schema>,
    rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Create a batch, checking every row against the schema width
    pub fn new(schema: Arc<Schema>, rows: Vec<Vec<Value>>) -> Result<Self> {
        let expected = schema.len();
        if let Some((row, values)) = rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
            return Err(Error::RowWidth {
                row,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self { schema, rows })
    }

    /// Build a batch from raw text cells, inferring each column's type from
    /// this batch alone
    pub fn from_text_rows(headers: &[String], rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != headers.len())
        {
            return Err(Error::RowWidth {
                row,
                expected: headers.len(),
                actual: cells.len(),
            });
        }

        let fields = headers
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let data_type = ScalarType::infer(rows.iter().map(|r| r[col].as_str()));
                Field::new(name.clone(), data_type)
            })
            .collect::<Vec<_>>();
        let schema = Schema::new(fields)?;

        let typed_rows = rows
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(schema.fields())
                    .map(|(cell, field)| Value::parse(cell, field.data_type))
                    .collect()
            })
            .collect();

        Ok(Self {
            schema: Arc::new(schema),
            rows: typed_rows,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.schema.column_names()
    }

    /// Iterate over one column's values
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |row| row.get(index))
    }

    pub fn into_parts(self) -> (Arc<Schema>, Vec<Vec<Value>>) {
        (self.schema, self.rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_from_text_rows_infers_per_column() {
        let headers = strings(&["id", "price", "active", "name"]);
        let rows = vec![
            strings(&["1", "9.5", "true", "a"]),
            strings(&["2", "", "false", ""]),
        ];
        let batch = Batch::from_text_rows(&headers, rows).unwrap();

        let types: Vec<ScalarType> = batch.schema().fields().iter().map(|f| f.data_type).collect();
        assert_eq!(
            types,
            vec![
                ScalarType::Integer,
                ScalarType::Real,
                ScalarType::Boolean,
                ScalarType::Text
            ]
        );
        assert_eq!(batch.rows()[0][1], Value::Real(9.5));
        assert!(batch.rows()[1][1].is_null());
        assert!(batch.rows()[1][3].is_null());
    }

    #[test]
    fn test_from_text_rows_rejects_ragged_rows() {
        let headers = strings(&["a", "b"]);
        let rows = vec![strings(&["1", "2"]), strings(&["3"])];
        assert_eq!(
            Batch::from_text_rows(&headers, rows),
            Err(Error::RowWidth {
                row: 1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_new_checks_width() {
        let schema = Arc::new(Schema::new(vec![Field::new("a", ScalarType::Integer)]).unwrap());
        assert!(Batch::new(schema.clone(), vec![vec![Value::Integer(1)]]).is_ok());
        assert!(Batch::new(schema, vec![vec![Value::Integer(1), Value::Null]]).is_err());
    }

    #[test]
    fn test_column_iterator() {
        let headers = strings(&["a", "b"]);
        let rows = vec![strings(&["1", "x"]), strings(&["2", "y"])];
        let batch = Batch::from_text_rows(&headers, rows).unwrap();
        let values: Vec<&Value> = batch.column(0).collect();
        assert_eq!(values, vec![&Value::Integer(1), &Value::Integer(2)]);
    }
}
