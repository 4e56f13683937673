//! Scalar values and their declared types

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Canonical text rendering of timestamps, both in the sink and on screen
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cell contents treated as missing, in addition to the empty string.
const MISSING_MARKERS: &[&str] = &[
    "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Returns true when a raw cell should be read as a missing value
pub fn is_missing(raw: &str) -> bool {
    raw.is_empty() || MISSING_MARKERS.contains(&raw)
}

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Integer,
    Real,
    Boolean,
    Text,
    Timestamp,
}

impl ScalarType {
    /// SQL column type used when the destination table is created
    pub fn sql_type(self) -> &'static str {
        match self {
            ScalarType::Integer | ScalarType::Boolean => "INTEGER",
            ScalarType::Real => "REAL",
            ScalarType::Text => "TEXT",
            ScalarType::Timestamp => "TIMESTAMP",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ScalarType::Integer | ScalarType::Real)
    }

    /// Infer the narrowest type that every non-missing cell parses as.
    ///
    /// Precedence is integer, real, boolean, then text. A column with no
    /// non-missing cells is text.
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a str>) -> ScalarType {
        let mut integer = true;
        let mut real = true;
        let mut boolean = true;
        let mut seen = false;

        for cell in cells.into_iter().filter(|c| !is_missing(c)) {
            seen = true;
            if integer && cell.parse::<i64>().is_err() {
                integer = false;
            }
            if real && cell.parse::<f64>().is_err() {
                real = false;
            }
            if boolean && parse_bool(cell).is_none() {
                boolean = false;
            }
            if !integer && !real && !boolean {
                return ScalarType::Text;
            }
        }

        if !seen {
            ScalarType::Text
        } else if integer {
            ScalarType::Integer
        } else if real {
            ScalarType::Real
        } else if boolean {
            ScalarType::Boolean
        } else {
            ScalarType::Text
        }
    }
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarType::Integer => write!(f, "integer"),
            ScalarType::Real => write!(f, "real"),
            ScalarType::Boolean => write!(f, "boolean"),
            ScalarType::Text => write!(f, "text"),
            ScalarType::Timestamp => write!(f, "timestamp"),
        }
    }
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// A single typed cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Parse a raw cell as the given column type.
    ///
    /// Missing markers become `Null`. A cell that does not parse as the
    /// requested type is kept as text rather than dropped.
    pub fn parse(raw: &str, data_type: ScalarType) -> Value {
        if is_missing(raw) {
            return Value::Null;
        }

        let parsed = match data_type {
            ScalarType::Integer => raw.parse().ok().map(Value::Integer),
            ScalarType::Real => raw.parse().ok().map(Value::Real),
            ScalarType::Boolean => parse_bool(raw).map(Value::Boolean),
            ScalarType::Timestamp => NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
                .ok()
                .map(Value::Timestamp),
            ScalarType::Text => None,
        };

        parsed.unwrap_or_else(|| Value::Text(raw.to_string()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
            Value::Timestamp(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
        }
    }
}
