//! Declarative cleaning rules

use serde::{Deserialize, Serialize};

/// Fill value used by `impute_constant` when none is configured
pub const DEFAULT_FILL_VALUE: &str = "Unknown";

fn default_fill_value() -> String {
    DEFAULT_FILL_VALUE.to_string()
}

/// One cleaning step. The set is closed; a policy is data, never code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CleaningRule {
    /// Rename a column
    Rename { from: String, to: String },

    /// Replace nulls in a numeric column with the batch median
    ImputeMedian { column: String },

    /// Replace nulls with a constant text value
    ImputeConstant {
        column: String,
        #[serde(default = "default_fill_value")]
        value: String,
    },

    /// Parse a column as date/time; failures become null
    CoerceDatetime {
        column: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
    },
}

impl CleaningRule {
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn impute_median(column: impl Into<String>) -> Self {
        Self::ImputeMedian {
            column: column.into(),
        }
    }

    pub fn impute_constant(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::ImputeConstant {
            column: column.into(),
            value: value.into(),
        }
    }

    /// `impute_constant` with the default `"Unknown"` sentinel
    pub fn impute_unknown(column: impl Into<String>) -> Self {
        Self::impute_constant(column, DEFAULT_FILL_VALUE)
    }

    pub fn coerce_datetime(column: impl Into<String>, format: Option<String>) -> Self {
        Self::CoerceDatetime {
            column: column.into(),
            format,
        }
    }
}

impl std::fmt::Display for CleaningRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleaningRule::Rename { from, to } => write!(f, "rename '{}' -> '{}'", from, to),
            CleaningRule::ImputeMedian { column } => write!(f, "impute_median '{}'", column),
            CleaningRule::ImputeConstant { column, value } => {
                write!(f, "impute_constant '{}' = '{}'", column, value)
            }
            CleaningRule::CoerceDatetime { column, format } => match format {
                Some(fmt) => write!(f, "coerce_datetime '{}' ({})", column, fmt),
                None => write!(f, "coerce_datetime '{}'", column),
            },
        }
    }
}

/// Ordered list of rules applied to every batch of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningPolicy {
    #[serde(default)]
    pub rules: Vec<CleaningRule>,
}

impl CleaningPolicy {
    pub fn new(rules: Vec<CleaningRule>) -> Self {
        Self { rules }
    }

    pub fn with_rule(mut self, rule: CleaningRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
