//! Column schemas shared by every row of a batch

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::value::ScalarType;
use crate::error::{Error, Result};

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub data_type: ScalarType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of uniquely named columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting duplicate column names
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::DuplicateColumn(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// True when both schemas have the same column names in the same order.
    /// Column types are not compared.
    pub fn same_columns(&self, other: &Schema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|(a, b)| a.name == b.name)
    }

    /// Copy of this schema with one column renamed
    pub fn with_renamed(&self, from: &str, to: &str) -> Result<Self> {
        let index = self
            .index_of(from)
            .ok_or_else(|| Error::UnknownColumn(from.to_string()))?;
        if self.index_of(to).is_some() {
            return Err(Error::DuplicateColumn(to.to_string()));
        }
        let mut fields = self.fields.clone();
        fields[index].name = to.to_string();
        Ok(Self { fields })
    }

    /// Copy of this schema with one column's type replaced
    pub fn with_type(&self, index: usize, data_type: ScalarType) -> Result<Self> {
        let mut fields = self.fields.clone();
        let field = fields
            .get_mut(index)
            .ok_or_else(|| Error::UnknownColumn(format!("#{}", index)))?;
        field.data_type = data_type;
        Ok(Self { fields })
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let columns: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}: {}", field.name, field.data_type))
            .collect();
        write!(f, "[{}]", columns.join(", "))
    }
}
