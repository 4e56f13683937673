//! In-memory data model for batches flowing through the loader
//!
//! A [`Batch`] is a fixed-order list of rows, each row a list of tagged
//! [`Value`]s, plus one shared [`Schema`] resolved once per batch. Cells are
//! never looked up by column name per row; the schema maps names to positions.

mod batch;
mod schema;
mod value;

pub use batch::Batch;
pub use schema::{Field, Schema};
pub use value::{is_missing, ScalarType, Value, TIMESTAMP_FORMAT};
