//! Tabload Common Library
//!
//! Shared data model, errors, and logging for the tabload workspace.
//!
//! # Overview
//!
//! - **Types**: the in-memory batch model (`Value`, `Schema`, `Batch`) passed
//!   between the source, the cleaner, and the sink
//! - **Error Handling**: errors raised while building batches
//! - **Logging**: centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```
//! use tabload_common::types::{Batch, ScalarType};
//!
//! let headers = vec!["id".to_string(), "city".to_string()];
//! let rows = vec![
//!     vec!["1".to_string(), "Lisbon".to_string()],
//!     vec!["2".to_string(), "".to_string()],
//! ];
//! let batch = Batch::from_text_rows(&headers, rows).unwrap();
//! assert_eq!(batch.schema().field(0).unwrap().data_type, ScalarType::Integer);
//! assert!(batch.rows()[1][1].is_null());
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::{Batch, Field, ScalarType, Schema, Value, TIMESTAMP_FORMAT};
