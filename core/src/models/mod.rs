//! Data models for the view engine
//!
//! This module provides the declarative column metadata and the record
//! trait that bind an application entity to its relational table.

mod column;
mod record;

pub use column::{ColumnSpec, ColumnType, VirtualColumnSpec};
pub use record::{Record, Value};
