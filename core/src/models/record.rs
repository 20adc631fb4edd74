//! Record binding
//!
//! This module provides the trait a type implements to be bound to a
//! relational table: a static column list, primary-key access, and row
//! hydration. Caching and synchronization compose generically over any
//! implementor.

use rusqlite::types::{ToSql, ToSqlOutput};

use super::column::{ColumnSpec, VirtualColumnSpec};

/// Value stored in a bound column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// 64-bit integer
    Integer(i64),

    /// UTF-8 text
    Text(String),

    /// SQL NULL
    Null,
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Integer(v) => Ok(ToSqlOutput::from(*v)),
            Value::Text(v) => Ok(ToSqlOutput::from(v.as_str())),
            Value::Null => Ok(ToSqlOutput::Owned(rusqlite::types::Value::Null)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        match v {
            Some(text) => Value::Text(text),
            None => Value::Null,
        }
    }
}

/// A typed entity bound to one relational table
///
/// Implementors declare their columns once, statically; the schema binder
/// enumerates the declarations at bind time. `bind` must return one value
/// per concrete column in declaration order, and `from_row` receives the
/// concrete columns followed by the virtual columns, also in declaration
/// order.
pub trait Record: Sized {
    /// Backing table name
    fn table_name() -> &'static str;

    /// Concrete column declarations
    fn columns() -> &'static [ColumnSpec];

    /// Joined, read-only column declarations
    fn virtual_columns() -> &'static [VirtualColumnSpec] {
        &[]
    }

    /// Store-assigned primary key; zero or negative when not yet inserted
    fn primary_key(&self) -> i64;

    /// Record the store-assigned primary key after insert
    fn set_primary_key(&mut self, key: i64);

    /// Current value of every concrete column, in declaration order
    fn bind(&self) -> Vec<Value>;

    /// Hydrate a record from a result row laid out per the declarations
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(42), Value::Integer(42));
        assert_eq!(Value::from("abc"), Value::Text("abc".to_string()));
        assert_eq!(Value::from("abc".to_string()), Value::Text("abc".to_string()));
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(
            Value::from(Some("x".to_string())),
            Value::Text("x".to_string())
        );
    }

    #[test]
    fn test_value_to_sql() {
        // Each variant must produce a bindable SQL value
        assert!(Value::Integer(7).to_sql().is_ok());
        assert!(Value::Text("t".to_string()).to_sql().is_ok());
        assert!(Value::Null.to_sql().is_ok());
    }
}
