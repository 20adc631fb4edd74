//! Column declarations
//!
//! This module provides the declarative column metadata a record type
//! exposes once at bind time. The schema binder turns these declarations
//! into DDL and parameterized CRUD statements; nothing is discovered by
//! reflection at runtime.

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit integer storage
    Integer,

    /// UTF-8 text storage
    Text,
}

impl ColumnType {
    /// SQL type name used in DDL
    pub const fn sql_name(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }
}

/// Declaration of one concrete column
///
/// Declarations are const-constructible so record types can expose them
/// as a `static` slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name, unique within the record type
    pub name: &'static str,

    /// Storage type
    pub column_type: ColumnType,

    /// Whether NULL values are rejected
    pub not_null: bool,

    /// Whether values must be unique
    pub unique: bool,

    /// Whether this is the record's primary key, assigned by the store
    /// on insert
    pub primary_key: bool,

    /// Default value literal, spliced into the DDL as written
    pub default_value: Option<&'static str>,

    /// Name of a single-column index to create, unique within the
    /// record type
    pub index: Option<&'static str>,
}

impl ColumnSpec {
    /// New column with no constraints
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        ColumnSpec {
            name,
            column_type,
            not_null: false,
            unique: false,
            primary_key: false,
            default_value: None,
            index: None,
        }
    }

    /// Mark as the record's primary key
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Reject NULL values
    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Enforce uniqueness
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Set the DDL default literal
    pub const fn default_value(mut self, literal: &'static str) -> Self {
        self.default_value = Some(literal);
        self
    }

    /// Create a single-column index with the given name
    pub const fn indexed(mut self, index_name: &'static str) -> Self {
        self.index = Some(index_name);
        self
    }

    /// Column fragment used inside CREATE TABLE and ALTER TABLE ADD
    pub fn ddl_fragment(&self) -> String {
        let mut ddl = format!("{} {}", self.name, self.column_type.sql_name());
        if self.primary_key {
            ddl.push_str(" PRIMARY KEY");
        }
        if self.not_null {
            ddl.push_str(" NOT NULL");
        }
        if self.unique {
            ddl.push_str(" UNIQUE");
        }
        if let Some(default) = self.default_value {
            ddl.push_str(" DEFAULT ");
            ddl.push_str(default);
        }
        ddl
    }
}

/// Declaration of a computed column joined in from another table
///
/// Virtual columns appear in SELECT and WHERE construction but never in
/// INSERT or UPDATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualColumnSpec {
    /// Column name on the target table, as exposed on the record
    pub name: &'static str,

    /// Storage type
    pub column_type: ColumnType,

    /// Table the value is sourced from
    pub target_table: &'static str,

    /// Column on the record's own table used for the join
    pub local_key: &'static str,

    /// Column on the target table matched against the local key
    pub foreign_key: &'static str,
}

impl VirtualColumnSpec {
    /// New virtual column
    pub const fn new(
        name: &'static str,
        column_type: ColumnType,
        target_table: &'static str,
        local_key: &'static str,
        foreign_key: &'static str,
    ) -> Self {
        VirtualColumnSpec {
            name,
            column_type,
            target_table,
            local_key,
            foreign_key,
        }
    }
}
