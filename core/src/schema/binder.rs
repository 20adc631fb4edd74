//! Schema binding and generated statements
//!
//! This module binds a record type to its backing table: it validates the
//! static column declarations, creates or upgrades the table, and
//! generates the parameterized CRUD statements reused for every call.
//!
//! Upgrades are additive only. The binder diffs the declared column names
//! against the live schema read from `sqlite_master` and issues
//! `ALTER TABLE ADD` for anything missing; it never drops or
//! renames columns.

use std::marker::PhantomData;

use log::{debug, info};
use rusqlite::params;

use crate::db::{exec, statement_error, Database};
use crate::error::{EngineError, Result};
use crate::models::{ColumnSpec, ColumnType, Record, Value};

/// Bound store for one record type
pub struct RecordStore<T: Record> {
    /// Shared database handle
    db: Database,

    /// Index of the primary-key column within the declarations
    pk_index: usize,

    /// Name of the primary-key column
    pk_name: &'static str,

    insert_sql: String,
    update_sql: String,
    select_list: String,
    from_clause: String,
    select_sql: String,
    load_sql: String,
    delete_sql: String,

    _record: PhantomData<fn() -> T>,
}

impl<T: Record> std::fmt::Debug for RecordStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("pk_index", &self.pk_index)
            .field("pk_name", &self.pk_name)
            .field("insert_sql", &self.insert_sql)
            .field("update_sql", &self.update_sql)
            .field("select_list", &self.select_list)
            .field("from_clause", &self.from_clause)
            .field("select_sql", &self.select_sql)
            .field("load_sql", &self.load_sql)
            .field("delete_sql", &self.delete_sql)
            .finish()
    }
}

impl<T: Record> RecordStore<T> {
    /// Bind the record type, creating or upgrading its backing table.
    ///
    /// Declaration problems (missing or non-integer primary key,
    /// duplicate column or index names) fail here, before any query runs.
    pub fn bind(db: &Database) -> Result<Self> {
        let pk_index = validate_declarations::<T>()?;
        let pk_name = T::columns()[pk_index].name;
        let (select_list, from_clause) = build_select::<T>()?;
        let select_sql = format!("SELECT {} FROM {}", select_list, from_clause);
        let load_sql = format!("{} WHERE {}.{} = ?", select_sql, T::table_name(), pk_name);

        let store = RecordStore {
            db: db.clone(),
            pk_index,
            pk_name,
            insert_sql: build_insert::<T>(pk_index),
            update_sql: build_update::<T>(pk_index, pk_name),
            select_list,
            from_clause,
            select_sql,
            load_sql,
            delete_sql: format!("DELETE FROM {} WHERE {} = ?", T::table_name(), pk_name),
            _record: PhantomData,
        };

        let added = store.ensure_table()?;
        if added > 0 {
            info!(
                "table '{}' upgraded with {} new column(s)",
                T::table_name(),
                added
            );
        }

        Ok(store)
    }

    /// Shared database handle
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Name of the primary-key column
    pub fn primary_key_column(&self) -> &'static str {
        self.pk_name
    }

    /// Primary-key column qualified with the table name, for joins
    pub(crate) fn qualified_primary_key(&self) -> String {
        format!("{}.{}", T::table_name(), self.pk_name)
    }

    /// Generated SELECT statement, including virtual-column joins
    pub(crate) fn select_sql(&self) -> &str {
        &self.select_sql
    }

    /// SELECT statement with an extra column appended to the select list,
    /// for callers that join additional tables onto the record query
    pub(crate) fn select_sql_with_extra(&self, extra_column: &str) -> String {
        format!(
            "SELECT {}, {} FROM {}",
            self.select_list, extra_column, self.from_clause
        )
    }

    /// Create the table if missing, otherwise add declared columns absent
    /// from the live schema. Returns the number of columns added; a
    /// repeat run with unchanged declarations returns zero.
    pub fn ensure_table(&self) -> Result<usize> {
        let live_sql: Option<String> = self.db.query_row_optional(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            params![T::table_name()],
            |row| row.get(0),
        )?;

        let added = match live_sql {
            None => {
                let fragments: Vec<String> =
                    T::columns().iter().map(|c| c.ddl_fragment()).collect();
                let ddl = format!(
                    "CREATE TABLE {} ({})",
                    T::table_name(),
                    fragments.join(", ")
                );
                info!("creating table '{}'", T::table_name());
                self.db.execute(&ddl, params![])?;
                0
            }
            Some(sql) => {
                let live = live_column_names(&sql);
                let mut added = 0;
                for column in T::columns() {
                    if !live.iter().any(|name| name == column.name) {
                        let ddl = format!(
                            "ALTER TABLE {} ADD {}",
                            T::table_name(),
                            column.ddl_fragment()
                        );
                        debug!("adding column '{}' to '{}'", column.name, T::table_name());
                        self.db.execute(&ddl, params![])?;
                        added += 1;
                    }
                }
                added
            }
        };

        for column in T::columns() {
            if let Some(index) = column.index {
                let ddl = format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    index,
                    T::table_name(),
                    column.name
                );
                self.db.execute(&ddl, params![])?;
            }
        }

        Ok(added)
    }

    /// Insert a record, assigning the store-generated primary key
    pub fn insert(&self, record: &mut T) -> Result<i64> {
        let values = self.values_without_pk(record);
        let key = self.db.with_connection(|conn| {
            exec(
                conn,
                &self.insert_sql,
                rusqlite::params_from_iter(values.iter()),
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        record.set_primary_key(key);
        Ok(key)
    }

    /// Update an existing record by primary key
    pub fn update(&self, record: &T) -> Result<()> {
        let mut values = self.values_without_pk(record);
        values.push(Value::Integer(record.primary_key()));
        self.db
            .execute(&self.update_sql, rusqlite::params_from_iter(values.iter()))?;
        Ok(())
    }

    /// Insert the record when it has no key yet, update it otherwise
    pub fn save(&self, record: &mut T) -> Result<()> {
        if record.primary_key() > 0 {
            self.update(record)
        } else {
            self.insert(record).map(|_| ())
        }
    }

    /// Load one record by primary key
    pub fn load(&self, key: i64) -> Result<Option<T>> {
        self.db
            .query_row_optional(&self.load_sql, params![key], |row| T::from_row(row))
    }

    /// Delete one record by primary key; returns whether a row existed
    pub fn delete(&self, key: i64) -> Result<bool> {
        let affected = self.db.execute(&self.delete_sql, params![key])?;
        Ok(affected > 0)
    }

    /// Fetch every record
    pub fn fetch_all(&self) -> Result<Vec<T>> {
        self.fetch_with_suffix("", params![])
    }

    /// Fetch records matching a consumer-supplied WHERE fragment
    pub fn fetch_where<P: rusqlite::Params>(&self, condition: &str, params: P) -> Result<Vec<T>> {
        self.fetch_with_suffix(&format!(" WHERE {}", condition), params)
    }

    /// Fetch a window of records, `LIMIT offset, count`
    pub fn fetch_range(&self, offset: u64, count: u64) -> Result<Vec<T>> {
        self.fetch_with_suffix(" LIMIT ?, ?", params![offset, count])
    }

    /// Number of rows in the backing table
    pub fn count(&self) -> Result<i64> {
        let count = self.db.query_row_optional(
            &format!("SELECT COUNT(*) FROM {}", T::table_name()),
            params![],
            |row| row.get(0),
        )?;
        Ok(count.unwrap_or(0))
    }

    fn fetch_with_suffix<P: rusqlite::Params>(&self, suffix: &str, params: P) -> Result<Vec<T>> {
        let sql = format!("{}{}", self.select_sql, suffix);
        self.db.with_connection(|conn| {
            let mut stmt = conn
                .prepare_cached(&sql)
                .map_err(|e| statement_error(&sql, e))?;
            stmt.query_map(params, |row| T::from_row(row))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<T>>>())
                .map_err(|e| statement_error(&sql, e))
        })
    }

    fn values_without_pk(&self, record: &T) -> Vec<Value> {
        record
            .bind()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != self.pk_index)
            .map(|(_, v)| v)
            .collect()
    }
}

/// Validate the declarations, returning the primary-key column index
fn validate_declarations<T: Record>() -> Result<usize> {
    let columns = T::columns();
    let virtuals = T::virtual_columns();

    let mut names: Vec<&str> = Vec::with_capacity(columns.len() + virtuals.len());
    for name in columns
        .iter()
        .map(|c| c.name)
        .chain(virtuals.iter().map(|v| v.name))
    {
        if names.contains(&name) {
            return Err(EngineError::Configuration(format!(
                "record '{}' declares column '{}' more than once",
                T::table_name(),
                name
            )));
        }
        names.push(name);
    }

    let mut indexes: Vec<&str> = Vec::new();
    for index in columns.iter().filter_map(|c| c.index) {
        if indexes.contains(&index) {
            return Err(EngineError::Configuration(format!(
                "record '{}' declares index '{}' more than once",
                T::table_name(),
                index
            )));
        }
        indexes.push(index);
    }

    let mut pk_indices = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.primary_key)
        .map(|(i, _)| i);
    let pk_index = match (pk_indices.next(), pk_indices.next()) {
        (Some(index), None) => index,
        (None, _) => {
            return Err(EngineError::Configuration(format!(
                "record '{}' declares no primary key",
                T::table_name()
            )))
        }
        (Some(_), Some(_)) => {
            return Err(EngineError::Configuration(format!(
                "record '{}' declares more than one primary key",
                T::table_name()
            )))
        }
    };

    if columns[pk_index].column_type != ColumnType::Integer {
        return Err(EngineError::Configuration(format!(
            "record '{}' primary key '{}' must use integer storage",
            T::table_name(),
            columns[pk_index].name
        )));
    }

    Ok(pk_index)
}

fn build_insert<T: Record>(pk_index: usize) -> String {
    let columns: Vec<&str> = T::columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != pk_index)
        .map(|(_, c)| c.name)
        .collect();
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", T::table_name());
    }
    let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        T::table_name(),
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn build_update<T: Record>(pk_index: usize, pk_name: &str) -> String {
    let assignments: Vec<String> = T::columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != pk_index)
        .map(|(_, c)| format!("{} = ?", c.name))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE {} = ?",
        T::table_name(),
        assignments.join(", "),
        pk_name
    )
}

fn build_select<T: Record>() -> Result<(String, String)> {
    let table = T::table_name();
    let mut select_list: Vec<String> = T::columns()
        .iter()
        .map(|c| format!("{}.{}", table, c.name))
        .collect();

    let mut from_clause = table.to_string();
    let mut joined: Vec<(&str, &str, &str)> = Vec::new();
    for virtual_column in T::virtual_columns() {
        select_list.push(format!(
            "{}.{}",
            virtual_column.target_table, virtual_column.name
        ));

        let join = (
            virtual_column.target_table,
            virtual_column.local_key,
            virtual_column.foreign_key,
        );
        if joined.contains(&join) {
            continue;
        }
        if joined.iter().any(|(t, _, _)| *t == virtual_column.target_table) {
            return Err(EngineError::Configuration(format!(
                "record '{}' joins table '{}' through more than one key pair",
                table, virtual_column.target_table
            )));
        }
        from_clause.push_str(&format!(
            " LEFT JOIN {} ON {}.{} = {}.{}",
            virtual_column.target_table,
            table,
            virtual_column.local_key,
            virtual_column.target_table,
            virtual_column.foreign_key
        ));
        joined.push(join);
    }

    Ok((select_list.join(", "), from_clause))
}

/// Extract the column names from a live `CREATE TABLE` statement
fn live_column_names(create_sql: &str) -> Vec<String> {
    const CONSTRAINT_KEYWORDS: [&str; 5] = ["PRIMARY", "UNIQUE", "FOREIGN", "CHECK", "CONSTRAINT"];

    let Some(open) = create_sql.find('(') else {
        return Vec::new();
    };
    let Some(close) = create_sql.rfind(')') else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }

    let body = &create_sql[open + 1..close];
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut segment = String::new();

    for ch in body.chars().chain(std::iter::once(',')) {
        match ch {
            '(' => {
                depth += 1;
                segment.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                segment.push(ch);
            }
            ',' if depth == 0 => {
                if let Some(token) = segment.split_whitespace().next() {
                    let name = token.trim_matches(|c| matches!(c, '"' | '\'' | '`' | '[' | ']'));
                    let upper = name.to_uppercase();
                    if !name.is_empty() && !CONSTRAINT_KEYWORDS.contains(&upper.as_str()) {
                        names.push(name.to_string());
                    }
                }
                segment.clear();
            }
            _ => segment.push(ch),
        }
    }

    names
}
