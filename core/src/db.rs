//! Shared database handle
//!
//! The engine treats its SQLite connection as a single shared, serialized
//! resource: one connection behind one mutex, commands never issued
//! concurrently. Every statement that fails is logged together with its
//! SQL text before the error propagates.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::error;
use rusqlite::{Connection, OptionalExtension, Params};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::utils::QueryTimer;

/// Shared handle to the engine's SQLite connection
#[derive(Clone)]
pub struct Database {
    /// Connection, serialized across workers
    conn: Arc<Mutex<Connection>>,

    /// Warn threshold for statement execution
    slow_warn_ms: u64,
}

impl Database {
    /// Open the database described by `config` and apply its pragmas
    pub fn open(config: &EngineConfig) -> Result<Self> {
        let conn = match &config.storage.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };

        conn.busy_timeout(Duration::from_millis(config.storage.busy_timeout_ms))?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};\nPRAGMA synchronous = {};",
            config.storage.journal_mode.pragma_value(),
            config.storage.synchronous.pragma_value(),
        ))?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
            slow_warn_ms: config.storage.slow_statement_warn_ms,
        })
    }

    /// Open an in-memory database with default configuration
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&EngineConfig::default())
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| EngineError::State(format!("connection lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute one statement, returning the number of affected rows
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize> {
        self.with_connection(|conn| {
            let timer = QueryTimer::new(self.slow_warn_ms);
            let affected = exec(conn, sql, params)?;
            timer.finish(sql);
            Ok(affected)
        })
    }

    /// Execute a batch of semicolon-separated statements (DDL, pragmas)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_connection(|conn| conn.execute_batch(sql).map_err(|e| statement_error(sql, e)))
    }

    /// Query a list of integer keys, one per result row
    pub fn query_keys<P: Params>(&self, sql: &str, params: P) -> Result<Vec<i64>> {
        self.with_connection(|conn| {
            let timer = QueryTimer::new(self.slow_warn_ms);
            let mut stmt = conn.prepare_cached(sql).map_err(|e| statement_error(sql, e))?;
            let keys = stmt
                .query_map(params, |row| row.get::<_, i64>(0))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<i64>>>())
                .map_err(|e| statement_error(sql, e))?;
            timer.finish(sql);
            Ok(keys)
        })
    }

    /// Query at most one row, mapped through `map`
    pub fn query_row_optional<P, R, F>(&self, sql: &str, params: P, map: F) -> Result<Option<R>>
    where
        P: Params,
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
    {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(sql).map_err(|e| statement_error(sql, e))?;
            stmt.query_row(params, map)
                .optional()
                .map_err(|e| statement_error(sql, e))
        })
    }

    /// Run `f` inside one transaction; committed on success, rolled back
    /// when `f` returns an error
    pub fn transaction<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        self.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("slow_warn_ms", &self.slow_warn_ms)
            .finish()
    }
}

/// Execute a statement on an already-locked connection
pub(crate) fn exec<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<usize> {
    let mut stmt = conn.prepare_cached(sql).map_err(|e| statement_error(sql, e))?;
    stmt.execute(params).map_err(|e| statement_error(sql, e))
}

/// Log a failed statement with its SQL text and wrap the error
pub(crate) fn statement_error(sql: &str, source: rusqlite::Error) -> EngineError {
    error!("statement failed: {}: {}", sql, source);
    EngineError::Statement {
        sql: sql.to_string(),
        source,
    }
}
