//! Error types for the core crate
//!
//! This module provides a consolidated error type for the engine,
//! separating fatal configuration problems from transient query failures.

use std::io;
use thiserror::Error;

/// Result type for the engine
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error type for the view engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid record or cache declaration, detected at bind time.
    /// Configuration errors are never retried at runtime.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A generated SQL statement failed to execute
    #[error("Statement failed ({sql}): {source}")]
    Statement {
        /// Text of the offending statement
        sql: String,

        /// Underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// A migration callback failed; the stored version was left untouched
    /// so the migration is retried on the next startup
    #[error("Migration of '{entry}' from version {from} to {to} failed: {source}")]
    Migration {
        /// Version-table entry being migrated
        entry: String,

        /// Stored version the callback was invoked with
        from: i64,

        /// Version the entry would have been advanced to
        to: i64,

        /// Error returned by the callback
        #[source]
        source: Box<EngineError>,
    },

    /// Shared state access error (poisoned lock, closed channel)
    #[error("State error: {0}")]
    State(String),

    /// SQLite error outside generated-statement execution
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convert a displayable error to a State error
pub fn to_state_error<E: std::fmt::Display>(err: E) -> EngineError {
    EngineError::State(err.to_string())
}

/// Convert a displayable error to a Configuration error
pub fn to_configuration_error<E: std::fmt::Display>(err: E) -> EngineError {
    EngineError::Configuration(err.to_string())
}
