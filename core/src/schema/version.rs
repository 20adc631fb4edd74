//! Schema version tracking
//!
//! This module keeps one version row per bound table plus a sentinel row
//! for the overall database, and drives migration callbacks when a stored
//! version falls behind the code's expected version.
//!
//! A version row is only advanced after its callback returns without
//! error, so an interrupted migration is retried on the next startup
//! instead of silently appearing done.

use log::{debug, info};
use rusqlite::params;

use crate::db::Database;
use crate::error::{EngineError, Result};

/// Backing table for version rows
const VERSIONS_TABLE: &str = "schema_versions";

/// Sentinel entry tracking the overall database version
const DATABASE_ENTRY: &str = "__database__";

/// Tracker for per-table and database-wide schema versions
#[derive(Debug, Clone)]
pub struct VersionTracker {
    db: Database,
}

impl VersionTracker {
    /// Open the tracker, creating its backing table when missing
    pub fn open(db: &Database) -> Result<Self> {
        db.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (table_name TEXT UNIQUE, version INTEGER)",
            VERSIONS_TABLE
        ))?;
        Ok(VersionTracker { db: db.clone() })
    }

    /// Stored version for an entry, when one exists
    pub fn version_of(&self, entry: &str) -> Result<Option<i64>> {
        self.db.query_row_optional(
            &format!(
                "SELECT version FROM {} WHERE table_name = ?",
                VERSIONS_TABLE
            ),
            params![entry],
            |row| row.get(0),
        )
    }

    /// Ensure a bound table's schema version.
    ///
    /// A missing row is inserted at `expected` without running the
    /// callback (first run). A stored version behind `expected` invokes
    /// `migrate` with the old version, then advances the row; a callback
    /// error leaves the row untouched. Stored versions never decrease.
    pub fn ensure_table_version(
        &self,
        table: &str,
        expected: i64,
        migrate: impl FnOnce(i64) -> Result<()>,
    ) -> Result<()> {
        self.ensure_entry(table, expected, migrate)
    }

    /// Ensure the overall database version through the sentinel entry
    pub fn ensure_database_version(
        &self,
        expected: i64,
        migrate: impl FnOnce(i64) -> Result<()>,
    ) -> Result<()> {
        self.ensure_entry(DATABASE_ENTRY, expected, migrate)
    }

    fn ensure_entry(
        &self,
        entry: &str,
        expected: i64,
        migrate: impl FnOnce(i64) -> Result<()>,
    ) -> Result<()> {
        match self.version_of(entry)? {
            None => {
                debug!("recording initial version {} for '{}'", expected, entry);
                self.db.execute(
                    &format!(
                        "INSERT INTO {} (table_name, version) VALUES (?, ?)",
                        VERSIONS_TABLE
                    ),
                    params![entry, expected],
                )?;
                Ok(())
            }
            Some(stored) if stored < expected => {
                info!(
                    "migrating '{}' from version {} to {}",
                    entry, stored, expected
                );
                migrate(stored).map_err(|e| EngineError::Migration {
                    entry: entry.to_string(),
                    from: stored,
                    to: expected,
                    source: Box::new(e),
                })?;
                self.db.execute(
                    &format!(
                        "UPDATE {} SET version = ? WHERE table_name = ?",
                        VERSIONS_TABLE
                    ),
                    params![expected, entry],
                )?;
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::cell::Cell;

    fn tracker() -> VersionTracker {
        let db = Database::open(&EngineConfig::testing()).unwrap();
        VersionTracker::open(&db).unwrap()
    }

    #[test]
    fn test_first_run_inserts_without_migrating() {
        let tracker = tracker();
        let ran = Cell::new(false);

        tracker
            .ensure_table_version("tracks", 3, |_| {
                ran.set(true);
                Ok(())
            })
            .unwrap();

        assert!(!ran.get());
        assert_eq!(tracker.version_of("tracks").unwrap(), Some(3));
    }

    #[test]
    fn test_migration_runs_once_with_old_version() {
        let tracker = tracker();
        tracker.ensure_table_version("tracks", 2, |_| Ok(())).unwrap();

        let seen = Cell::new(0i64);
        tracker
            .ensure_table_version("tracks", 5, |old| {
                seen.set(old);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen.get(), 2);
        assert_eq!(tracker.version_of("tracks").unwrap(), Some(5));

        // At-version: no further callback
        let ran = Cell::new(false);
        tracker
            .ensure_table_version("tracks", 5, |_| {
                ran.set(true);
                Ok(())
            })
            .unwrap();
        assert!(!ran.get());
    }

    #[test]
    fn test_failed_migration_leaves_version_and_retries() {
        let tracker = tracker();
        tracker.ensure_table_version("tracks", 1, |_| Ok(())).unwrap();

        let err = tracker
            .ensure_table_version("tracks", 2, |_| {
                Err(EngineError::State("migration interrupted".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Migration { from: 1, to: 2, .. }));
        assert_eq!(tracker.version_of("tracks").unwrap(), Some(1));

        // Next startup retries the same gap and may succeed
        tracker.ensure_table_version("tracks", 2, |_| Ok(())).unwrap();
        assert_eq!(tracker.version_of("tracks").unwrap(), Some(2));
    }

    #[test]
    fn test_stored_version_never_decreases() {
        let tracker = tracker();
        tracker.ensure_table_version("tracks", 4, |_| Ok(())).unwrap();

        let ran = Cell::new(false);
        tracker
            .ensure_table_version("tracks", 2, |_| {
                ran.set(true);
                Ok(())
            })
            .unwrap();

        assert!(!ran.get());
        assert_eq!(tracker.version_of("tracks").unwrap(), Some(4));
    }

    #[test]
    fn test_database_sentinel_is_independent() {
        let tracker = tracker();
        tracker.ensure_table_version("tracks", 3, |_| Ok(())).unwrap();
        tracker.ensure_database_version(7, |_| Ok(())).unwrap();

        assert_eq!(tracker.version_of("tracks").unwrap(), Some(3));
        assert_eq!(tracker.version_of(super::DATABASE_ENTRY).unwrap(), Some(7));

        let seen = Cell::new(0i64);
        tracker
            .ensure_database_version(9, |old| {
                seen.set(old);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.get(), 7);
    }
}
