//! Cache indirection and windowed fetch
//!
//! A cache is a named, orderable subset of a table's rows held as
//! position→key indirection rows in a shared table, so arbitrarily large
//! result sets page without full materialization. One cache id is
//! allocated per logical name; persistent caches keep their rows across
//! process restarts.
//!
//! Between full reloads the indirection rows are only touched by the
//! synchronizer's minimal delta. Incremental adds append at the tail and
//! removals leave gaps, so positions are approximate until the next
//! reload; every mutation invalidates the in-memory window and the
//! cached first position.
//!
//! Lock order within a cache is selection → window → connection.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use rusqlite::params;

use crate::db::{exec, statement_error, Database};
use crate::error::{EngineError, Result};
use crate::models::Record;
use crate::query::{collect_members, ViewQuery};
use crate::schema::RecordStore;

use super::window::WindowState;

/// Descriptor table mapping logical names to cache ids
const DESCRIPTOR_TABLE: &str = "cache_views";

/// Shared indirection table of (order position, cache id, item key) rows
const ENTRY_TABLE: &str = "cache_entries";

/// A named cache over one record type's backing table
pub struct ViewCache<T: Record> {
    db: Database,
    store: Arc<RecordStore<T>>,
    cache_id: i64,
    name: String,

    /// Query whose condition scopes windowed fetches; replaced on reload
    selection: Mutex<ViewQuery>,

    /// Sparse position→record window plus the cached first position
    window: Mutex<WindowState<T>>,

    /// Row count as of the last reload or delta
    count: AtomicI64,
}

impl<T: Record + Clone> ViewCache<T> {
    /// Open or create the cache named `name`.
    ///
    /// A persistent cache found by name is warm: its indirection rows are
    /// kept and the previous row count is immediately available. A
    /// non-persistent cache is invalidated at open and starts empty.
    pub fn open(store: Arc<RecordStore<T>>, name: &str, persistent: bool) -> Result<Self> {
        let db = store.database().clone();
        ensure_schema(&db)?;

        let existing: Option<i64> = db.query_row_optional(
            &format!("SELECT cache_id FROM {} WHERE name = ?", DESCRIPTOR_TABLE),
            params![name],
            |row| row.get(0),
        )?;

        let (cache_id, count) = match existing {
            Some(id) if persistent => {
                let count: Option<i64> = db.query_row_optional(
                    &format!("SELECT COUNT(*) FROM {} WHERE cache_id = ?", ENTRY_TABLE),
                    params![id],
                    |row| row.get(0),
                )?;
                let count = count.unwrap_or(0);
                info!("cache '{}' reopened warm with {} row(s)", name, count);
                (id, count)
            }
            Some(id) => {
                db.execute(
                    &format!("DELETE FROM {} WHERE cache_id = ?", ENTRY_TABLE),
                    params![id],
                )?;
                debug!("cache '{}' invalidated at open", name);
                (id, 0)
            }
            None => {
                let id = db.with_connection(|conn| {
                    exec(
                        conn,
                        &format!("INSERT INTO {} (name) VALUES (?)", DESCRIPTOR_TABLE),
                        params![name],
                    )?;
                    Ok(conn.last_insert_rowid())
                })?;
                debug!("cache '{}' allocated id {}", name, id);
                (id, 0)
            }
        };

        Ok(ViewCache {
            db,
            store,
            cache_id,
            name: name.to_string(),
            selection: Mutex::new(ViewQuery::new()),
            window: Mutex::new(WindowState::new()),
            count: AtomicI64::new(count),
        })
    }

    /// Logical name of the cache
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allocated cache id
    pub fn cache_id(&self) -> i64 {
        self.cache_id
    }

    /// Rows currently indexed by the cache
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Member keys in cache order
    pub fn keys(&self) -> Result<Vec<i64>> {
        self.db.query_keys(
            &format!(
                "SELECT item_key FROM {} WHERE cache_id = ? ORDER BY order_pos",
                ENTRY_TABLE
            ),
            params![self.cache_id],
        )
    }

    /// Rebuild the cache from scratch: delete and re-insert this cache's
    /// indirection rows in the order the query yields keys, all inside
    /// one transaction. Returns the new row count.
    pub fn reload(&self, query: &ViewQuery) -> Result<i64> {
        let keys = collect_members(
            &self.db,
            T::table_name(),
            self.store.primary_key_column(),
            query,
        )?;

        self.db.transaction(|conn| {
            exec(
                conn,
                &format!("DELETE FROM {} WHERE cache_id = ?", ENTRY_TABLE),
                params![self.cache_id],
            )?;
            let insert_sql = format!(
                "INSERT INTO {} (cache_id, item_key) VALUES (?, ?)",
                ENTRY_TABLE
            );
            let mut stmt = conn
                .prepare_cached(&insert_sql)
                .map_err(|e| statement_error(&insert_sql, e))?;
            for key in &keys {
                stmt.execute(params![self.cache_id, key])
                    .map_err(|e| statement_error(&insert_sql, e))?;
            }
            Ok(())
        })?;

        {
            let mut selection = self
                .selection
                .lock()
                .map_err(|e| EngineError::State(format!("selection lock poisoned: {}", e)))?;
            *selection = query.clone();
        }
        self.invalidate()?;
        self.count.store(keys.len() as i64, Ordering::SeqCst);

        info!("cache '{}' reloaded with {} row(s)", self.name, keys.len());
        Ok(keys.len() as i64)
    }

    /// Apply the synchronizer's minimal change-set: delete removed keys,
    /// append added keys at the tail, in one transaction
    pub fn apply_delta(&self, added: &[i64], removed: &[i64]) -> Result<()> {
        if added.is_empty() && removed.is_empty() {
            return Ok(());
        }

        let mut dropped = 0usize;
        self.db.transaction(|conn| {
            let delete_sql = format!(
                "DELETE FROM {} WHERE cache_id = ? AND item_key = ?",
                ENTRY_TABLE
            );
            for key in removed {
                dropped += exec(conn, &delete_sql, params![self.cache_id, key])?;
            }
            let insert_sql = format!(
                "INSERT INTO {} (cache_id, item_key) VALUES (?, ?)",
                ENTRY_TABLE
            );
            for key in added {
                exec(conn, &insert_sql, params![self.cache_id, key])?;
            }
            Ok(())
        })?;

        self.invalidate()?;
        self.count
            .fetch_add(added.len() as i64 - dropped as i64, Ordering::SeqCst);

        debug!(
            "cache '{}' delta applied: +{} -{}",
            self.name,
            added.len(),
            dropped
        );
        Ok(())
    }

    /// Remove every indirection row of this cache
    pub fn clear(&self) -> Result<()> {
        self.db.execute(
            &format!("DELETE FROM {} WHERE cache_id = ?", ENTRY_TABLE),
            params![self.cache_id],
        )?;
        self.invalidate()?;
        self.count.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Drop the in-memory window and the cached first position
    pub fn invalidate(&self) -> Result<()> {
        let mut window = self
            .window
            .lock()
            .map_err(|e| EngineError::State(format!("window lock poisoned: {}", e)))?;
        window.clear();
        Ok(())
    }

    /// Zero-based position of `key` within the cache's current ordering,
    /// or `None` when the cache is empty or the key is not a member
    pub fn index_of(&self, key: i64) -> Result<Option<u64>> {
        let Some(first) = self.first_position()? else {
            return Ok(None);
        };

        let position: Option<i64> = self.db.query_row_optional(
            &format!(
                "SELECT order_pos FROM {} WHERE cache_id = ? AND item_key = ?",
                ENTRY_TABLE
            ),
            params![self.cache_id, key],
            |row| row.get(0),
        )?;

        Ok(position.map(|p| (p - first) as u64))
    }

    /// Fetch the records at positions `[offset, offset + limit)`.
    ///
    /// Positions already materialized in the window are served from
    /// memory; only the missing gaps are queried, joined through the
    /// indirection rows and scoped by the reload query's condition.
    /// Ranges past the end of the cache yield an empty sequence.
    pub fn fetch_range(&self, offset: u64, limit: u64) -> Result<Vec<T>> {
        let count = self.count();
        if count <= 0 || offset >= count as u64 || limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(count as u64 - offset);

        let condition = {
            let selection = self
                .selection
                .lock()
                .map_err(|e| EngineError::State(format!("selection lock poisoned: {}", e)))?;
            selection.condition().map(|c| c.to_string())
        };

        let mut window = self
            .window
            .lock()
            .map_err(|e| EngineError::State(format!("window lock poisoned: {}", e)))?;

        let first = match window.first_position() {
            Some(first) => first,
            None => match self.query_first_position()? {
                Some(first) => {
                    window.set_first_position(first);
                    first
                }
                None => return Ok(Vec::new()),
            },
        };

        let record_columns = T::columns().len() + T::virtual_columns().len();
        for (gap_start, gap_count) in window.missing_ranges(offset, limit) {
            let mut sql = format!(
                "{} INNER JOIN {} ON {} = {}.item_key \
                 WHERE {}.cache_id = ? AND {}.order_pos >= ?",
                self.store
                    .select_sql_with_extra(&format!("{}.order_pos", ENTRY_TABLE)),
                ENTRY_TABLE,
                self.store.qualified_primary_key(),
                ENTRY_TABLE,
                ENTRY_TABLE,
                ENTRY_TABLE,
            );
            if let Some(condition) = &condition {
                sql.push_str(&format!(" AND ({})", condition));
            }
            sql.push_str(&format!(" ORDER BY {}.order_pos LIMIT ?", ENTRY_TABLE));

            self.db.with_connection(|conn| {
                let mut stmt = conn
                    .prepare_cached(&sql)
                    .map_err(|e| statement_error(&sql, e))?;
                let mut rows = stmt
                    .query(params![self.cache_id, first + gap_start as i64, gap_count])
                    .map_err(|e| statement_error(&sql, e))?;
                while let Some(row) = rows.next().map_err(|e| statement_error(&sql, e))? {
                    let record = T::from_row(row).map_err(|e| statement_error(&sql, e))?;
                    let order_pos: i64 = row
                        .get(record_columns)
                        .map_err(|e| statement_error(&sql, e))?;
                    window.insert((order_pos - first) as u64, record);
                }
                Ok(())
            })?;
        }

        Ok((offset..offset + limit)
            .filter_map(|position| window.get(position).cloned())
            .collect())
    }

    fn first_position(&self) -> Result<Option<i64>> {
        {
            let window = self
                .window
                .lock()
                .map_err(|e| EngineError::State(format!("window lock poisoned: {}", e)))?;
            if let Some(first) = window.first_position() {
                return Ok(Some(first));
            }
        }

        let first = self.query_first_position()?;
        if let Some(first) = first {
            let mut window = self
                .window
                .lock()
                .map_err(|e| EngineError::State(format!("window lock poisoned: {}", e)))?;
            window.set_first_position(first);
        }
        Ok(first)
    }

    fn query_first_position(&self) -> Result<Option<i64>> {
        let first: Option<Option<i64>> = self.db.query_row_optional(
            &format!("SELECT MIN(order_pos) FROM {} WHERE cache_id = ?", ENTRY_TABLE),
            params![self.cache_id],
            |row| row.get(0),
        )?;
        Ok(first.flatten())
    }
}

/// Create the descriptor and indirection tables when missing
fn ensure_schema(db: &Database) -> Result<()> {
    db.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {descriptors} (cache_id INTEGER PRIMARY KEY, name TEXT UNIQUE);\n\
         CREATE TABLE IF NOT EXISTS {entries} (order_pos INTEGER PRIMARY KEY, cache_id INTEGER, item_key INTEGER);\n\
         CREATE INDEX IF NOT EXISTS idx_cache_entries_cache ON {entries} (cache_id, item_key);",
        descriptors = DESCRIPTOR_TABLE,
        entries = ENTRY_TABLE,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::query::ViewQuery;
    use crate::testing::{insert_track_with_key, track_store, Track};

    fn cache_over(
        keys_and_durations: &[(i64, i64)],
    ) -> (Database, Arc<RecordStore<Track>>, ViewCache<Track>) {
        let (db, store) = track_store();
        for (key, duration) in keys_and_durations {
            insert_track_with_key(&db, *key, &format!("t{}", key), 1, *duration);
        }
        let cache = ViewCache::open(Arc::clone(&store), "test-view", false).unwrap();
        (db, store, cache)
    }

    #[test]
    fn test_reload_preserves_query_order() {
        // Durations chosen so duration order yields keys 10, 7, 3
        let (_db, _store, cache) = cache_over(&[(3, 30), (7, 20), (10, 10)]);

        let rows = cache
            .reload(&ViewQuery::new().with_order("duration_secs ASC"))
            .unwrap();
        assert_eq!(rows, 3);
        assert_eq!(cache.count(), 3);

        assert_eq!(cache.index_of(10).unwrap(), Some(0));
        assert_eq!(cache.index_of(7).unwrap(), Some(1));
        assert_eq!(cache.index_of(3).unwrap(), Some(2));
        assert_eq!(cache.index_of(99).unwrap(), None);
    }

    #[test]
    fn test_index_of_on_empty_cache() {
        let (_db, _store, cache) = cache_over(&[]);
        assert_eq!(cache.count(), 0);
        assert_eq!(cache.index_of(1).unwrap(), None);
    }

    #[test]
    fn test_fetch_range_clamps_and_caches() {
        let (db, _store, cache) = cache_over(&[(1, 10), (2, 20), (3, 30), (4, 40)]);
        cache
            .reload(&ViewQuery::new().with_order("track_id ASC"))
            .unwrap();

        // Four rows, window of five starting at two: exactly two records
        let fetched = cache.fetch_range(2, 5).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].track_id, 3);
        assert_eq!(fetched[1].track_id, 4);

        // Delete the backing rows; cached positions must satisfy the
        // repeat call without touching the store
        db.execute("DELETE FROM tracks", params![]).unwrap();
        let again = cache.fetch_range(2, 5).unwrap();
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].track_id, 3);
    }

    #[test]
    fn test_fetch_range_past_the_end_is_empty() {
        let (_db, _store, cache) = cache_over(&[(1, 10), (2, 20)]);
        cache.reload(&ViewQuery::new()).unwrap();

        assert!(cache.fetch_range(2, 3).unwrap().is_empty());
        assert!(cache.fetch_range(100, 1).unwrap().is_empty());
        assert!(cache.fetch_range(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_fetch_range_respects_condition() {
        let (_db, _store, cache) = cache_over(&[(1, 10), (2, 20), (3, 30)]);
        cache
            .reload(
                &ViewQuery::new()
                    .with_condition("duration_secs >= 20")
                    .with_order("track_id ASC"),
            )
            .unwrap();

        assert_eq!(cache.count(), 2);
        let fetched = cache.fetch_range(0, 10).unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].track_id, 2);
        assert_eq!(fetched[1].track_id, 3);
    }

    #[test]
    fn test_reload_invalidates_window() {
        let (_db, _store, cache) = cache_over(&[(1, 10), (2, 20), (3, 30)]);
        cache
            .reload(&ViewQuery::new().with_order("track_id ASC"))
            .unwrap();
        let first = cache.fetch_range(0, 3).unwrap();
        assert_eq!(first[0].track_id, 1);

        // Reverse the order; the window must not serve stale positions
        cache
            .reload(&ViewQuery::new().with_order("track_id DESC"))
            .unwrap();
        let reversed = cache.fetch_range(0, 3).unwrap();
        assert_eq!(reversed[0].track_id, 3);
        assert_eq!(cache.index_of(3).unwrap(), Some(0));
    }

    #[test]
    fn test_apply_delta_updates_membership_and_count() {
        let (db, _store, cache) = cache_over(&[(1, 10), (2, 20), (3, 30)]);
        cache
            .reload(&ViewQuery::new().with_order("track_id ASC"))
            .unwrap();

        insert_track_with_key(&db, 5, "t5", 1, 50);
        cache.apply_delta(&[5], &[2]).unwrap();

        assert_eq!(cache.count(), 3);
        assert_eq!(cache.index_of(2).unwrap(), None);
        assert!(cache.index_of(5).unwrap().is_some());

        // Removing an absent key changes nothing
        cache.apply_delta(&[], &[99]).unwrap();
        assert_eq!(cache.count(), 3);
    }

    #[test]
    fn test_persistent_cache_reopens_warm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.db");
        let config = EngineConfig::at_path(&path);

        {
            let db = Database::open(&config).unwrap();
            let store = Arc::new(RecordStore::<Track>::bind(&db).unwrap());
            insert_track_with_key(&db, 1, "a", 1, 10);
            insert_track_with_key(&db, 2, "b", 1, 20);
            let cache = ViewCache::open(Arc::clone(&store), "albums-view", true).unwrap();
            cache.reload(&ViewQuery::new()).unwrap();
            assert_eq!(cache.count(), 2);
        }

        // Warm: the previous row count is available before any reload
        let db = Database::open(&config).unwrap();
        let store = Arc::new(RecordStore::<Track>::bind(&db).unwrap());
        let cache = ViewCache::open(Arc::clone(&store), "albums-view", true).unwrap();
        assert_eq!(cache.count(), 2);
        assert_eq!(cache.index_of(1).unwrap(), Some(0));

        // The same name opened non-persistent is invalidated instead
        let cold = ViewCache::open(Arc::clone(&store), "albums-view", false).unwrap();
        assert_eq!(cold.count(), 0);
    }

    #[test]
    fn test_distinct_names_get_distinct_ids() {
        let (_db, store, cache) = cache_over(&[(1, 10)]);
        let other = ViewCache::open(Arc::clone(&store), "other-view", false).unwrap();
        assert_ne!(cache.cache_id(), other.cache_id());

        cache.reload(&ViewQuery::new()).unwrap();
        other
            .reload(&ViewQuery::new().with_condition("track_id > 1"))
            .unwrap();

        // Memberships are scoped per cache id
        assert_eq!(cache.count(), 1);
        assert_eq!(other.count(), 0);
    }
}
