//! Live view synchronization
//!
//! A live view holds an in-memory membership for one cache and keeps it
//! in step with the store by re-running the membership query and merging
//! the result against the previous membership, emitting only the minimal
//! change-set.
//!
//! The membership is always kept sorted ascending by primary key,
//! whatever the view's display order; the re-query result is sorted the
//! same way before merging, which is what makes the single linear merge
//! correct. Refreshes run on worker threads; re-entrant triggers while
//! one is in flight are coalesced. Readers observe either the fully-old
//! or the fully-new membership, never a partial merge.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::cache::ViewCache;
use crate::error::{EngineError, Result};
use crate::models::Record;
use crate::notify::{ViewEvent, ViewNotifier};
use crate::query::{collect_members, ViewQuery};
use crate::schema::RecordStore;

use super::diff::merge_sorted;

/// Live, incrementally synchronized membership over one cache
pub struct LiveView<T: Record> {
    store: Arc<RecordStore<T>>,
    cache: Arc<ViewCache<T>>,

    /// Membership query; the condition defines who belongs, the display
    /// order only affects materialization
    query: Mutex<ViewQuery>,

    /// Members keyed by primary key; BTreeMap keeps them sorted
    live: Mutex<BTreeMap<i64, T>>,

    /// At most one refresh in flight per view
    refreshing: AtomicBool,

    notifier: ViewNotifier<T>,
}

impl<T: Record + Clone> LiveView<T> {
    /// Create a live view over `cache`, initially empty; the first
    /// refresh populates it
    pub fn new(
        store: Arc<RecordStore<T>>,
        cache: Arc<ViewCache<T>>,
        query: ViewQuery,
        notifier: ViewNotifier<T>,
    ) -> Self {
        LiveView {
            store,
            cache,
            query: Mutex::new(query),
            live: Mutex::new(BTreeMap::new()),
            refreshing: AtomicBool::new(false),
            notifier,
        }
    }

    /// Replace the membership query; takes effect on the next refresh
    pub fn set_query(&self, query: ViewQuery) -> Result<()> {
        let mut current = self
            .query
            .lock()
            .map_err(|e| EngineError::State(format!("query lock poisoned: {}", e)))?;
        *current = query;
        Ok(())
    }

    /// Membership snapshot, sorted ascending by primary key
    pub fn member_keys(&self) -> Result<Vec<i64>> {
        let live = self.lock_live()?;
        Ok(live.keys().copied().collect())
    }

    /// Record snapshot, in primary-key order
    pub fn records(&self) -> Result<Vec<T>> {
        let live = self.lock_live()?;
        Ok(live.values().cloned().collect())
    }

    /// One member by primary key
    pub fn get(&self, key: i64) -> Result<Option<T>> {
        let live = self.lock_live()?;
        Ok(live.get(&key).cloned())
    }

    /// Number of members
    pub fn len(&self) -> Result<usize> {
        let live = self.lock_live()?;
        Ok(live.len())
    }

    /// Whether the view has no members
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Rebuild the cache and the live membership from scratch.
    ///
    /// This is the all-or-nothing path: the cache's indirection rows are
    /// deleted and re-inserted in display order, the live membership is
    /// replaced wholesale, and a single update notification is queued.
    /// Incremental change-sets are the business of [`Self::refresh`].
    /// Returns the cache row count.
    pub fn reload(&self) -> Result<i64> {
        let query = {
            let query = self
                .query
                .lock()
                .map_err(|e| EngineError::State(format!("query lock poisoned: {}", e)))?;
            query.clone()
        };

        let count = self.cache.reload(&query)?;

        let mut keys = self.cache.keys()?;
        keys.sort_unstable();
        keys.retain(|&key| {
            if key <= 0 {
                warn!("skipping member with non-positive key {}", key);
                false
            } else {
                true
            }
        });

        let mut members = BTreeMap::new();
        for key in keys {
            match self.store.load(key) {
                Ok(Some(record)) => {
                    members.insert(key, record);
                }
                Ok(None) => warn!("skipping key {}: row vanished during reload", key),
                Err(err) => warn!("skipping key {}: lookup failed: {}", key, err),
            }
        }

        {
            let mut live = self.lock_live()?;
            *live = members;
        }
        self.notifier.send(ViewEvent::Updated);

        Ok(count)
    }

    /// Re-run the membership query and apply the minimal change-set.
    ///
    /// Returns `false` when another refresh was already in flight; the
    /// call is coalesced and nothing runs. Notifications (one add batch,
    /// one remove batch, then an update) are queued for the owning
    /// context after the membership has been applied.
    pub fn refresh(&self) -> Result<bool> {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            debug!("view refresh already in flight; coalesced");
            return Ok(false);
        }
        let result = self.refresh_inner();
        self.refreshing.store(false, Ordering::SeqCst);
        result.map(|_| true)
    }

    fn refresh_inner(&self) -> Result<()> {
        let query = {
            let query = self
                .query
                .lock()
                .map_err(|e| EngineError::State(format!("query lock poisoned: {}", e)))?;
            query.clone()
        };

        // Membership re-query, re-sorted ascending by primary key; the
        // display order only matters when rows are materialized
        let mut keys = collect_members(
            self.store.database(),
            T::table_name(),
            self.store.primary_key_column(),
            &query,
        )?;
        keys.sort_unstable();
        keys.retain(|&key| {
            if key <= 0 {
                warn!("skipping member with non-positive key {}", key);
                false
            } else {
                true
            }
        });

        let old = self.member_keys()?;
        let delta = merge_sorted(&old, &keys);

        // Materialize added records; a failed lookup drops the key with a
        // warning and the rest of the batch proceeds
        let mut added_keys = Vec::with_capacity(delta.added.len());
        let mut added_records = Vec::with_capacity(delta.added.len());
        for &key in &delta.added {
            match self.store.load(key) {
                Ok(Some(record)) => {
                    added_keys.push(key);
                    added_records.push(record);
                }
                Ok(None) => warn!("skipping key {}: row vanished during refresh", key),
                Err(err) => warn!("skipping key {}: lookup failed: {}", key, err),
            }
        }

        // Apply removals then additions under one critical section
        let removed_records = {
            let mut live = self.lock_live()?;
            let mut removed = Vec::with_capacity(delta.removed.len());
            for key in &delta.removed {
                if let Some(record) = live.remove(key) {
                    removed.push(record);
                }
            }
            for (key, record) in added_keys.iter().zip(added_records.iter()) {
                live.insert(*key, record.clone());
            }
            removed
        };

        // Keep the indirection rows in step between full reloads
        self.cache.apply_delta(&added_keys, &delta.removed)?;

        if !added_records.is_empty() {
            self.notifier.send(ViewEvent::Added(added_records));
        }
        if !removed_records.is_empty() {
            self.notifier.send(ViewEvent::Removed(removed_records));
        }
        self.notifier.send(ViewEvent::Updated);

        Ok(())
    }

    fn lock_live(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<i64, T>>> {
        self.live
            .lock()
            .map_err(|e| EngineError::State(format!("live collection lock poisoned: {}", e)))
    }

    #[cfg(test)]
    fn force_refreshing(&self, value: bool) {
        self.refreshing.store(value, Ordering::SeqCst);
    }
}
