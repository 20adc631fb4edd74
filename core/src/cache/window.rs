//! Sparse fetch window
//!
//! In-memory map from absolute cache position to materialized record,
//! filled in ranges on demand. Positions already materialized are never
//! re-queried; a fetch only asks the store for the missing gaps.

use std::collections::BTreeMap;

/// Sparse window state for one cache
#[derive(Debug)]
pub(crate) struct WindowState<T> {
    /// Materialized records by absolute position
    rows: BTreeMap<u64, T>,

    /// Cached first order position of the cache's indirection block;
    /// recomputed lazily after every invalidation
    first_position: Option<i64>,
}

impl<T> WindowState<T> {
    pub fn new() -> Self {
        WindowState {
            rows: BTreeMap::new(),
            first_position: None,
        }
    }

    /// Drop all materialized rows and the cached first position
    pub fn clear(&mut self) {
        self.rows.clear();
        self.first_position = None;
    }

    pub fn insert(&mut self, position: u64, record: T) {
        self.rows.insert(position, record);
    }

    pub fn get(&self, position: u64) -> Option<&T> {
        self.rows.get(&position)
    }

    pub fn first_position(&self) -> Option<i64> {
        self.first_position
    }

    pub fn set_first_position(&mut self, position: i64) {
        self.first_position = Some(position);
    }

    /// Contiguous sub-ranges of `[offset, offset + limit)` that are not
    /// yet materialized, as `(start, count)` pairs
    pub fn missing_ranges(&self, offset: u64, limit: u64) -> Vec<(u64, u64)> {
        let mut gaps = Vec::new();
        let mut run_start: Option<u64> = None;

        for position in offset..offset.saturating_add(limit) {
            if self.rows.contains_key(&position) {
                if let Some(start) = run_start.take() {
                    gaps.push((start, position - start));
                }
            } else if run_start.is_none() {
                run_start = Some(position);
            }
        }
        if let Some(start) = run_start {
            gaps.push((start, offset.saturating_add(limit) - start));
        }

        gaps
    }
}
