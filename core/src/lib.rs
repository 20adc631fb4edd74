//! # Viewcache Core
//!
//! A windowed, cache-backed relational view engine over SQLite. Records
//! bind to tables through static column declarations; named caches hold
//! a position→key index so large result sets page without full
//! materialization; live views re-synchronize against fresh query
//! results with an identity-preserving sorted merge, emitting only the
//! minimal change-set to the owning context.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod query;
pub mod schema;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

/// Re-export common types for ease of use
pub use cache::ViewCache;
pub use config::EngineConfig;
pub use db::Database;
pub use error::{EngineError, Result};
pub use models::{ColumnSpec, ColumnType, Record, Value, VirtualColumnSpec};
pub use notify::{channel, ViewEvent, ViewEvents, ViewNotifier};
pub use query::{collect_members, ViewLimit, ViewQuery};
pub use schema::{RecordStore, VersionTracker};
pub use sync::{merge_sorted, LiveView, MembershipDelta};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }

    // End-to-end: bind, version-check, reload, page, refresh, drain
    #[test]
    fn test_engine_round_trip() {
        use crate::testing::{sample_track, Track};

        let config = EngineConfig::testing();
        let db = Database::open(&config).unwrap();

        let tracker = VersionTracker::open(&db).unwrap();
        tracker.ensure_database_version(1, |_| Ok(())).unwrap();
        let store = Arc::new(RecordStore::<Track>::bind(&db).unwrap());
        tracker
            .ensure_table_version(Track::table_name(), 1, |_| Ok(()))
            .unwrap();

        for i in 0..10i64 {
            let mut track = sample_track(&format!("track {:02}", i), i % 3, 120 + i);
            store.insert(&mut track).unwrap();
        }

        let cache = Arc::new(
            ViewCache::open(Arc::clone(&store), "recently-added", false).unwrap(),
        );
        let query = ViewQuery::new()
            .with_condition("artist_id = 0")
            .with_order("title DESC");

        let (notifier, events) = channel(config.notify.capacity);
        let view = LiveView::new(Arc::clone(&store), Arc::clone(&cache), query, notifier);
        assert_eq!(view.reload().unwrap(), 4);
        assert_eq!(view.len().unwrap(), 4);

        let page = cache.fetch_range(0, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].title > page[1].title);

        // Nothing changed underneath, so a refresh settles without churn
        view.refresh().unwrap();
        assert_eq!(cache.count(), 4);

        let mut updates = 0;
        events.drain(|event| {
            if matches!(event, ViewEvent::Updated) {
                updates += 1;
            }
        });
        assert_eq!(updates, 2);
    }
}
