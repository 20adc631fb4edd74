//! Shared test fixtures
//!
//! A small track record bound to an in-memory store, used across the
//! module test suites.

use std::sync::Arc;

use rusqlite::params;

use crate::config::EngineConfig;
use crate::db::Database;
use crate::models::{ColumnSpec, ColumnType, Record, Value};
use crate::schema::RecordStore;

/// Sample record used by the tests
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Track {
    pub track_id: i64,
    pub title: String,
    pub artist_id: i64,
    pub duration_secs: i64,
    pub rating: i64,
}

static TRACK_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("track_id", ColumnType::Integer).primary_key(),
    ColumnSpec::new("title", ColumnType::Text)
        .not_null()
        .indexed("idx_tracks_title"),
    ColumnSpec::new("artist_id", ColumnType::Integer)
        .not_null()
        .default_value("0")
        .indexed("idx_tracks_artist"),
    ColumnSpec::new("duration_secs", ColumnType::Integer)
        .not_null()
        .default_value("0"),
    ColumnSpec::new("rating", ColumnType::Integer)
        .not_null()
        .default_value("0"),
];

impl Record for Track {
    fn table_name() -> &'static str {
        "tracks"
    }

    fn columns() -> &'static [ColumnSpec] {
        TRACK_COLUMNS
    }

    fn primary_key(&self) -> i64 {
        self.track_id
    }

    fn set_primary_key(&mut self, key: i64) {
        self.track_id = key;
    }

    fn bind(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.track_id),
            Value::Text(self.title.clone()),
            Value::Integer(self.artist_id),
            Value::Integer(self.duration_secs),
            Value::Integer(self.rating),
        ]
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Track {
            track_id: row.get(0)?,
            title: row.get(1)?,
            artist_id: row.get(2)?,
            duration_secs: row.get(3)?,
            rating: row.get(4)?,
        })
    }
}

/// A track with the given fields and no key assigned yet
pub(crate) fn sample_track(title: &str, artist_id: i64, duration_secs: i64) -> Track {
    Track {
        title: title.to_string(),
        artist_id,
        duration_secs,
        ..Track::default()
    }
}

/// An in-memory database with the track store bound
pub(crate) fn track_store() -> (Database, Arc<RecordStore<Track>>) {
    let db = Database::open(&EngineConfig::testing()).unwrap();
    let store = Arc::new(RecordStore::<Track>::bind(&db).unwrap());
    (db, store)
}

/// Insert a track row with an explicit primary key
pub(crate) fn insert_track_with_key(
    db: &Database,
    key: i64,
    title: &str,
    artist_id: i64,
    duration_secs: i64,
) {
    db.execute(
        "INSERT INTO tracks (track_id, title, artist_id, duration_secs, rating) \
         VALUES (?, ?, ?, ?, 0)",
        params![key, title, artist_id, duration_secs],
    )
    .unwrap();
}
