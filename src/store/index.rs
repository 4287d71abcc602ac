// Persistent local track index
//
// Lives beside the audio files as `index.db`. Filename parsing remains the
// import/migration path; once imported, callers can list offline tracks
// without re-parsing directory listings.
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::error::Result;
use crate::store::ContentStore;

/// Index database filename inside the store root
pub const INDEX_FILE: &str = "index.db";

/// One indexed offline track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: String,
    pub path: String,
    pub title: String,
    pub artist: String,
    pub duration_secs: u32,
    pub added_at: String,
}

pub struct LocalIndex {
    conn: Arc<Mutex<Connection>>,
}

impl LocalIndex {
    /// Open (creating if needed) the index database inside the store root.
    pub fn open(store: &ContentStore) -> Result<Self> {
        store.ensure_root()?;
        let conn = Connection::open(store.root().join(INDEX_FILE))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory index, used by tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert or replace one track row.
    pub fn upsert(&self, record: &TrackRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO tracks (id, path, title, artist, duration_secs, added_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 path = excluded.path,
                 title = excluded.title,
                 artist = excluded.artist,
                 duration_secs = excluded.duration_secs",
            params![
                record.id,
                record.path,
                record.title,
                record.artist,
                record.duration_secs,
                record.added_at,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<TrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, path, title, artist, duration_secs, added_at
                 FROM tracks WHERE id = ?1",
                params![id],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn all(&self) -> Result<Vec<TrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, path, title, artist, duration_secs, added_at
             FROM tracks ORDER BY added_at, id",
        )?;
        let rows = stmt.query_map([], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute("DELETE FROM tracks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// One-shot migration: parse the store directory listing and insert any
    /// track the index does not know yet. Durations are probed best-effort.
    /// Returns the number of imported rows.
    pub fn import_from_store(&self, store: &ContentStore) -> Result<usize> {
        let mut imported = 0;
        for song in store.scan() {
            if self.get(&song.id)?.is_some() {
                debug!(id = %song.id, "already indexed, skipping");
                continue;
            }

            let path = store.resolve_path(&song);
            let duration_secs = crate::store::probe_duration(&path).unwrap_or(0);
            self.upsert(&TrackRecord {
                id: song.id,
                path: path.to_string_lossy().to_string(),
                title: song.title,
                artist: song.artist,
                duration_secs,
                added_at: Utc::now().to_rfc3339(),
            })?;
            imported += 1;
        }

        if imported > 0 {
            info!(imported, "imported tracks from store directory");
        }
        Ok(imported)
    }
}

impl Clone for LocalIndex {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tracks (
            id            TEXT PRIMARY KEY,
            path          TEXT NOT NULL,
            title         TEXT NOT NULL,
            artist        TEXT NOT NULL,
            duration_secs INTEGER NOT NULL DEFAULT 0,
            added_at      TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        title: row.get(2)?,
        artist: row.get(3)?,
        duration_secs: row.get(4)?,
        added_at: row.get(5)?,
    })
}
