// Copyright 2026 Lexicon Contributors
// SPDX-License-Identifier: Apache-2.0

//! SQLite-backed pattern store.

use super::store::PatternStore;
use super::{Pattern, ScrapedItem};
use crate::error::{HarvestError, Result};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Patterns and scraped items in a single SQLite file.
pub struct SqlitePatternStore {
    db: Mutex<Connection>,
}

impl SqlitePatternStore {
    /// Open or create a store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| HarvestError::Store(format!("{}: {e}", parent.display())))?;
            }
        }
        let db = Connection::open(path)?;
        debug!(path = %path.display(), "opened pattern store");
        Self::init(db)
    }

    /// A throwaway store that lives in memory.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE IF NOT EXISTS patterns (
                name TEXT PRIMARY KEY,
                organ_id TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                fields TEXT NOT NULL,
                created_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS items (
                pattern TEXT NOT NULL REFERENCES patterns(name) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (pattern, position)
             );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn exists(db: &Connection, name: &str) -> Result<bool> {
        let found: i64 = db.query_row(
            "SELECT COUNT(*) FROM patterns WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(found > 0)
    }
}

fn row_to_pattern(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode_pattern(raw: (String, String, String, String, String)) -> Result<Pattern> {
    let (name, organ_id, fingerprint, fields, created_at) = raw;
    Ok(Pattern {
        name,
        organ_id,
        fingerprint: serde_json::from_str(&fingerprint)?,
        fields: serde_json::from_str(&fields)?,
        created_at,
    })
}

impl PatternStore for SqlitePatternStore {
    fn insert(&self, pattern: &Pattern) -> Result<()> {
        let fingerprint = serde_json::to_string(&pattern.fingerprint)?;
        let fields = serde_json::to_string(&pattern.fields)?;
        let result = self.conn().execute(
            "INSERT INTO patterns (name, organ_id, fingerprint, fields, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                pattern.name,
                pattern.organ_id,
                fingerprint,
                fields,
                pattern.created_at
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(HarvestError::PatternExists(pattern.name.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, name: &str) -> Result<Option<Pattern>> {
        let db = self.conn();
        let result = db.query_row(
            "SELECT name, organ_id, fingerprint, fields, created_at FROM patterns WHERE name = ?1",
            params![name],
            row_to_pattern,
        );

        match result {
            Ok(raw) => decode_pattern(raw).map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<Pattern>> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT name, organ_id, fingerprint, fields, created_at FROM patterns ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], row_to_pattern)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(decode_pattern).collect()
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM patterns WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    fn save_items(&self, name: &str, items: &[ScrapedItem]) -> Result<()> {
        let mut db = self.conn();
        if !Self::exists(&db, name)? {
            return Err(HarvestError::PatternNotFound(name.to_string()));
        }

        let tx = db.transaction()?;
        tx.execute("DELETE FROM items WHERE pattern = ?1", params![name])?;
        for (position, item) in items.iter().enumerate() {
            tx.execute(
                "INSERT INTO items (pattern, position, data) VALUES (?1, ?2, ?3)",
                params![name, position as i64, serde_json::to_string(item)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn items(&self, name: &str) -> Result<Vec<ScrapedItem>> {
        let db = self.conn();
        if !Self::exists(&db, name)? {
            return Err(HarvestError::PatternNotFound(name.to_string()));
        }

        let mut stmt = db.prepare("SELECT data FROM items WHERE pattern = ?1 ORDER BY position")?;
        let raw = stmt
            .query_map(params![name], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.iter()
            .map(|data| serde_json::from_str(data).map_err(HarvestError::from))
            .collect()
    }
}
