//! Storage layer for dwell's local state.
//!
//! Provides a [`StateStore`] backed by `rusqlite`, standing in for the
//! browser's extension storage: one row per key, each holding an opaque
//! JSON blob that is replaced wholesale on every write.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The tracker runs on a single thread and shares one handle between the
//! pending buffer and the credential store through `Rc<Database>`.
//!
//! # Schema
//!
//! `state(key, value, updated_at)`. Timestamps are stored as TEXT in
//! ISO 8601 format (e.g., `2024-01-15T10:30:00Z`).

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use dwell_core::{StateStore, StoreError};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::backend(err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Summary of one stored key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub key: String,
    pub bytes: usize,
    pub updated_at: String,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>, DbError> {
        let value = self
            .conn
            .query_row("SELECT value FROM state WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Replaces the value stored under `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.conn.execute(
            "
            INSERT INTO state (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, now],
        )?;
        Ok(())
    }

    /// Deletes `key`, returning whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool, DbError> {
        let deleted = self.conn.execute("DELETE FROM state WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Lists stored keys with their size and last write time.
    pub fn entries(&self) -> Result<Vec<StateEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT key, LENGTH(CAST(value AS BLOB)), updated_at
            FROM state
            ORDER BY key ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StateEntry {
                key: row.get(0)?,
                bytes: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

impl StateStore for Database {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get(key)?)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, value)?;
        tracing::trace!(key, bytes = value.len(), "state saved");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.delete(key)?;
        Ok(())
    }
}
