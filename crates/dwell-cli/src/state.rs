//! Opening the local state shared by every command.

use std::rc::Rc;

use anyhow::{Context, Result};
use chrono::Utc;

use dwell_core::{PendingBuffer, SessionTracker, TokenStore};
use dwell_db::Database;
use dwell_upload::CollectorClient;

use crate::Config;

/// Store handle shared by the buffer and the credential.
pub type SharedDb = Rc<Database>;

/// Persisted tracker state: the pending buffer and the credential.
pub struct LocalState {
    pub db: SharedDb,
    pub buffer: PendingBuffer<SharedDb>,
    pub tokens: TokenStore<SharedDb>,
}

impl LocalState {
    /// Opens the database named in `config`, creating its directory if needed,
    /// and loads the buffer and credential from it.
    pub fn open(config: &Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create database directory")?;
        }
        let db = Database::open(&config.database_path)
            .with_context(|| format!("failed to open {}", config.database_path.display()))?;
        Self::from_database(db, config)
    }

    /// Loads the buffer and credential from an already-open database.
    pub fn from_database(db: Database, config: &Config) -> Result<Self> {
        let db = Rc::new(db);
        let buffer = PendingBuffer::load(Rc::clone(&db), config.buffer_limits())
            .context("failed to load pending buffer")?;
        let tokens = TokenStore::load(Rc::clone(&db)).context("failed to load credential")?;
        Ok(Self { db, buffer, tokens })
    }
}

/// Builds the collector client from configuration.
pub fn collector_client(config: &Config) -> Result<CollectorClient> {
    CollectorClient::with_timeout(&config.collector_url, config.request_timeout())
        .context("failed to create collector client")
}

/// A tracker that starts idle now.
pub fn session_tracker(config: &Config) -> SessionTracker {
    SessionTracker::new(config.min_seconds_to_log, Utc::now())
}
