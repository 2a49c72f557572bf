//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. Every tab (engine instance)
//! opens its own connection to the same file; writes are not transactional
//! across tabs, the last writer wins.

use std::path::{Path, PathBuf};

use chatsync_shared::constants::APP_NAME;
use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/chatsync/chatsync.db`
    /// - macOS:   `~/Library/Application Support/com.chatsync.chatsync/chatsync.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\chatsync\chatsync\data\chatsync.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", APP_NAME, APP_NAME).ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join("chatsync.db");

        tracing::info!(path = %db_path.display(), "opening read-state database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets sibling tabs read while one of them writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_millis(250))?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}
