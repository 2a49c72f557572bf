//! Scoped string key-value persistence.
//!
//! The engine only needs a handful of string entries per conversation, so the
//! store contract is a flat `(scope, key) -> value` map. [`Database`] backs it
//! with SQLite; [`MemoryStore`] is a clonable in-process map whose clones
//! share entries, which is how sibling tabs see each other's writes in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};

pub trait KeyValueStore: Send {
    fn get(&self, scope: &str, key: &str) -> Result<Option<String>>;

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove(&self, scope: &str, key: &str) -> Result<()>;
}

impl KeyValueStore for Database {
    fn get(&self, scope: &str, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM kv_entries WHERE scope = ?1 AND key = ?2",
                params![scope, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO kv_entries (scope, key, value, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (scope, key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![scope, key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, scope: &str, key: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM kv_entries WHERE scope = ?1 AND key = ?2",
            params![scope, key],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, scope: &str, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(&(scope.to_string(), key.to_string())).cloned())
    }

    fn set(&self, scope: &str, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert((scope.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn remove(&self, scope: &str, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.remove(&(scope.to_string(), key.to_string()));
        Ok(())
    }
}
