//! Database migration runner.
//!
//! Migrations run on every [`Database::open_at`](crate::Database::open_at)
//! call. Each one is guarded by the `user_version` pragma so it applies
//! exactly once.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
const CURRENT_VERSION: u32 = 1;

/// Run all pending migrations against the open connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::debug!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking store migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        v001_initial::up(conn).map_err(|e| StoreError::Migration(e.to_string()))?;
        conn.pragma_update(None, "user_version", 1)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
