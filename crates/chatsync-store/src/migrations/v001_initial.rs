//! v001 -- Initial schema creation.
//!
//! One table of string entries, partitioned by scope so several
//! conversations can share a database file.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv_entries (
    scope      TEXT NOT NULL,                 -- e.g. "chat:default"
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL,                 -- RFC-3339
    PRIMARY KEY (scope, key)
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
