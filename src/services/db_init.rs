use std::time::Duration;

use rusqlite::Connection;

use crate::error::StoreError;

// Timestamps are epoch milliseconds. `prices.price` is NULL when no price
// could be read; 0 is a real (if odd) price.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    url           TEXT NOT NULL,
    target_price  REAL NOT NULL DEFAULT 0,
    last_alert_at INTEGER,
    created_at    INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS prices (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id    TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    checked_at INTEGER NOT NULL,
    price      REAL,
    status     TEXT NOT NULL,
    raw_text   TEXT
);

-- history and "latest sample" lookups
CREATE INDEX IF NOT EXISTS idx_prices_item ON prices (item_id, id DESC);
"#;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pragmas for the writer connection. WAL lets readers on other
/// connections see the last committed state without taking the writer gate.
pub fn configure_writer(conn: &Connection) -> Result<(), StoreError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        tracing::warn!("sqlite refused WAL mode (got {mode}); reads may wait on writes");
    }
    conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
    Ok(())
}

pub fn configure_reader(conn: &Connection) -> Result<(), StoreError> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

pub fn ensure_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

pub fn check_integrity(conn: &Connection) -> Result<(), StoreError> {
    let verdict: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(StoreError::Corrupt(verdict));
    }

    // make sure both tables are actually queryable
    conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get::<_, i64>(0))?;
    conn.query_row("SELECT COUNT(*) FROM prices", [], |row| row.get::<_, i64>(0))?;
    Ok(())
}
