//! SQL DDL for the thought journal.
//!
//! Defines the `thoughts` table with its listing indexes, and `schema_meta`.
//! All DDL uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// Base (v1) schema.
const SCHEMA_SQL: &str = r#"
-- Analyzed thoughts; AUTOINCREMENT keeps ids from ever being reused
CREATE TABLE IF NOT EXISTS thoughts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_text TEXT NOT NULL CHECK(length(trim(raw_text)) > 0),
    summary TEXT,
    sentiment TEXT CHECK(sentiment IS NULL OR sentiment IN ('positive','neutral','negative')),
    confidence REAL CHECK(confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0)),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK((sentiment IS NULL) = (confidence IS NULL))
);

CREATE INDEX IF NOT EXISTS idx_thoughts_created ON thoughts(created_at);
CREATE INDEX IF NOT EXISTS idx_thoughts_sentiment ON thoughts(sentiment);
-- Serves the sentiment-filtered, newest-first listing
CREATE INDEX IF NOT EXISTS idx_thoughts_sentiment_created
    ON thoughts(sentiment, created_at DESC, id DESC);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
