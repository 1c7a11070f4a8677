//! SQL for the two table shapes
//!
//! Table names are interpolated directly into statement text. They are
//! expected to be developer-chosen constants, never end-user input.

use rusqlite::{Connection, Result};

/// Apply the write-ahead log and NORMAL sync pragmas
///
/// Returns the journal mode SQLite reports afterwards. In-memory databases
/// report `memory` since they cannot use a WAL file.
pub fn apply_pragmas(conn: &Connection) -> Result<String> {
    let mode = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
        row.get::<_, String>(0)
    })?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(mode)
}

/// Create a document table if it does not exist yet
pub fn create_document_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#
    ))
}

/// Create a signal table and its type index if they do not exist yet
pub fn create_signal_table(conn: &Connection, table: &str) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{table}" (
            id TEXT PRIMARY KEY,
            signal_type TEXT NOT NULL,
            sample_rate REAL,
            channels INTEGER,
            data BLOB NOT NULL,
            metadata TEXT,
            created_at INTEGER NOT NULL
        );

        -- Filtered listing by type
        CREATE INDEX IF NOT EXISTS "idx_{table}_signal_type" ON "{table}"(signal_type);
        "#
    ))
}

/// Check whether a table with this name exists
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
        .exists([table])
}

// ==================== Document statements ====================

/// `updated_at` moves forward by at least one millisecond on every replace,
/// even when the clock has not ticked since the previous write
pub(crate) fn upsert_document_sql(table: &str) -> String {
    format!(
        r#"
        INSERT INTO "{table}" (id, data, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?3)
        ON CONFLICT(id) DO UPDATE SET
            data = excluded.data,
            updated_at = MAX(excluded.updated_at, "{table}".updated_at + 1)
        "#
    )
}

pub(crate) fn select_document_sql(table: &str) -> String {
    format!(r#"SELECT id, data, created_at, updated_at FROM "{table}" WHERE id = ?1"#)
}

pub(crate) fn select_all_documents_sql(table: &str) -> String {
    format!(r#"SELECT id, data, created_at, updated_at FROM "{table}""#)
}

// ==================== Signal statements ====================

const SIGNAL_COLUMNS: &str = "id, signal_type, sample_rate, channels, data, metadata, created_at";

pub(crate) fn upsert_signal_sql(table: &str) -> String {
    format!(
        r#"
        INSERT INTO "{table}" ({SIGNAL_COLUMNS})
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            signal_type = excluded.signal_type,
            sample_rate = excluded.sample_rate,
            channels = excluded.channels,
            data = excluded.data,
            metadata = excluded.metadata
        "#
    )
}

pub(crate) fn select_signal_sql(table: &str) -> String {
    format!(r#"SELECT {SIGNAL_COLUMNS} FROM "{table}" WHERE id = ?1"#)
}

pub(crate) fn select_signals_sql(table: &str, filtered: bool) -> String {
    if filtered {
        format!(r#"SELECT {SIGNAL_COLUMNS} FROM "{table}" WHERE signal_type = ?1"#)
    } else {
        format!(r#"SELECT {SIGNAL_COLUMNS} FROM "{table}""#)
    }
}

// ==================== Shared statements ====================

pub(crate) fn delete_sql(table: &str) -> String {
    format!(r#"DELETE FROM "{table}" WHERE id = ?1"#)
}

pub(crate) fn count_sql(table: &str) -> String {
    format!(r#"SELECT COUNT(*) FROM "{table}""#)
}
