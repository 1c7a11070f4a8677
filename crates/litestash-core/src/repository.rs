//! Repository handle
//!
//! `Repository` owns the single connection to a database file and exposes
//! CRUD for the two table shapes:
//!
//! - **Document tables**: `id`, JSON `data`, `created_at`, `updated_at`
//! - **Signal tables**: `id`, `signal_type`, optional `sample_rate` and
//!   `channels`, binary `data`, optional JSON `metadata`, `created_at`
//!
//! The handle is `Send` but not `Sync`. Callers needing shared access either
//! serialize their calls or open independent handles; see `AsyncRepository`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::models::{from_millis, now_millis, Document, Signal, SignalRecord};
use crate::schema;

/// Handle to one embedded database file
pub struct Repository {
    /// `None` once closed
    conn: Option<Connection>,
    /// `None` for in-memory databases
    path: Option<PathBuf>,
    /// Journal mode reported by SQLite after the pragmas were applied
    journal_mode: String,
}

impl Repository {
    /// Open or create the database at `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_config(&Config::with_db_path(path.as_ref()))
    }

    /// Open or create the database described by `config`
    ///
    /// Missing parent directories are created. Write-ahead logging and
    /// NORMAL synchronous mode are applied before the handle is returned.
    pub fn open_with_config(config: &Config) -> StoreResult<Self> {
        let path = config.db_path.clone();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::from_open(e, path.clone()))?;
            }
        }

        let conn = Connection::open(&path).map_err(|e| StoreError::from_open(e, path.clone()))?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| StoreError::from_open(e, path.clone()))?;
        let journal_mode =
            schema::apply_pragmas(&conn).map_err(|e| StoreError::from_open(e, path.clone()))?;

        info!("Opened repository at {:?} (journal_mode={})", path, journal_mode);

        Ok(Self {
            conn: Some(conn),
            path: Some(path),
            journal_mode,
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let journal_mode = schema::apply_pragmas(&conn)?;

        debug!("Opened in-memory repository");

        Ok(Self {
            conn: Some(conn),
            path: None,
            journal_mode,
        })
    }

    /// Release the connection
    ///
    /// Every later operation fails with `StoreError::Closed`. Closing an
    /// already closed handle does nothing.
    pub fn close(&mut self) -> StoreResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        match conn.close() {
            Ok(()) => {
                info!("Closed repository at {:?}", self.path);
                Ok(())
            }
            // The returned connection is dropped here, which releases it anyway
            Err((_conn, e)) => {
                warn!("Error while closing repository at {:?}: {}", self.path, e);
                Err(StoreError::Database(e))
            }
        }
    }

    /// Check whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Path of the database file, or `None` for in-memory databases
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Journal mode in effect (`wal` for file databases)
    pub fn journal_mode(&self) -> &str {
        &self.journal_mode
    }

    pub(crate) fn conn(&self) -> StoreResult<&Connection> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    // ==================== Table Management ====================

    /// Create a document table; does nothing if it already exists
    pub fn create_document_table(&self, table: &str) -> StoreResult<()> {
        schema::create_document_table(self.conn()?, table)?;
        debug!("Ensured document table {}", table);
        Ok(())
    }

    /// Create a signal table; does nothing if it already exists
    pub fn create_signal_table(&self, table: &str) -> StoreResult<()> {
        schema::create_signal_table(self.conn()?, table)?;
        debug!("Ensured signal table {}", table);
        Ok(())
    }

    /// Check whether a table exists
    pub fn table_exists(&self, table: &str) -> StoreResult<bool> {
        Ok(schema::table_exists(self.conn()?, table)?)
    }

    /// Number of rows in a table of either shape
    pub fn count(&self, table: &str) -> StoreResult<u64> {
        let count: i64 = self
            .conn()?
            .prepare_cached(&schema::count_sql(table))?
            .query_row([], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    // ==================== Document Operations ====================

    /// Insert a document, or replace its data if `id` already exists
    ///
    /// `updated_at` advances on every call; `created_at` keeps the time of
    /// the first insert.
    pub fn upsert<T>(&self, table: &str, id: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_string(value).map_err(|source| StoreError::Serialization {
            table: table.to_string(),
            id: id.to_string(),
            source,
        })?;

        self.conn()?
            .prepare_cached(&schema::upsert_document_sql(table))?
            .execute(params![id, data, now_millis()])?;
        Ok(())
    }

    /// Get a document's data by id
    ///
    /// Returns `Ok(None)` when no row has this id.
    pub fn get<T: DeserializeOwned>(&self, table: &str, id: &str) -> StoreResult<Option<T>> {
        Ok(self.get_document(table, id)?.map(|doc| doc.data))
    }

    /// Get a document with its timestamps
    pub fn get_document<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> StoreResult<Option<Document<T>>> {
        let row = self
            .conn()?
            .prepare_cached(&schema::select_document_sql(table))?
            .query_row([id], DocumentRow::from_row)
            .optional()?;

        row.map(|row| row.decode(table)).transpose()
    }

    /// Get every document's data in the table
    ///
    /// Order is whatever SQLite's table scan yields.
    pub fn get_all<T: DeserializeOwned>(&self, table: &str) -> StoreResult<Vec<T>> {
        let mut items = Vec::new();
        self.for_each(table, |doc: Document<T>| {
            items.push(doc.data);
            Ok(())
        })?;
        Ok(items)
    }

    /// Visit every document, decoding one row at a time
    ///
    /// All rows come from a single statement, so they share one read
    /// snapshot. An error from `visit` stops the scan and is returned.
    pub fn for_each<T, F>(&self, table: &str, mut visit: F) -> StoreResult<()>
    where
        T: DeserializeOwned,
        F: FnMut(Document<T>) -> StoreResult<()>,
    {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&schema::select_all_documents_sql(table))?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let doc = DocumentRow::from_row(row)?.decode(table)?;
            visit(doc)?;
        }

        Ok(())
    }

    /// Delete a document; returns whether a row was removed
    pub fn delete(&self, table: &str, id: &str) -> StoreResult<bool> {
        self.delete_row(table, id)
    }

    // ==================== Signal Operations ====================

    /// Insert a signal, or replace every non-key column if `id` exists
    ///
    /// `created_at` is set on first insert only. A NaN or infinite sample
    /// rate is rejected with `StoreError::InvalidSignal`.
    pub fn upsert_signal(&self, table: &str, signal: &Signal) -> StoreResult<()> {
        if let Some(rate) = signal.sample_rate {
            // SQLite stores NaN as NULL, which would read back as "no rate"
            if !rate.is_finite() {
                return Err(StoreError::InvalidSignal {
                    id: signal.id.clone(),
                    reason: format!("sample rate must be finite, got {rate}"),
                });
            }
        }

        let metadata = signal
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| StoreError::Serialization {
                table: table.to_string(),
                id: signal.id.clone(),
                source,
            })?;

        self.conn()?
            .prepare_cached(&schema::upsert_signal_sql(table))?
            .execute(params![
                signal.id,
                signal.signal_type,
                signal.sample_rate,
                signal.channels,
                signal.data,
                metadata,
                now_millis(),
            ])?;
        Ok(())
    }

    /// Get a signal by id
    pub fn get_signal(&self, table: &str, id: &str) -> StoreResult<Option<SignalRecord>> {
        let row = self
            .conn()?
            .prepare_cached(&schema::select_signal_sql(table))?
            .query_row([id], SignalRow::from_row)
            .optional()?;

        row.map(|row| row.decode(table)).transpose()
    }

    /// Get all signals, or only those whose type equals `signal_type` exactly
    pub fn get_signals(
        &self,
        table: &str,
        signal_type: Option<&str>,
    ) -> StoreResult<Vec<SignalRecord>> {
        let mut signals = Vec::new();
        self.for_each_signal(table, signal_type, |record| {
            signals.push(record);
            Ok(())
        })?;
        Ok(signals)
    }

    /// Visit signals one row at a time, optionally filtered by type
    pub fn for_each_signal<F>(
        &self,
        table: &str,
        signal_type: Option<&str>,
        mut visit: F,
    ) -> StoreResult<()>
    where
        F: FnMut(SignalRecord) -> StoreResult<()>,
    {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare_cached(&schema::select_signals_sql(table, signal_type.is_some()))?;
        let mut rows = match signal_type {
            Some(signal_type) => stmt.query([signal_type])?,
            None => stmt.query([])?,
        };

        while let Some(row) = rows.next()? {
            let record = SignalRow::from_row(row)?.decode(table)?;
            visit(record)?;
        }

        Ok(())
    }

    /// Delete a signal; returns whether a row was removed
    pub fn delete_signal(&self, table: &str, id: &str) -> StoreResult<bool> {
        self.delete_row(table, id)
    }

    fn delete_row(&self, table: &str, id: &str) -> StoreResult<bool> {
        let removed = self
            .conn()?
            .prepare_cached(&schema::delete_sql(table))?
            .execute([id])?;
        Ok(removed > 0)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .field("journal_mode", &self.journal_mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ==================== Row Mapping ====================

/// Raw document row before JSON decoding
struct DocumentRow {
    id: String,
    data: String,
    created_at: i64,
    updated_at: i64,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            data: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn decode<T: DeserializeOwned>(self, table: &str) -> StoreResult<Document<T>> {
        let data = serde_json::from_str(&self.data).map_err(|source| {
            StoreError::Deserialization {
                table: table.to_string(),
                id: self.id.clone(),
                source,
            }
        })?;

        Ok(Document {
            id: self.id,
            data,
            created_at: from_millis(self.created_at),
            updated_at: from_millis(self.updated_at),
        })
    }
}

/// Raw signal row before metadata decoding
struct SignalRow {
    id: String,
    signal_type: String,
    sample_rate: Option<f64>,
    channels: Option<i64>,
    data: Vec<u8>,
    metadata: Option<String>,
    created_at: i64,
}

impl SignalRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            signal_type: row.get(1)?,
            sample_rate: row.get(2)?,
            channels: row.get(3)?,
            data: row.get(4)?,
            metadata: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn decode(self, table: &str) -> StoreResult<SignalRecord> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|source| StoreError::Deserialization {
                table: table.to_string(),
                id: self.id.clone(),
                source,
            })?;

        Ok(SignalRecord {
            signal: Signal {
                id: self.id,
                signal_type: self.signal_type,
                sample_rate: self.sample_rate,
                channels: self.channels,
                data: self.data,
                metadata,
            },
            created_at: from_millis(self.created_at),
        })
    }
}
