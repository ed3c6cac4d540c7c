//! SQLite-backed record storage.
//!
//! Every record the store knows about lives as one JSON document in the
//! `kv` table, keyed by its record name.

use std::path::Path;
use std::time::Duration;

use chrono::Local;
use rusqlite::{params, Connection};

use super::{data_dir, migrations};
use crate::error::{DatabaseError, Result};
use crate::store::KvBackend;

/// How long a writer waits for another process's transaction to finish.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database holding the key/value records.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `<data dir>/questlog.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be resolved or the
    /// database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("questlog.db");
        Self::open_at(&path)
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        tracing::debug!(path = %path.display(), "opened database");
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        migrations::migrate(&self.conn)
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.kv_set_many(&[(key.to_string(), value.to_string())])
    }

    /// Write several values in one transaction. Either all land or none do.
    ///
    /// Inside an open [`KvBackend::begin`] transaction the rows join it.
    pub fn kv_set_many(&self, entries: &[(String, String)]) -> Result<(), rusqlite::Error> {
        if !self.conn.is_autocommit() {
            return Self::insert_entries(&self.conn, entries);
        }
        let tx = self.conn.unchecked_transaction()?;
        Self::insert_entries(&tx, entries)?;
        tx.commit()
    }

    fn insert_entries(
        conn: &Connection,
        entries: &[(String, String)],
    ) -> Result<(), rusqlite::Error> {
        let now = Local::now().naive_local().to_string();
        for (key, value) in entries {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )?;
        }
        Ok(())
    }

    /// Delete a value from the kv store.
    pub fn kv_delete(&self, key: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

impl KvBackend for Database {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.kv_get(key)?)
    }

    fn write_batch(&mut self, entries: &[(String, String)]) -> Result<()> {
        self.kv_set_many(entries)?;
        Ok(())
    }

    /// Take the write lock up front so reads inside the transaction cannot go
    /// stale under another process.
    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}
