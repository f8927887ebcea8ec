//! Database connection manager with scoped read/write transactions.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use locus_domain::{LocusError, Result};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use tracing::info;

use crate::errors::map_sql_error;

const SCHEMA_VERSION: i32 = 1;
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Owns the database connection and exposes the two transaction scopes
/// the timeline core is written against: `read` observes a consistent
/// snapshot, `write` commits atomically. The connection mutex serialises
/// all writers.
pub struct DbManager {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl DbManager {
    /// Open (or create) the database at the given path.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(map_sql_error)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(map_sql_error)?;
        conn.pragma_update(None, "foreign_keys", "ON").map_err(map_sql_error)?;

        info!(db_path = %path.display(), "database opened");
        Ok(Self { conn: Mutex::new(conn), path })
    }

    /// Run a read scope.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run a write scope inside one immediate transaction. The scope's
    /// error rolls the transaction back.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        let value = f(&tx)?;
        tx.commit().map_err(map_sql_error)?;
        Ok(value)
    }

    /// Ensure the full schema exists on the current database.
    pub fn run_migrations(&self) -> Result<()> {
        self.write(|tx| {
            tx.execute_batch(SCHEMA_SQL).map_err(map_sql_error)?;
            tx.execute(
                "INSERT OR IGNORE INTO schema_version (version, applied_at)
                 VALUES (?1, CAST(strftime('%s','now') AS INTEGER))",
                params![SCHEMA_VERSION],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
    }

    /// Verify the database is reachable and responding.
    pub fn health_check(&self) -> Result<()> {
        self.read(|conn| {
            conn.query_row("SELECT 1", params![], |row| row.get::<_, i32>(0))
                .map_err(map_sql_error)?;
            Ok(())
        })
    }

    /// Return the configured database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| LocusError::Database("connection mutex poisoned".into()))
    }
}
