//! Connection handling of the Run Store.
//!
//! The database is shared between the orchestrator host and the workers
//! through a network file system. Write-ahead logging relies on shared
//! memory that such file systems do not provide, so the rollback journal is
//! used and writers wait on the database lock instead of failing.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ptp_perf_common::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::debug;

use crate::schema::initialize_schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloneable handle on the Run Store.
///
/// All clones share one connection, every operation holds it for the
/// duration of a single statement or transaction.
#[derive(Clone)]
pub struct RunStore {
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for RunStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunStore").finish_non_exhaustive()
    }
}

impl RunStore {
    /// Opens (and if needed creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let connection = Connection::open_with_flags(path, flags)?;
        debug!(path = %path.display(), "Opened run store");
        Self::from_connection(connection)
    }

    /// A private database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut connection: Connection) -> Result<Self> {
        apply_pragmas(&connection)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub(crate) fn with_connection<T>(
        &self,
        operation: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut connection = self.connection.lock();
        Ok(operation(&mut connection)?)
    }
}

fn apply_pragmas(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection.execute_batch("PRAGMA journal_mode = DELETE;")?;
    connection.execute_batch("PRAGMA synchronous = FULL;")?;
    connection.busy_timeout(BUSY_TIMEOUT)
}

pub(crate) fn to_micros(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_micros()
}

pub(crate) fn timestamp_at(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let micros: i64 = row.get(index)?;
    DateTime::from_timestamp_micros(micros)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(index, micros))
}

pub(crate) fn optional_timestamp_at(
    row: &Row<'_>,
    index: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let micros: Option<i64> = row.get(index)?;
    micros
        .map(|micros| {
            DateTime::from_timestamp_micros(micros)
                .ok_or(rusqlite::Error::IntegralValueOutOfRange(index, micros))
        })
        .transpose()
}

/// Reads a text column through `FromStr`.
pub(crate) fn parsed_at<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(index)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_schema_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ptp-perf.sqlite3");

        let store = RunStore::open(&path).unwrap();
        drop(store);
        // A second open finds the existing schema.
        let store = RunStore::open(&path).unwrap();

        let version: i64 = store
            .with_connection(|c| c.query_row("SELECT version FROM store_meta", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(version, crate::schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let store = RunStore::open_in_memory().unwrap();
        let enabled: i64 = store
            .with_connection(|c| c.query_row("PRAGMA foreign_keys", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
