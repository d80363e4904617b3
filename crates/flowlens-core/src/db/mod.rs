//! SQLite snapshot store.
//!
//! Runtime defaults are intentionally conservative:
//! - `journal_mode = WAL` so report readers never block the loader
//! - `busy_timeout = 5s` to reduce transient lock failures under contention

pub mod migrations;
pub mod query;
pub mod schema;
pub mod seed;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::{path::Path, time::Duration};

pub use query::{
    DateRange, SavedFilter, SnapshotColumn, SnapshotProvider, SnapshotQuery, WorkItemProvider,
    WorkItemQuery,
};

/// Busy timeout used for store connections.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Read handle over the snapshot database.
///
/// Implements [`SnapshotProvider`] and [`WorkItemProvider`].
#[derive(Debug)]
pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    /// Open (or create) the store at `path`, apply runtime pragmas, and
    /// migrate the schema to the latest version.
    ///
    /// # Errors
    ///
    /// Returns an error if opening/configuring/migrating the database fails,
    /// including [`crate::error::FlowError::SchemaMismatch`] for a store
    /// written by a newer flowlens.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open snapshot store {}", path.display()))?;

        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;

        Ok(Self { conn })
    }

    /// Open a migrated in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if migration fails.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory store")?;
        migrations::migrate(&mut conn).context("apply store migrations")?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection.
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_BUSY_TIMEOUT, SnapshotStore};
    use crate::db::migrations;
    use crate::error::FlowError;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn temp_db_path() -> (TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("nested/flowlens.sqlite3");
        (dir, path)
    }

    #[test]
    fn open_sets_wal_and_busy_timeout() {
        let (_dir, path) = temp_db_path();
        let store = SnapshotStore::open(&path).expect("open store");

        let journal_mode: String = store
            .conn()
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("query journal_mode");
        assert_eq!(journal_mode.to_ascii_lowercase(), "wal");

        let busy_timeout_ms: u64 = store
            .conn()
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .expect("query busy_timeout");
        assert_eq!(
            u128::from(busy_timeout_ms),
            DEFAULT_BUSY_TIMEOUT.as_millis()
        );
    }

    #[test]
    fn open_runs_migrations() {
        let (_dir, path) = temp_db_path();
        let store = SnapshotStore::open(&path).expect("open store");

        let version = migrations::current_schema_version(store.conn()).expect("schema version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn reopen_keeps_schema() {
        let (_dir, path) = temp_db_path();
        drop(SnapshotStore::open(&path).expect("first open"));
        let store = SnapshotStore::open(&path).expect("second open");
        let version = migrations::current_schema_version(store.conn()).expect("schema version");
        assert_eq!(version, migrations::LATEST_SCHEMA_VERSION);
    }

    #[test]
    fn open_refuses_a_newer_store() {
        let (_dir, path) = temp_db_path();
        drop(SnapshotStore::open(&path).expect("create store"));
        let conn = Connection::open(&path).expect("raw open");
        conn.pragma_update(None, "user_version", 7_i64).expect("bump version");
        drop(conn);

        let err = SnapshotStore::open(&path).expect_err("newer store must be refused");
        assert_eq!(
            err.downcast_ref::<FlowError>(),
            Some(&FlowError::SchemaMismatch {
                found: 7,
                expected: migrations::LATEST_SCHEMA_VERSION,
            })
        );
        assert_eq!(err.downcast_ref::<FlowError>().map(|e| e.code().code()), Some("E3002"));
    }
}
