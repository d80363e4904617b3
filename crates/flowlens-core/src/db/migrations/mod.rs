//! Schema versioning for the snapshot store.
//!
//! The version lives in `PRAGMA user_version` and is mirrored into
//! `store_meta`. A store written by a newer flowlens is refused rather than
//! read with a schema this binary does not know.

use anyhow::{Context, Result};
use rusqlite::{Connection, types::Type};

use super::schema;
use crate::error::FlowError;

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 1;

const MIGRATIONS: &[(u32, &str)] = &[(1, schema::MIGRATION_V1_SQL)];

/// Read `PRAGMA user_version` and convert it to a Rust `u32`.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the version value cannot be
/// represented as `u32`.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Bring the store up to [`LATEST_SCHEMA_VERSION`] and return the version
/// it ends at.
///
/// Pending steps run in ascending order, one transaction each. A store
/// already at the latest version is left untouched.
///
/// # Errors
///
/// Returns [`FlowError::SchemaMismatch`] when the store is newer than this
/// binary, or an error if a migration step fails.
pub fn migrate(conn: &mut Connection) -> Result<u32> {
    let found = current_schema_version(conn).context("read store schema version")?;
    if found > LATEST_SCHEMA_VERSION {
        return Err(FlowError::SchemaMismatch {
            found,
            expected: LATEST_SCHEMA_VERSION,
        }
        .into());
    }

    let pending = MIGRATIONS.iter().filter(|(version, _)| *version > found);
    let mut current = found;
    for &(version, sql) in pending {
        apply_step(conn, version, sql)
            .with_context(|| format!("migrate store to schema v{version}"))?;
        current = version;
    }
    Ok(current)
}

fn apply_step(conn: &mut Connection, version: u32, sql: &str) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(sql)?;
    tx.pragma_update(None, "user_version", i64::from(version))?;
    tx.execute(
        "UPDATE store_meta SET schema_version = ?1 WHERE id = 1",
        [i64::from(version)],
    )?;
    tx.commit()
}
