//! Additive, idempotent column migrations.
//!
//! Each migration only ever adds a nullable column. Running one against a database that already
//! has the column reports [`MigrationOutcome::AlreadyPresent`] instead of failing, so migrations
//! and reconciliation passes can run in either order.

use std::fmt;

use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use super::schema::{table_columns, APPLICATIONS_TABLE};

/// Adds `column` with `definition` to `table` when missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMigration {
    pub name: &'static str,
    pub table: &'static str,
    pub column: &'static str,
    pub definition: &'static str,
}

pub const ADD_APPLICATION_CLAIMED_AT: ColumnMigration = ColumnMigration {
    name: "add_membership_applications_claimed_at",
    table: APPLICATIONS_TABLE,
    column: "claimed_at",
    definition: "TEXT",
};

/// Every known migration, in application order.
pub const MIGRATIONS: &[ColumnMigration] = &[ADD_APPLICATION_CLAIMED_AT];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationOutcome {
    Added,
    AlreadyPresent,
}

impl fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationOutcome::Added => f.write_str("added"),
            MigrationOutcome::AlreadyPresent => f.write_str("already present"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub name: &'static str,
    pub outcome: MigrationOutcome,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("cannot migrate missing table '{0}'")]
    MissingTable(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("migration {name} failed: {source}")]
    Sqlite {
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

pub fn apply_column_migration(
    conn: &Connection,
    migration: &ColumnMigration,
) -> Result<MigrationOutcome, MigrationError> {
    let sqlite_error = |source| MigrationError::Sqlite {
        name: migration.name,
        source,
    };

    let columns = table_columns(conn, migration.table).map_err(sqlite_error)?;
    if columns.is_empty() {
        return Err(MigrationError::MissingTable(migration.table));
    }
    if columns.contains(migration.column) {
        return Ok(MigrationOutcome::AlreadyPresent);
    }

    let statement = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        migration.table, migration.column, migration.definition
    );
    match conn.execute_batch(&statement) {
        Ok(()) => {
            info!(migration = migration.name, "added column");
            Ok(MigrationOutcome::Added)
        }
        // A concurrent run added it between the check and the ALTER.
        Err(err) if is_duplicate_column(&err) => Ok(MigrationOutcome::AlreadyPresent),
        Err(err) => Err(sqlite_error(err)),
    }
}

pub fn apply_all(conn: &Connection) -> Result<Vec<MigrationReport>, MigrationError> {
    MIGRATIONS
        .iter()
        .map(|migration| {
            apply_column_migration(conn, migration).map(|outcome| MigrationReport {
                name: migration.name,
                outcome,
            })
        })
        .collect()
}

fn is_duplicate_column(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(message))
            if message.contains("duplicate column name")
    )
}
