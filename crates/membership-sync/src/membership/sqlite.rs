use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row, ToSql};
use tracing::{debug, warn};

use super::domain::{
    parse_timestamp, ApplicationId, ApplicationStatus, MembershipApplication, User, UserId,
};
use super::migrations::{self, MigrationError, MigrationReport};
use super::repository::{MembershipStore, StoreError};
use super::schema::{
    optional_column, table_columns, APPLICATIONS_TABLE, BASE_SCHEMA, UNIQUE_OWNER_INDEX,
    USERS_TABLE,
};

/// [`MembershipStore`] backed by a single SQLite file.
///
/// Every insert runs in autocommit mode, so each row is atomic on its own and a failure on one
/// user never rolls back another.
pub struct SqliteMembershipStore {
    conn: Mutex<Connection>,
}

/// How long a statement waits on another connection's lock before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl SqliteMembershipStore {
    /// Opens an existing database without touching its schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self::from_connection(conn))
    }

    /// Fresh in-memory database with the baseline schema applied.
    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Self::from_connection(Connection::open_in_memory()?);
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Creates the baseline tables and the one-application-per-user index when missing.
    pub fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(BASE_SCHEMA)?;

        // Legacy tables may already hold duplicates; the guarded insert still prevents new ones.
        if let Err(err) = conn.execute_batch(UNIQUE_OWNER_INDEX) {
            if is_constraint_violation(&err) {
                warn!(error = %err, "unique owner index not created; duplicate applications exist");
            } else {
                return Err(err.into());
            }
        }
        Ok(())
    }

    pub fn apply_migrations(&self) -> Result<Vec<MigrationReport>, MigrationError> {
        let conn = self
            .lock()
            .map_err(|err| MigrationError::Unavailable(err.to_string()))?;
        migrations::apply_all(&conn)
    }

    /// Inserts an account row. Reconciliation never calls this; it exists for seeding and tests.
    pub fn insert_user(&self, user: &User) -> Result<UserId, StoreError> {
        let conn = self.lock()?;
        let created_at = user.created_at.unwrap_or_else(Utc::now);
        conn.execute(
            "INSERT INTO users (id, email, role, account_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.0,
                user.email,
                user.role,
                user.account_status,
                format_timestamp(created_at),
            ],
        )?;
        Ok(user.id)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

impl MembershipStore for SqliteMembershipStore {
    fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let conn = self.lock()?;
        let columns = table_columns(&conn, USERS_TABLE)?;
        if columns.is_empty() {
            return Err(StoreError::MissingTable(USERS_TABLE));
        }

        let optional = ["email", "role", "account_status", "created_at"];
        for name in optional.iter().filter(|name| !columns.contains(**name)) {
            debug!(table = USERS_TABLE, column = name, "optional column absent, reading as NULL");
        }

        let projection: Vec<String> = optional
            .iter()
            .map(|name| optional_column(&columns, name))
            .collect();
        let sql = format!(
            "SELECT id, {} FROM {USERS_TABLE} ORDER BY id",
            projection.join(", ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_user)?;
        let users = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn list_applications(&self) -> Result<Vec<MembershipApplication>, StoreError> {
        let conn = self.lock()?;
        let columns = table_columns(&conn, APPLICATIONS_TABLE)?;
        if columns.is_empty() {
            return Err(StoreError::MissingTable(APPLICATIONS_TABLE));
        }
        if !columns.contains("claimed_at") {
            debug!(
                table = APPLICATIONS_TABLE,
                "claimed_at column absent, reading as NULL"
            );
        }

        let sql = format!(
            "SELECT id, user_id, {}, {}, {} FROM {APPLICATIONS_TABLE} ORDER BY id",
            optional_column(&columns, "status"),
            optional_column(&columns, "created_at"),
            optional_column(&columns, "claimed_at"),
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_application)?;
        let mut applications = Vec::new();
        for row in rows {
            match row? {
                Ok(application) => applications.push(application),
                // An application without a readable owner cannot cover any user.
                Err(orphan) => warn!(
                    application_id = %orphan.id,
                    owner = ?orphan.raw_owner,
                    "skipping membership application without a usable user_id"
                ),
            }
        }
        Ok(applications)
    }

    fn insert_application(
        &self,
        user_id: UserId,
        initial_status: &ApplicationStatus,
    ) -> Result<ApplicationId, StoreError> {
        let conn = self.lock()?;
        let columns = table_columns(&conn, APPLICATIONS_TABLE)?;
        if columns.is_empty() {
            return Err(StoreError::MissingTable(APPLICATIONS_TABLE));
        }

        let mut targets = vec!["user_id"];
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.0)];
        if columns.contains("status") {
            targets.push("status");
            values.push(Box::new(initial_status.as_str().to_string()));
        }
        if columns.contains("created_at") {
            targets.push("created_at");
            values.push(Box::new(format_timestamp(Utc::now())));
        }
        let placeholders: Vec<String> = (1..=targets.len()).map(|n| format!("?{n}")).collect();

        // The NOT EXISTS guard keeps legacy tables without the unique index duplicate-free.
        let sql = format!(
            "INSERT INTO {APPLICATIONS_TABLE} ({})
             SELECT {}
             WHERE NOT EXISTS (
                 SELECT 1 FROM {APPLICATIONS_TABLE} WHERE user_id = ?1
             )",
            targets.join(", "),
            placeholders.join(", "),
        );
        let inserted = conn.execute(&sql, params_from_iter(values.iter()));

        match inserted {
            Ok(0) => Err(StoreError::Conflict(user_id)),
            Ok(_) => Ok(ApplicationId(conn.last_insert_rowid())),
            Err(err) if is_constraint_violation(&err) => Err(StoreError::Conflict(user_id)),
            Err(err) => Err(err.into()),
        }
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        email: optional_text(row, 1)?,
        role: optional_text(row, 2)?,
        account_status: optional_text(row, 3)?,
        created_at: optional_timestamp(row, 4)?,
    })
}

/// Application row whose `user_id` is NULL or not an integer.
struct OrphanApplication {
    id: ApplicationId,
    raw_owner: Option<String>,
}

fn map_application(
    row: &Row<'_>,
) -> rusqlite::Result<Result<MembershipApplication, OrphanApplication>> {
    let id = ApplicationId(row.get(0)?);
    let Some(user_id) = owner_id(row, 1)? else {
        return Ok(Err(OrphanApplication {
            id,
            raw_owner: optional_text(row, 1)?,
        }));
    };

    let status = optional_text(row, 2)?
        .map(|raw| ApplicationStatus::parse(&raw))
        .unwrap_or(ApplicationStatus::Pending);

    Ok(Ok(MembershipApplication {
        id,
        user_id,
        status,
        created_at: optional_timestamp(row, 3)?,
        claimed_at: optional_timestamp(row, 4)?,
    }))
}

/// Owner ids written into a TEXT column come back as text; integral reals are accepted too.
fn owner_id(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<UserId>> {
    let value = match row.get_ref(idx)? {
        ValueRef::Integer(value) => Some(value),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).trim().parse::<i64>().ok(),
        ValueRef::Real(value) if value.fract() == 0.0 => Some(value as i64),
        ValueRef::Real(_) | ValueRef::Null | ValueRef::Blob(_) => None,
    };
    Ok(value.map(UserId))
}

/// Reads a loosely typed column as text. SQLite does not enforce declared types, so integers
/// and reals are rendered rather than rejected; blobs read as absent.
fn optional_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    let value = match row.get_ref(idx)? {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) => Some(value.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
    };
    Ok(value)
}

/// Text timestamps go through [`parse_timestamp`]; integers are taken as unix seconds.
fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let value = match row.get_ref(idx)? {
        ValueRef::Integer(seconds) => DateTime::from_timestamp(seconds, 0),
        ValueRef::Text(bytes) => parse_timestamp(&String::from_utf8_lossy(bytes)),
        ValueRef::Null | ValueRef::Real(_) | ValueRef::Blob(_) => None,
    };
    Ok(value)
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation
    )
}
