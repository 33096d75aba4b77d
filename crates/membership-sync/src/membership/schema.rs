use std::collections::HashSet;

use rusqlite::Connection;

pub const USERS_TABLE: &str = "users";
pub const APPLICATIONS_TABLE: &str = "membership_applications";

/// Baseline tables as first deployed. Later columns arrive through `migrations`.
pub const BASE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    email TEXT,
    role TEXT,
    account_status TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS membership_applications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;

pub const UNIQUE_OWNER_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_membership_applications_user_id
    ON membership_applications(user_id);
"#;

/// Column names of `table`; empty when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;

    let mut columns = HashSet::new();
    while let Some(row) = rows.next()? {
        columns.insert(row.get::<_, String>(1)?);
    }
    Ok(columns)
}

/// Projection for an optional column: the column itself when present, otherwise a NULL literal
/// under the same name so row mapping stays positional.
pub fn optional_column(columns: &HashSet<String>, name: &str) -> String {
    if columns.contains(name) {
        name.to_string()
    } else {
        format!("NULL AS {name}")
    }
}
