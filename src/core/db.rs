//! SQLite connection helpers shared by every pipeline step.
//!
//! Each step opens its own connection and drops it when done; every
//! connection has foreign key enforcement switched on.

use rusqlite::Connection;
use std::fs;
use std::path::Path;

use crate::paths;
use crate::{Error, Result};

/// Open (creating if needed) the database at `path`, creating parent directories.
pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
            })?;
            log_status!("schema", "Created directory {}", parent.display());
        }
    }

    let conn = Connection::open(path)
        .map_err(|e| Error::database(paths::display(path), e, "open database"))?;
    enable_foreign_keys(&conn, path)?;
    Ok(conn)
}

/// Open an existing database. A missing file is an error, never an implicit create.
pub fn open_existing(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(Error::database_not_found(paths::display(path)));
    }

    let conn = Connection::open(path)
        .map_err(|e| Error::database(paths::display(path), e, "open database"))?;
    enable_foreign_keys(&conn, path)?;
    Ok(conn)
}

fn enable_foreign_keys(conn: &Connection, path: &Path) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| Error::database(paths::display(path), e, "enable foreign keys"))
}

/// Row count of `table`. Table names are crate constants, never user input.
pub fn count_rows(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })
}

/// True when SQLite rejected a statement because of a constraint (PK, FK, NOT NULL).
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
