use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use crate::db;
use crate::paths;
use crate::schema::{BUILD_INFO_TABLE, CABINET_TABLE, CATALOG_TABLE};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCounts {
    pub catalogs: i64,
    pub cabinets: i64,
    pub build_info: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub db_path: String,
    pub size_bytes: u64,
    pub size_human: String,
    /// `ls -lh` style line: mode, human size, file name.
    pub listing: String,
    pub sha256: String,
    pub tables: TableCounts,
}

/// Check that the database file exists, is non-empty, and opens as SQLite.
pub fn verify(db_path: &Path) -> Result<VerifyResult> {
    let display = paths::display(db_path);

    let metadata = fs::metadata(db_path)
        .map_err(|_| Error::verify_failed(&display, "file does not exist"))?;
    if !metadata.is_file() {
        return Err(Error::verify_failed(&display, "path is not a regular file"));
    }
    if metadata.len() == 0 {
        return Err(Error::verify_failed(&display, "file is empty"));
    }

    let bytes = fs::read(db_path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read {}", display))))?;
    let sha256 = format!("{:x}", Sha256::digest(&bytes));

    let tables = count_tables(db_path)
        .map_err(|e| Error::verify_failed(&display, format!("not a readable database: {}", e)))?;

    let size_human = human_size(metadata.len());
    let file_name = db_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| display.clone());
    let listing = format!("{} {} {}", mode_string(&metadata), size_human, file_name);
    log_status!("verify", "{}", listing);

    Ok(VerifyResult {
        db_path: display,
        size_bytes: metadata.len(),
        size_human,
        listing,
        sha256,
        tables,
    })
}

fn count_tables(db_path: &Path) -> rusqlite::Result<TableCounts> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    Ok(TableCounts {
        catalogs: db::count_rows(&conn, CATALOG_TABLE)?,
        cabinets: db::count_rows(&conn, CABINET_TABLE)?,
        build_info: db::count_rows(&conn, BUILD_INFO_TABLE)?,
    })
}

/// Size with a single-letter binary unit, the way `ls -lh` prints it.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["K", "M", "G", "T", "P", "E"];

    if bytes < 1024 {
        return bytes.to_string();
    }

    let mut value = bytes as f64;
    let mut unit = "";
    for next in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }

    if value < 10.0 {
        let rounded = (value * 10.0).ceil() / 10.0;
        if rounded < 10.0 {
            return format!("{:.1}{}", rounded, unit);
        }
    }
    format!("{}{}", value.ceil() as u64, unit)
}

#[cfg(unix)]
fn mode_string(metadata: &fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode();
    let mut out = String::from("-");
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

#[cfg(not(unix))]
fn mode_string(metadata: &fs::Metadata) -> String {
    if metadata.permissions().readonly() {
        "-r--r--r--".to_string()
    } else {
        "-rw-rw-rw-".to_string()
    }
}
