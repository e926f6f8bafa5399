use serde::Serialize;
use std::path::Path;

use crate::db;
use crate::paths;
use crate::{Error, Result};

pub const CATALOG_TABLE: &str = "Catalog";
pub const CABINET_TABLE: &str = "Cabinet";
pub const BUILD_INFO_TABLE: &str = "BuildInfo";

const STATEMENTS: &[(&str, &str)] = &[
    (
        CATALOG_TABLE,
        "CREATE TABLE IF NOT EXISTS Catalog (
            CatalogName TEXT PRIMARY KEY NOT NULL,
            Description TEXT,
            url TEXT
        )",
    ),
    (
        CABINET_TABLE,
        "CREATE TABLE IF NOT EXISTS Cabinet (
            CatalogName TEXT NOT NULL,
            Name TEXT NOT NULL,
            Game TEXT NOT NULL,
            CreationDate TEXT,
            Version TEXT,
            RomName TEXT,
            Url TEXT NOT NULL,
            Description TEXT,
            Core TEXT,
            Creator TEXT,
            Notes TEXT,
            PRIMARY KEY (CatalogName, Name),
            FOREIGN KEY (CatalogName) REFERENCES Catalog(CatalogName) ON DELETE CASCADE
        )",
    ),
    (
        BUILD_INFO_TABLE,
        "CREATE TABLE IF NOT EXISTS BuildInfo (
            Id INTEGER PRIMARY KEY CHECK (Id = 1),
            BuildTag TEXT NOT NULL,
            BuildCommitSHA TEXT NOT NULL,
            BuildTimestampUTC TEXT NOT NULL
        )",
    ),
    (
        "idx_cabinet_name",
        "CREATE INDEX IF NOT EXISTS idx_cabinet_name ON Cabinet (Name)",
    ),
    (
        "idx_cabinet_creator",
        "CREATE INDEX IF NOT EXISTS idx_cabinet_creator ON Cabinet (Creator)",
    ),
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaResult {
    pub db_path: String,
    pub created_file: bool,
    pub ensured: Vec<String>,
}

/// Create the marketplace tables and indexes. Safe to run against an existing database.
pub fn initialize(db_path: &Path) -> Result<SchemaResult> {
    let display = paths::display(db_path);
    let created_file = !db_path.exists();
    log_status!("schema", "Initializing database structure at {}", display);

    let mut conn = db::open_or_create(db_path)?;
    let tx = conn
        .transaction()
        .map_err(|e| Error::database(&display, e, "begin schema transaction"))?;

    let mut ensured = Vec::with_capacity(STATEMENTS.len());
    for (name, sql) in STATEMENTS {
        tx.execute(sql, [])
            .map_err(|e| Error::database(&display, e, &format!("create {}", name)))?;
        ensured.push(name.to_string());
    }

    tx.commit()
        .map_err(|e| Error::database(&display, e, "commit schema"))?;
    log_status!("schema", "Database structure initialized ({} objects)", ensured.len());

    Ok(SchemaResult {
        db_path: display,
        created_file,
        ensured,
    })
}
