//! Cabinet ingestion: one CSV per catalog, fetched from the catalog URL.
//!
//! Rows are headerless and positional:
//! `Name, Url, Game, CreationDate, Version, RomName, Description, Core, Creator, Notes`.
//! Name, Url, and Game are required; every other column may be missing or empty
//! and is stored as NULL. Bodies are read as UTF-8 with undecodable bytes
//! replaced, so only structural CSV errors fail a catalog.

use rusqlite::{Connection, Transaction};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

use crate::db;
use crate::fetch::CsvSource;
use crate::paths;
use crate::{Error, Result};

const IDX_NAME: usize = 0;
const IDX_URL: usize = 1;
const IDX_GAME: usize = 2;
const IDX_CREATION_DATE: usize = 3;
const IDX_VERSION: usize = 4;
const IDX_ROM_NAME: usize = 5;
const IDX_DESCRIPTION: usize = 6;
const IDX_CORE: usize = 7;
const IDX_CREATOR: usize = 8;
const IDX_NOTES: usize = 9;

const MIN_REQUIRED_COLUMNS: usize = IDX_GAME + 1;

const INSERT_CABINET: &str = "INSERT INTO Cabinet (
        CatalogName, Name, Game, CreationDate, Version, RomName,
        Url, Description, Core, Creator, Notes
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStatus {
    Loaded,
    SkippedNoUrl,
    DownloadFailed,
    EmptyContent,
    ParseFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOutcome {
    pub catalog_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub status: CatalogStatus,
    pub rows_processed: usize,
    pub rows_inserted: usize,
    pub rows_failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CatalogOutcome {
    fn new(catalog_name: &str, url: Option<String>) -> Self {
        Self {
            catalog_name: catalog_name.to_string(),
            url,
            status: CatalogStatus::Loaded,
            rows_processed: 0,
            rows_inserted: 0,
            rows_failed: 0,
            messages: Vec::new(),
            error: None,
        }
    }

    fn skip_row(&mut self, message: String) {
        self.rows_failed += 1;
        self.messages.push(message);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CabinetLoadResult {
    pub db_path: String,
    /// False when any catalog's CSV could not be parsed.
    pub success: bool,
    pub catalogs_found: usize,
    pub catalogs_processed: usize,
    pub catalogs_failed_download: usize,
    pub catalogs_failed_parse: usize,
    pub rows_inserted: usize,
    pub catalogs: Vec<CatalogOutcome>,
}

/// A validated CSV row, borrowing from the parsed record.
#[derive(Debug, PartialEq, Eq)]
struct CabinetRow<'a> {
    name: &'a str,
    url: &'a str,
    game: &'a str,
    creation_date: Option<&'a str>,
    version: Option<&'a str>,
    rom_name: Option<&'a str>,
    description: Option<&'a str>,
    core: Option<&'a str>,
    creator: Option<&'a str>,
    notes: Option<&'a str>,
}

/// Trimmed column value; empty or absent columns are `None`.
fn column<'a>(record: &'a csv::StringRecord, index: usize) -> Option<&'a str> {
    record
        .get(index)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn parse_row<'a>(
    record: &'a csv::StringRecord,
    row_number: usize,
) -> std::result::Result<CabinetRow<'a>, String> {
    if record.len() < MIN_REQUIRED_COLUMNS {
        return Err(format!(
            "Skipping row {}: has only {} columns, expected at least {}",
            row_number,
            record.len(),
            MIN_REQUIRED_COLUMNS
        ));
    }

    let required = move |index: usize, field: &str| {
        column(record, index).ok_or_else(|| {
            format!(
                "Skipping row {}: required field '{}' (column {}) is missing or empty",
                row_number,
                field,
                index + 1
            )
        })
    };

    let name = required(IDX_NAME, "Name")?;
    let game = required(IDX_GAME, "Game")?;
    let url = required(IDX_URL, "Url")?;

    Ok(CabinetRow {
        name,
        url,
        game,
        creation_date: column(record, IDX_CREATION_DATE),
        version: column(record, IDX_VERSION),
        rom_name: column(record, IDX_ROM_NAME),
        description: column(record, IDX_DESCRIPTION),
        core: column(record, IDX_CORE),
        creator: column(record, IDX_CREATOR),
        notes: column(record, IDX_NOTES),
    })
}

/// Fetch every catalog's CSV and load its cabinets.
///
/// Download problems skip the catalog and are only counted. A CSV that fails
/// to parse rolls back that catalog's rows and makes the result unsuccessful;
/// the remaining catalogs are still processed. Database failures outside a
/// single row insert abort the load.
pub fn load(db_path: &Path, source: &dyn CsvSource) -> Result<CabinetLoadResult> {
    let display = paths::display(db_path);
    let mut conn = db::open_existing(db_path)?;

    let catalogs = read_catalogs(&conn)
        .map_err(|e| Error::database(&display, e, "read Catalog"))?;

    let mut result = CabinetLoadResult {
        db_path: display.clone(),
        success: true,
        catalogs_found: catalogs.len(),
        catalogs_processed: 0,
        catalogs_failed_download: 0,
        catalogs_failed_parse: 0,
        rows_inserted: 0,
        catalogs: Vec::with_capacity(catalogs.len()),
    };

    if catalogs.is_empty() {
        log_status!("cabinets", "No catalogs found in the Catalog table to process");
        return Ok(result);
    }
    log_status!("cabinets", "Found {} catalogs to process", catalogs.len());

    for (name, url) in catalogs {
        result.catalogs_processed += 1;
        let outcome = load_catalog(&mut conn, &display, &name, url, source)?;

        match outcome.status {
            CatalogStatus::DownloadFailed => result.catalogs_failed_download += 1,
            CatalogStatus::ParseFailed => {
                result.catalogs_failed_parse += 1;
                result.success = false;
            }
            _ => {}
        }
        result.rows_inserted += outcome.rows_inserted;
        result.catalogs.push(outcome);
    }

    log_status!(
        "cabinets",
        "Processed {} catalogs, {} failed downloads, {} cabinets inserted",
        result.catalogs_processed,
        result.catalogs_failed_download,
        result.rows_inserted
    );

    Ok(result)
}

fn read_catalogs(conn: &Connection) -> rusqlite::Result<Vec<(String, Option<String>)>> {
    let mut stmt = conn.prepare("SELECT CatalogName, url FROM Catalog ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

fn load_catalog(
    conn: &mut Connection,
    display: &str,
    name: &str,
    url: Option<String>,
    source: &dyn CsvSource,
) -> Result<CatalogOutcome> {
    log_status!("cabinets", "Processing catalog '{}'", name);
    let mut outcome = CatalogOutcome::new(name, url.clone());

    let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
        log_status!("cabinets", "Warning: skipping '{}' (missing or empty URL)", name);
        outcome.status = CatalogStatus::SkippedNoUrl;
        return Ok(outcome);
    };

    let content = match source.fetch(url.trim()) {
        Ok(content) => content,
        Err(err) => {
            log_status!("cabinets", "Error downloading '{}': {}", name, err);
            outcome.status = CatalogStatus::DownloadFailed;
            outcome.error = Some(err.message);
            return Ok(outcome);
        }
    };

    let content = String::from_utf8_lossy(&content);
    if content.trim().is_empty() {
        log_status!("cabinets", "Warning: downloaded content for '{}' is empty", name);
        outcome.status = CatalogStatus::EmptyContent;
        return Ok(outcome);
    }

    let tx = conn
        .transaction()
        .map_err(|e| Error::database(display, e, "begin cabinet transaction"))?;

    match insert_rows(&tx, name, &content, &mut outcome) {
        Ok(()) => {
            tx.commit()
                .map_err(|e| Error::database(display, e, "commit cabinets"))?;
        }
        Err(RowsError::Csv(message)) => {
            log_status!("cabinets", "Error parsing CSV for '{}': {}", name, message);
            tx.rollback()
                .map_err(|e| Error::database(display, e, "roll back cabinets"))?;
            outcome.status = CatalogStatus::ParseFailed;
            outcome.rows_failed = outcome.rows_processed;
            outcome.rows_inserted = 0;
            outcome.error = Some(message);
        }
        Err(RowsError::Database(e)) => {
            return Err(Error::database(display, e, "prepare cabinet insert"));
        }
    }

    log_status!(
        "cabinets",
        "Finished '{}': processed {}, inserted {}, failed/skipped {}",
        name,
        outcome.rows_processed,
        outcome.rows_inserted,
        outcome.rows_failed
    );

    Ok(outcome)
}

enum RowsError {
    Csv(String),
    Database(rusqlite::Error),
}

fn insert_rows(
    tx: &Transaction<'_>,
    catalog_name: &str,
    content: &str,
    outcome: &mut CatalogOutcome,
) -> std::result::Result<(), RowsError> {
    let mut insert = tx.prepare(INSERT_CABINET).map_err(RowsError::Database)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut seen = HashSet::new();

    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RowsError::Csv(e.to_string()))?;
        // Blank lines are not records, so number rows by source line.
        let row_number = record
            .position()
            .map(|pos| pos.line() as usize)
            .unwrap_or(idx + 1);
        outcome.rows_processed += 1;

        let row = match parse_row(&record, row_number) {
            Ok(row) => row,
            Err(message) => {
                outcome.skip_row(message);
                continue;
            }
        };

        if !seen.insert(row.name.to_string()) {
            outcome.skip_row(format!(
                "Skipping row {}: duplicate Name '{}' within catalog '{}'",
                row_number, row.name, catalog_name
            ));
            continue;
        }

        let inserted = insert.execute(rusqlite::params![
            catalog_name,
            row.name,
            row.game,
            row.creation_date,
            row.version,
            row.rom_name,
            row.url,
            row.description,
            row.core,
            row.creator,
            row.notes,
        ]);

        match inserted {
            Ok(_) => outcome.rows_inserted += 1,
            Err(e) if db::is_constraint_violation(&e) => outcome.skip_row(format!(
                "Skipping row {}: integrity error for Name '{}': {}",
                row_number, row.name, e
            )),
            Err(e) => outcome.skip_row(format!(
                "Skipping row {}: database error for Name '{}': {}",
                row_number, row.name, e
            )),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct MapSource(HashMap<String, Result<Vec<u8>>>);

    impl CsvSource for MapSource {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.0
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(Error::download_failed(url, "404 Not Found", Some(404))))
        }
    }

    fn record(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    fn setup(catalogs: &[(&str, Option<&str>)]) -> (TempDir, std::path::PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("marketplace.db");
        crate::schema::initialize(&path).unwrap();

        let conn = db::open_existing(&path).unwrap();
        for (name, url) in catalogs {
            conn.execute(
                "INSERT INTO Catalog (CatalogName, url) VALUES (?1, ?2)",
                rusqlite::params![name, url],
            )
            .unwrap();
        }
        (dir, path)
    }

    #[test]
    fn parse_row_trims_and_nulls_optional_columns() {
        let rec = record(&[" Galaga ", "https://x/galaga.zip", "galaga", "", "1.2"]);
        let row = parse_row(&rec, 1).unwrap();

        assert_eq!(row.name, "Galaga");
        assert_eq!(row.creation_date, None);
        assert_eq!(row.version, Some("1.2"));
        assert_eq!(row.notes, None);
    }

    #[test]
    fn parse_row_rejects_short_rows() {
        let err = parse_row(&record(&["only", "two"]), 4).unwrap_err();
        assert!(err.contains("row 4"));
        assert!(err.contains("expected at least 3"));
    }

    #[test]
    fn parse_row_requires_name_game_and_url() {
        assert!(parse_row(&record(&["", "u", "g"]), 1).unwrap_err().contains("'Name'"));
        assert!(parse_row(&record(&["n", "u", " "]), 1).unwrap_err().contains("'Game'"));
        assert!(parse_row(&record(&["n", "", "g"]), 1).unwrap_err().contains("'Url'"));
    }

    #[test]
    fn load_inserts_valid_rows_and_skips_bad_ones() {
        let (_dir, path) = setup(&[("Classics", Some("https://cdn/classics.csv"))]);
        let csv = "Galaga,https://x/galaga.zip,galaga,2024-01-01,1.0,galaga.zip,\"Space, shooter\",mame,alice,\n\
                   Galaga,https://x/dup.zip,galaga\n\
                   NoGame,https://x/a.zip,\n\
                   short,row\n\
                   Pacman,https://x/pacman.zip,pacman\n";
        let source = MapSource(HashMap::from([(
            "https://cdn/classics.csv".to_string(),
            Ok(csv.as_bytes().to_vec()),
        )]));

        let result = load(&path, &source).unwrap();
        let outcome = &result.catalogs[0];

        assert!(result.success);
        assert_eq!(outcome.status, CatalogStatus::Loaded);
        assert_eq!(outcome.rows_processed, 5);
        assert_eq!(outcome.rows_inserted, 2);
        assert_eq!(outcome.rows_failed, 3);

        let conn = db::open_existing(&path).unwrap();
        let (description, notes): (String, Option<String>) = conn
            .query_row(
                "SELECT Description, Notes FROM Cabinet WHERE Name = 'Galaga'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(description, "Space, shooter");
        assert_eq!(notes, None);
    }

    #[test]
    fn download_failures_are_counted_not_fatal() {
        let (_dir, path) = setup(&[
            ("Broken", Some("https://cdn/missing.csv")),
            ("NoUrl", None),
            ("Blank", Some("   ")),
            ("Empty", Some("https://cdn/empty.csv")),
            ("Good", Some("https://cdn/good.csv")),
        ]);
        let source = MapSource(HashMap::from([
            ("https://cdn/empty.csv".to_string(), Ok(b"\n".to_vec())),
            (
                "https://cdn/good.csv".to_string(),
                Ok(b"Cab,https://x/cab.zip,cab\n".to_vec()),
            ),
        ]));

        let result = load(&path, &source).unwrap();

        assert!(result.success);
        assert_eq!(result.catalogs_found, 5);
        assert_eq!(result.catalogs_processed, 5);
        assert_eq!(result.catalogs_failed_download, 1);
        assert_eq!(result.rows_inserted, 1);

        let statuses: Vec<CatalogStatus> = result.catalogs.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                CatalogStatus::DownloadFailed,
                CatalogStatus::SkippedNoUrl,
                CatalogStatus::SkippedNoUrl,
                CatalogStatus::EmptyContent,
                CatalogStatus::Loaded,
            ]
        );
        assert!(result.catalogs[0].error.as_deref().unwrap().contains("HTTP 404"));
    }

    #[test]
    fn latin1_csv_loads_with_replacement_characters() {
        let (_dir, path) = setup(&[
            ("Legacy", Some("https://cdn/legacy.csv")),
            ("Good", Some("https://cdn/good.csv")),
        ]);
        let source = MapSource(HashMap::from([
            (
                "https://cdn/legacy.csv".to_string(),
                Ok(b"Cab,https://x/Pok\xe9mon.zip,Pok\xe9mon\n".to_vec()),
            ),
            (
                "https://cdn/good.csv".to_string(),
                Ok(b"Cab,https://x/cab.zip,cab\n".to_vec()),
            ),
        ]));

        let result = load(&path, &source).unwrap();

        assert!(result.success);
        assert_eq!(result.catalogs_failed_parse, 0);
        assert_eq!(result.catalogs[0].status, CatalogStatus::Loaded);
        assert_eq!(result.rows_inserted, 2);

        let conn = db::open_existing(&path).unwrap();
        let game: String = conn
            .query_row(
                "SELECT Game FROM Cabinet WHERE CatalogName = 'Legacy'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(game, "Pok\u{FFFD}mon");
    }

    #[test]
    fn row_messages_cite_source_lines_across_blank_lines() {
        let (_dir, path) = setup(&[("Gappy", Some("https://cdn/gappy.csv"))]);
        let csv = "Galaga,https://x/galaga.zip,galaga\n\n\nshort,row\n";
        let source = MapSource(HashMap::from([(
            "https://cdn/gappy.csv".to_string(),
            Ok(csv.as_bytes().to_vec()),
        )]));

        let result = load(&path, &source).unwrap();
        let outcome = &result.catalogs[0];

        assert_eq!(outcome.rows_processed, 2);
        assert_eq!(outcome.rows_inserted, 1);
        assert_eq!(outcome.rows_failed, 1);
        assert!(
            outcome.messages[0].starts_with("Skipping row 4:"),
            "{}",
            outcome.messages[0]
        );
    }

    #[test]
    fn same_name_in_different_catalogs_is_allowed() {
        let (_dir, path) = setup(&[
            ("A", Some("https://cdn/a.csv")),
            ("B", Some("https://cdn/b.csv")),
        ]);
        let row = b"Shared,https://x/s.zip,shared\n".to_vec();
        let source = MapSource(HashMap::from([
            ("https://cdn/a.csv".to_string(), Ok(row.clone())),
            ("https://cdn/b.csv".to_string(), Ok(row)),
        ]));

        let result = load(&path, &source).unwrap();
        assert_eq!(result.rows_inserted, 2);
    }

    #[test]
    fn empty_catalog_table_is_not_an_error() {
        let (_dir, path) = setup(&[]);
        let result = load(&path, &MapSource(HashMap::new())).unwrap();

        assert!(result.success);
        assert_eq!(result.catalogs_found, 0);
        assert!(result.catalogs.is_empty());
    }

    #[test]
    fn load_requires_existing_database() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("missing.db"), &MapSource(HashMap::new())).unwrap_err();
        assert_eq!(err.code.as_str(), "database.not_found");
    }
}
