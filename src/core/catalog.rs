//! Catalog ingestion from the marketplace YAML file.
//!
//! The file holds a top-level `marketplace` list; each entry names a catalog
//! and the URL of the CSV that lists its cabinets:
//!
//! ```yaml
//! marketplace:
//!   - CatalogName: Arcade Classics
//!     Description: Curated cabinets
//!     Url: https://example.com/classics.csv
//! ```
//!
//! Loading replaces the whole Catalog table. Deleting catalogs cascades into
//! Cabinet, so a catalog load always leaves the cabinet table empty.

use serde::Serialize;
use serde_yml::Value;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::db;
use crate::paths;
use crate::{Error, Result};

const ROOT_KEY: &str = "marketplace";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Entries accepted from a catalog file plus the reasons any were dropped.
#[derive(Debug, Clone, Default)]
pub struct ParsedCatalogs {
    pub read: usize,
    pub entries: Vec<CatalogEntry>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogLoadResult {
    pub db_path: String,
    pub yaml_path: String,
    pub entries_read: usize,
    pub deleted: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub catalogs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub fn parse_catalog_file(yaml_path: &Path) -> Result<ParsedCatalogs> {
    let display = paths::display(yaml_path);
    let content = fs::read_to_string(yaml_path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::catalog_file_not_found(&display)
        } else {
            Error::internal_io(e.to_string(), Some(format!("read {}", display)))
        }
    })?;

    parse_catalogs(&content, &display)
}

/// Parse catalog YAML. `source` only labels error messages.
pub fn parse_catalogs(content: &str, source: &str) -> Result<ParsedCatalogs> {
    let document: Value = serde_yml::from_str(content)
        .map_err(|e| Error::catalog_invalid_yaml(source, e.to_string()))?;

    let list = match document.get(ROOT_KEY) {
        None | Some(Value::Null) => {
            return Err(Error::catalog_invalid_yaml(
                source,
                format!("missing the top-level '{}' key", ROOT_KEY),
            ))
        }
        Some(value) => value.as_sequence().ok_or_else(|| {
            Error::catalog_invalid_yaml(source, format!("'{}' does not contain a list", ROOT_KEY))
        })?,
    };

    let mut parsed = ParsedCatalogs {
        read: list.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();

    for (idx, item) in list.iter().enumerate() {
        let position = idx + 1;

        if !item.is_mapping() {
            parsed
                .warnings
                .push(format!("Skipping entry {}: not a mapping", position));
            continue;
        }

        let Some(name) = item.get("CatalogName").and_then(scalar_text) else {
            parsed.warnings.push(format!(
                "Skipping entry {} due to missing 'CatalogName'",
                position
            ));
            continue;
        };

        if !seen.insert(name.clone()) {
            parsed.warnings.push(format!(
                "Duplicate 'CatalogName' '{}': skipping entry {}",
                name, position
            ));
            continue;
        }

        parsed.entries.push(CatalogEntry {
            name,
            description: item.get("Description").and_then(scalar_text),
            url: item.get("Url").and_then(scalar_text),
        });
    }

    Ok(parsed)
}

/// Text form of a YAML scalar. Null, empty strings, and collections yield `None`.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Replace the Catalog table with the entries of `yaml_path`, all-or-nothing.
pub fn load(db_path: &Path, yaml_path: &Path) -> Result<CatalogLoadResult> {
    let db_display = paths::display(db_path);

    // Checked before the YAML so a missing database is reported first.
    let mut conn = db::open_existing(db_path)?;
    let parsed = parse_catalog_file(yaml_path)?;
    log_status!(
        "catalogs",
        "Loaded {} catalog entries from {}",
        parsed.read,
        yaml_path.display()
    );
    for warning in &parsed.warnings {
        log_status!("catalogs", "Warning: {}", warning);
    }

    let tx = conn
        .transaction()
        .map_err(|e| Error::database(&db_display, e, "begin catalog transaction"))?;

    let deleted = tx
        .execute("DELETE FROM Catalog", [])
        .map_err(|e| Error::database(&db_display, e, "clear Catalog"))?;
    log_status!("catalogs", "Deleted {} existing catalog rows", deleted);

    {
        let mut insert = tx
            .prepare("INSERT INTO Catalog (CatalogName, Description, url) VALUES (?1, ?2, ?3)")
            .map_err(|e| Error::database(&db_display, e, "prepare catalog insert"))?;

        for entry in &parsed.entries {
            insert
                .execute(rusqlite::params![entry.name, entry.description, entry.url])
                .map_err(|e| Error::catalog_load_failed(&entry.name, e))?;
        }
    }

    tx.commit()
        .map_err(|e| Error::database(&db_display, e, "commit catalogs"))?;
    log_status!("catalogs", "Inserted {} catalogs", parsed.entries.len());

    Ok(CatalogLoadResult {
        db_path: db_display,
        yaml_path: paths::display(yaml_path),
        entries_read: parsed.read,
        deleted,
        inserted: parsed.entries.len(),
        skipped: parsed.read - parsed.entries.len(),
        catalogs: parsed.entries.into_iter().map(|e| e.name).collect(),
        warnings: parsed.warnings,
    })
}
