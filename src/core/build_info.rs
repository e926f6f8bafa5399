use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use serde::Serialize;
use std::path::Path;

use crate::db;
use crate::paths;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub tag: String,
    pub commit_sha: String,
    pub timestamp_utc: String,
}

impl BuildInfo {
    /// Validate the raw arguments. The timestamp must be ISO-8601; values without
    /// an offset are taken as UTC. It is stored normalized to UTC with second precision.
    pub fn new(tag: &str, commit_sha: &str, timestamp: &str) -> Result<Self> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(Error::validation_invalid_argument(
                "tag",
                "Build tag cannot be empty",
                None,
                None,
            ));
        }

        let commit_sha = commit_sha.trim();
        if commit_sha.is_empty() {
            return Err(Error::validation_invalid_argument(
                "commit_sha",
                "Commit SHA cannot be empty",
                None,
                None,
            ));
        }

        let parsed = parse_timestamp(timestamp.trim()).ok_or_else(|| {
            Error::validation_invalid_argument(
                "timestamp",
                format!("'{}' is not an ISO-8601 timestamp", timestamp),
                None,
                Some(vec!["2024-05-01T12:00:00Z".to_string()]),
            )
        })?;

        Ok(Self {
            tag: tag.to_string(),
            commit_sha: commit_sha.to_string(),
            timestamp_utc: format_timestamp(parsed),
        })
    }
}

/// Current UTC time in the format stored in BuildInfo.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Write the single BuildInfo row, replacing whatever was stamped before.
pub fn stamp(db_path: &Path, info: &BuildInfo) -> Result<BuildInfo> {
    let display = paths::display(db_path);
    log_status!(
        "stamp",
        "Tag {} / commit {} / {}",
        info.tag,
        info.commit_sha,
        info.timestamp_utc
    );

    let conn = db::open_existing(db_path)?;
    conn.execute(
        "INSERT OR REPLACE INTO BuildInfo (Id, BuildTag, BuildCommitSHA, BuildTimestampUTC)
         VALUES (1, ?1, ?2, ?3)",
        rusqlite::params![info.tag, info.commit_sha, info.timestamp_utc],
    )
    .map_err(|e| Error::database(&display, e, "update BuildInfo"))?;

    Ok(info.clone())
}

pub fn read(db_path: &Path) -> Result<Option<BuildInfo>> {
    let display = paths::display(db_path);
    let conn = db::open_existing(db_path)?;

    conn.query_row(
        "SELECT BuildTag, BuildCommitSHA, BuildTimestampUTC FROM BuildInfo WHERE Id = 1",
        [],
        |row| {
            Ok(BuildInfo {
                tag: row.get(0)?,
                commit_sha: row.get(1)?,
                timestamp_utc: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| Error::database(&display, e, "read BuildInfo"))
}
