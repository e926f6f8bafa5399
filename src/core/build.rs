//! The release build: every loader run in sequence against one fresh database.

use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::build_info::{self, BuildInfo};
use crate::cabinet;
use crate::catalog;
use crate::error::{Error, Result};
use crate::fetch::CsvSource;
use crate::paths;
use crate::pipeline::{self, PipelineRunResult, PipelineStep, PipelineStepExecutor};
use crate::release::{self, AssetPublisher, ReleaseTarget};
use crate::schema;
use crate::verify;

pub const STEP_SCHEMA: &str = "schema";
pub const STEP_STAMP: &str = "stamp";
pub const STEP_CATALOGS: &str = "catalogs";
pub const STEP_CABINETS: &str = "cabinets";
pub const STEP_VERIFY: &str = "verify";
pub const STEP_UPLOAD: &str = "upload";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub db_path: PathBuf,
    pub yaml_path: PathBuf,
    pub build_info: BuildInfo,
    /// Local builds leave this unset and stop after verification.
    pub release: Option<ReleaseTarget>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRunResult {
    pub db_path: String,
    pub removed_existing: bool,
    #[serde(flatten)]
    pub run: PipelineRunResult,
}

/// Canonical step list; each step needs the one before it.
pub fn build_steps(options: &BuildOptions) -> Vec<PipelineStep> {
    let mut steps = vec![
        PipelineStep::new(STEP_SCHEMA, "Create database schema", None),
        PipelineStep::new(STEP_STAMP, "Stamp build metadata", Some(STEP_SCHEMA)),
        PipelineStep::new(STEP_CATALOGS, "Load catalogs from YAML", Some(STEP_STAMP)),
        PipelineStep::new(STEP_CABINETS, "Load cabinets from catalog CSVs", Some(STEP_CATALOGS)),
        PipelineStep::new(STEP_VERIFY, "Verify database file", Some(STEP_CABINETS)),
    ];

    if options.release.is_some() {
        steps.push(PipelineStep::new(
            STEP_UPLOAD,
            "Upload release asset",
            Some(STEP_VERIFY),
        ));
    }

    steps
}

pub struct BuildExecutor<'a> {
    options: &'a BuildOptions,
    source: &'a dyn CsvSource,
    publisher: Option<&'a dyn AssetPublisher>,
}

impl<'a> BuildExecutor<'a> {
    pub fn new(
        options: &'a BuildOptions,
        source: &'a dyn CsvSource,
        publisher: Option<&'a dyn AssetPublisher>,
    ) -> Self {
        Self {
            options,
            source,
            publisher,
        }
    }

    fn upload(&self) -> Result<serde_json::Value> {
        let target = self
            .options
            .release
            .as_ref()
            .ok_or_else(|| Error::validation_missing_argument(vec!["repo".to_string()]))?;
        let publisher = self.publisher.ok_or_else(|| {
            Error::internal_unexpected("upload step scheduled without a publisher")
        })?;

        to_value(release::upload(target, &self.options.db_path, publisher)?)
    }
}

impl PipelineStepExecutor for BuildExecutor<'_> {
    fn execute_step(&self, step: &PipelineStep) -> Result<serde_json::Value> {
        let db_path = &self.options.db_path;

        match step.step_type.as_str() {
            STEP_SCHEMA => to_value(schema::initialize(db_path)?),
            STEP_STAMP => to_value(build_info::stamp(db_path, &self.options.build_info)?),
            STEP_CATALOGS => to_value(catalog::load(db_path, &self.options.yaml_path)?),
            STEP_CABINETS => {
                let result = cabinet::load(db_path, self.source)?;
                if !result.success {
                    return Err(Error::cabinet_load_failed(
                        format!(
                            "{} catalog CSV file(s) could not be parsed",
                            result.catalogs_failed_parse
                        ),
                        to_value(&result)?,
                    ));
                }
                to_value(result)
            }
            STEP_VERIFY => to_value(verify::verify(db_path)?),
            STEP_UPLOAD => self.upload(),
            other => Err(Error::validation_invalid_argument(
                "step",
                format!("Unknown build step type '{}'", other),
                Some(step.id.clone()),
                None,
            )),
        }
    }
}

/// Recreate the database from scratch and run every build step.
///
/// Step failures are reported in the result; `Err` is reserved for problems
/// that prevent the run from starting.
pub fn run(
    options: &BuildOptions,
    source: &dyn CsvSource,
    publisher: Option<&dyn AssetPublisher>,
) -> Result<BuildRunResult> {
    if options.release.is_some() && publisher.is_none() {
        return Err(Error::internal_unexpected(
            "release target configured without a publisher",
        ));
    }

    let removed_existing = remove_existing(&options.db_path)?;
    let steps = build_steps(options);
    let executor = BuildExecutor::new(options, source, publisher);
    let run = pipeline::run(&steps, &executor, "steps")?;

    log_status!(
        "build",
        "Build {}: {} succeeded, {} failed, {} skipped",
        if run.succeeded() { "succeeded" } else { "failed" },
        run.summary.succeeded,
        run.summary.failed,
        run.summary.skipped
    );

    Ok(BuildRunResult {
        db_path: paths::display(&options.db_path),
        removed_existing,
        run,
    })
}

fn remove_existing(db_path: &std::path::Path) -> Result<bool> {
    let display = paths::display(db_path);
    match fs::symlink_metadata(db_path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::internal_io(
            e.to_string(),
            Some(format!("inspect {}", display)),
        )),
        Ok(metadata) if metadata.is_dir() => Err(Error::validation_invalid_argument(
            "db_path",
            format!("'{}' is a directory", display),
            None,
            None,
        )),
        Ok(_) => {
            fs::remove_file(db_path).map_err(|e| {
                Error::internal_io(e.to_string(), Some(format!("remove {}", display)))
            })?;
            log_status!("build", "Removed existing database {}", display);
            Ok(true)
        }
    }
}

fn to_value<T: Serialize>(value: T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize step result".to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::RepoSlug;

    fn options(release: bool) -> BuildOptions {
        BuildOptions {
            db_path: PathBuf::from("/tmp/marketplace.db"),
            yaml_path: PathBuf::from("/tmp/catalogs.yaml"),
            build_info: BuildInfo::new("v1.0.0", "abc123", "2024-05-01T12:00:00Z").unwrap(),
            release: release.then(|| ReleaseTarget {
                repo: RepoSlug::parse("octo-org/marketplace").unwrap(),
                tag: "v1.0.0".to_string(),
                asset_name: "marketplace.db".to_string(),
            }),
        }
    }

    #[test]
    fn local_build_stops_after_verify() {
        let ids: Vec<_> = build_steps(&options(false))
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["schema", "stamp", "catalogs", "cabinets", "verify"]);
    }

    #[test]
    fn release_build_chains_every_step() {
        let steps = build_steps(&options(true));

        assert_eq!(steps.len(), 6);
        assert!(steps[0].needs.is_empty());
        for pair in steps.windows(2) {
            assert_eq!(pair[1].needs, vec![pair[0].id.clone()]);
        }
        assert_eq!(steps[5].id, STEP_UPLOAD);
    }

    #[test]
    fn release_target_requires_publisher() {
        struct NoCsv;
        impl CsvSource for NoCsv {
            fn fetch(&self, url: &str) -> Result<Vec<u8>> {
                Err(Error::download_failed(url, "offline", None))
            }
        }

        let err = run(&options(true), &NoCsv, None).unwrap_err();
        assert_eq!(err.code.as_str(), "internal.unexpected");
    }

    #[test]
    fn remove_existing_only_ignores_missing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("marketplace.db");
        assert!(!remove_existing(&db_path).unwrap());

        fs::write(&db_path, b"old").unwrap();
        assert!(remove_existing(&db_path).unwrap());
        assert!(!db_path.exists());

        let under_file = dir.path().join("not-a-dir").join("marketplace.db");
        fs::write(dir.path().join("not-a-dir"), b"plain file").unwrap();
        let err = remove_existing(&under_file).unwrap_err();
        assert_eq!(err.code.as_str(), "internal.io_error");
    }
}
