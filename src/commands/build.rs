use clap::Args;
use marketplace::build::{self, BuildOptions, BuildRunResult};
use marketplace::build_info::{self, BuildInfo};
use marketplace::defaults;
use marketplace::fetch::HttpCsvSource;
use marketplace::paths;
use marketplace::release::{AssetPublisher, GitHubPublisher};

use crate::commands::{upload, CmdResult, DbPathArgs, GlobalArgs};

#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub db: DbPathArgs,

    /// YAML file with the top-level `marketplace` catalog list
    #[arg(long, value_name = "PATH")]
    pub yaml_path: String,

    /// Release tag being built
    #[arg(long)]
    pub tag: String,

    /// Commit SHA the release was built from
    #[arg(long)]
    pub commit_sha: String,

    /// Build time as ISO-8601; no offset means UTC (defaults to now)
    #[arg(long)]
    pub timestamp: Option<String>,

    /// Repository (owner/name) to upload the database to; omit for a local build
    #[arg(long)]
    pub repo: Option<String>,

    /// Asset file name (defaults to release.asset_name in marketplace.json)
    #[arg(long, requires = "repo")]
    pub asset_name: Option<String>,
}

/// Exits 1 when any step fails; the envelope still carries every step's result.
pub fn run(args: BuildArgs, _global: &GlobalArgs) -> CmdResult<BuildRunResult> {
    let defaults = defaults::load_defaults();

    let timestamp = args
        .timestamp
        .unwrap_or_else(build_info::now_timestamp);
    let build_info = BuildInfo::new(&args.tag, &args.commit_sha, &timestamp)?;

    let release = args
        .repo
        .as_deref()
        .map(|repo| upload::release_target(repo, &args.tag, args.asset_name, &defaults.release))
        .transpose()?;

    let publisher = match release {
        Some(_) => Some(GitHubPublisher::new(&defaults.http, &defaults.release)?),
        None => None,
    };
    let source = HttpCsvSource::new(&defaults.http)?;

    let options = BuildOptions {
        db_path: args.db.path(),
        yaml_path: paths::expand(&args.yaml_path),
        build_info,
        release,
    };

    let result = build::run(
        &options,
        &source,
        publisher.as_ref().map(|p| p as &dyn AssetPublisher),
    )?;
    let exit_code = if result.run.succeeded() { 0 } else { 1 };
    Ok((result, exit_code))
}
