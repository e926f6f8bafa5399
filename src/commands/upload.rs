use clap::Args;
use marketplace::defaults::{self, ReleaseConfig};
use marketplace::release::{self, GitHubPublisher, ReleaseTarget, RepoSlug, UploadResult};

use crate::commands::{CmdResult, DbPathArgs, GlobalArgs};

#[derive(Args)]
pub struct UploadArgs {
    #[command(flatten)]
    pub db: DbPathArgs,

    /// Repository as owner/name
    #[arg(long)]
    pub repo: String,

    /// Tag of the release to attach the database to
    #[arg(long)]
    pub tag: String,

    /// Asset file name (defaults to release.asset_name in marketplace.json)
    #[arg(long)]
    pub asset_name: Option<String>,
}

pub fn run(args: UploadArgs, _global: &GlobalArgs) -> CmdResult<UploadResult> {
    let defaults = defaults::load_defaults();
    let target = release_target(&args.repo, &args.tag, args.asset_name, &defaults.release)?;
    let publisher = GitHubPublisher::new(&defaults.http, &defaults.release)?;

    let result = release::upload(&target, &args.db.path(), &publisher)?;
    Ok((result, 0))
}

pub(crate) fn release_target(
    repo: &str,
    tag: &str,
    asset_name: Option<String>,
    config: &ReleaseConfig,
) -> marketplace::Result<ReleaseTarget> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(marketplace::Error::validation_invalid_argument(
            "tag",
            "Release tag cannot be empty",
            None,
            None,
        ));
    }

    Ok(ReleaseTarget {
        repo: RepoSlug::parse(repo)?,
        tag: tag.to_string(),
        asset_name: asset_name.unwrap_or_else(|| config.asset_name.clone()),
    })
}
