use clap::Args;
use marketplace::build_info::{self, BuildInfo};

use crate::commands::{CmdResult, DbPathArgs};

#[derive(Args)]
pub struct StampArgs {
    #[command(flatten)]
    pub db: DbPathArgs,

    /// Release tag being built
    #[arg(long)]
    pub tag: String,

    /// Commit SHA the release was built from
    #[arg(long)]
    pub commit_sha: String,

    /// Build time as ISO-8601; no offset means UTC (defaults to now)
    #[arg(long)]
    pub timestamp: Option<String>,
}

pub fn run(args: StampArgs) -> CmdResult<BuildInfo> {
    let timestamp = args
        .timestamp
        .unwrap_or_else(build_info::now_timestamp);
    let info = BuildInfo::new(&args.tag, &args.commit_sha, &timestamp)?;

    let stamped = build_info::stamp(&args.db.path(), &info)?;
    Ok((stamped, 0))
}
