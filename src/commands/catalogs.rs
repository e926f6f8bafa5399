use clap::Args;
use marketplace::catalog::{self, CatalogLoadResult};
use marketplace::paths;

use crate::commands::{CmdResult, DbPathArgs};

#[derive(Args)]
pub struct CatalogsArgs {
    #[command(flatten)]
    pub db: DbPathArgs,

    /// YAML file with the top-level `marketplace` catalog list
    #[arg(long, value_name = "PATH")]
    pub yaml_path: String,
}

pub fn run(args: CatalogsArgs) -> CmdResult<CatalogLoadResult> {
    let result = catalog::load(&args.db.path(), &paths::expand(&args.yaml_path))?;
    Ok((result, 0))
}
