use clap::Args;
use marketplace::cabinet::{self, CabinetLoadResult};
use marketplace::defaults;
use marketplace::fetch::HttpCsvSource;

use crate::commands::{CmdResult, DbPathArgs, GlobalArgs};

#[derive(Args)]
pub struct CabinetsArgs {
    #[command(flatten)]
    pub db: DbPathArgs,
}

/// Exits 1 when any catalog CSV failed to parse; download failures alone do not.
pub fn run(args: CabinetsArgs, _global: &GlobalArgs) -> CmdResult<CabinetLoadResult> {
    let defaults = defaults::load_defaults();
    let source = HttpCsvSource::new(&defaults.http)?;

    let result = cabinet::load(&args.db.path(), &source)?;
    let exit_code = if result.success { 0 } else { 1 };
    Ok((result, exit_code))
}
