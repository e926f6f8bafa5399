use clap::Args;
use marketplace::verify::{self, VerifyResult};

use crate::commands::{CmdResult, DbPathArgs};

#[derive(Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub db: DbPathArgs,
}

pub fn run(args: VerifyArgs) -> CmdResult<VerifyResult> {
    let result = verify::verify(&args.db.path())?;
    Ok((result, 0))
}
