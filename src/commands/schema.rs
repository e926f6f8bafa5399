use clap::Args;
use marketplace::schema::{self, SchemaResult};

use crate::commands::{CmdResult, DbPathArgs};

#[derive(Args)]
pub struct SchemaArgs {
    #[command(flatten)]
    pub db: DbPathArgs,
}

pub fn run(args: SchemaArgs) -> CmdResult<SchemaResult> {
    let result = schema::initialize(&args.db.path())?;
    Ok((result, 0))
}
