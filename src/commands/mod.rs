use clap::Args;
use std::path::PathBuf;

pub type CmdResult<T> = marketplace::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

/// Database location shared by every data command.
#[derive(Args, Debug, Clone)]
pub struct DbPathArgs {
    /// Path to the SQLite database file (`~` is expanded)
    #[arg(long, value_name = "PATH")]
    pub db_path: String,
}

impl DbPathArgs {
    pub fn path(&self) -> PathBuf {
        marketplace::paths::expand(&self.db_path)
    }
}

pub mod build;
pub mod cabinets;
pub mod catalogs;
pub mod config;
pub mod schema;
pub mod stamp;
pub mod upload;
pub mod verify;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args))
    };
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (marketplace::Result<serde_json::Value>, i32) {
    crate::tty::status("marketplace is working...");

    match command {
        crate::Commands::Schema(args) => dispatch!(args, schema),
        crate::Commands::Stamp(args) => dispatch!(args, stamp),
        crate::Commands::Catalogs(args) => dispatch!(args, catalogs),
        crate::Commands::Verify(args) => dispatch!(args, verify),

        // Commands that read marketplace.json
        crate::Commands::Cabinets(args) => dispatch!(args, global, cabinets),
        crate::Commands::Upload(args) => dispatch!(args, global, upload),
        crate::Commands::Build(args) => dispatch!(args, global, build),
        crate::Commands::Config(args) => dispatch!(args, global, config),
    }
}
