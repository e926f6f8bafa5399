use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{build, cabinets, catalogs, config, schema, stamp, upload, verify};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "marketplace")]
#[command(version = VERSION)]
#[command(about = "Build the marketplace SQLite database and publish it as a release asset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema (idempotent)
    Schema(schema::SchemaArgs),
    /// Record the build tag, commit, and timestamp
    Stamp(stamp::StampArgs),
    /// Replace catalogs with the entries of a YAML file
    Catalogs(catalogs::CatalogsArgs),
    /// Download each catalog's CSV and load its cabinets
    Cabinets(cabinets::CabinetsArgs),
    /// Check the database file and report its size and digest
    Verify(verify::VerifyArgs),
    /// Attach the database to a GitHub release
    Upload(upload::UploadArgs),
    /// Run the whole release pipeline against a fresh database
    Build(build::BuildArgs),
    /// Manage marketplace.json configuration
    Config(config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
