//! tf-scenario - acceptance tests for Terraform modules
//!
//! Runs declarative scenario files against the `terraform` CLI and reports
//! output assertions.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use tfscenario::common::{config::Config, logging};
use tfscenario::{cli, commands};

#[derive(Parser)]
#[command(name = "tfscenario", about = "Declarative acceptance tests for Terraform modules")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    let result = match config {
        Ok(config) => cli::dispatch(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
