//! CLI command definitions
//!
//! Defines the clap commands for the scenario CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenario files against terraform
    Run {
        /// Paths to YAML scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Seed for isolation keys, to reproduce the names of a previous session
        #[arg(long)]
        seed: Option<u64>,

        /// Maximum number of parallel scenarios (overrides runner.max_parallel)
        #[arg(long, short)]
        jobs: Option<usize>,

        /// Keep temporary working copies after teardown
        #[arg(long)]
        keep_workdirs: bool,

        /// Print outputs of every scenario, not only failing ones
        #[arg(long, short)]
        verbose: bool,
    },

    /// Parse and resolve scenario files without provisioning anything
    Validate {
        /// Paths to YAML scenario files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Check the terraform installation
    Check {
        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}
