//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

mod report;
mod schedule;

pub use schedule::{run_all, Interrupt};

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::provision::TerraformCli;
use crate::testing::{load_scenario, KeyGenerator, RunnerOptions, ScenarioRunner};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Run {
            paths,
            seed,
            jobs,
            keep_workdirs,
            verbose,
        } => {
            if let Some(jobs) = jobs {
                config.runner.max_parallel = jobs;
            }
            config.runner.keep_workdirs |= keep_workdirs;
            run(&paths, seed, &config, verbose).await
        }

        Commands::Validate { paths } => validate(&paths),

        Commands::Check { json } => check(&config, json),
    }
}

async fn run(paths: &[PathBuf], seed: Option<u64>, config: &Config, verbose: bool) -> Result<()> {
    let terraform = TerraformCli::from_config(&config.terraform, &config.retry)?;
    let version = terraform.check_version(&config.terraform.min_version)?;
    tracing::info!("Using terraform {} at {}", version, terraform.binary().display());

    let keys = match seed {
        Some(seed) => KeyGenerator::seeded(seed),
        None => KeyGenerator::from_entropy(),
    };
    let scenarios = paths
        .iter()
        .map(|path| load_scenario(path, &keys))
        .collect::<Result<Vec<_>>>()?;

    let runner = ScenarioRunner::new(Arc::new(terraform), RunnerOptions::from_config(config));
    let interrupt = Interrupt::default();
    interrupt.install(config.runner.workdir_root());

    println!(
        "\n{} {} scenario(s)\n",
        "Running".blue().bold(),
        scenarios.len()
    );
    let results = run_all(&runner, scenarios, config.runner.max_parallel, &interrupt).await?;

    for result in &results {
        report::print_result(result, verbose);
    }
    let failed = report::print_summary(&results);

    if failed > 0 {
        return Err(Error::TestAssertion(format!(
            "{} of {} scenario(s) failed",
            failed,
            results.len()
        )));
    }
    Ok(())
}

fn validate(paths: &[PathBuf]) -> Result<()> {
    let keys = KeyGenerator::from_entropy();
    let mut invalid = 0;

    for path in paths {
        match load_scenario(path, &keys) {
            Ok(scenario) if !scenario.source_dir.is_dir() => {
                invalid += 1;
                println!(
                    "{} {}: source directory '{}' not found",
                    "✗".red(),
                    path.display(),
                    scenario.source_dir.display()
                );
            }
            Ok(scenario) => {
                let mode = if scenario.parallel { "parallel" } else { "exclusive" };
                println!(
                    "{} {} ({}, {} expectation(s))",
                    "✓".green(),
                    scenario.name.white().bold(),
                    mode.dimmed(),
                    scenario.expectations.len()
                );
            }
            Err(e) => {
                invalid += 1;
                println!("{} {}", "✗".red(), e);
            }
        }
    }

    if invalid > 0 {
        return Err(Error::Config(format!(
            "{invalid} invalid scenario file(s)"
        )));
    }
    Ok(())
}

fn check(config: &Config, json: bool) -> Result<()> {
    let terraform = TerraformCli::from_config(&config.terraform, &config.retry)?;
    let result = terraform.check_version(&config.terraform.min_version);

    if json {
        let report = serde_json::json!({
            "binary": terraform.binary().display().to_string(),
            "version": result.as_ref().ok().map(|v| v.to_string()),
            "min_version": config.terraform.min_version,
            "ok": result.is_ok(),
            "error": result.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &result {
            Ok(version) => println!(
                "{} terraform {} at {}",
                "✓".green(),
                version,
                terraform.binary().display()
            ),
            Err(e) => println!("{} {}", "✗".red(), e),
        }
    }

    result.map(|_| ())
}
