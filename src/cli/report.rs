//! Human-readable scenario reports

use colored::Colorize;

use crate::testing::{RunResult, RunStatus, TeardownStatus};

/// Print the outcome of one scenario
pub fn print_result(result: &RunResult, verbose: bool) {
    let header = format!("{} (key {})", result.name, result.isolation_key);
    match &result.status {
        RunStatus::Passed => println!("{} {}", "✓".green(), header.white().bold()),
        _ => println!("{} {}", "✗".red(), header.white().bold()),
    }

    match &result.status {
        RunStatus::Passed => {}
        RunStatus::AssertionsFailed(violations) => {
            for violation in violations {
                println!("    {} {}", "-".red(), violation);
            }
        }
        RunStatus::ProvisionFailed(detail) => {
            println!("    {} {}", "provision:".red(), detail);
        }
        RunStatus::SetupFailed(detail) => {
            println!("    {} {}", "setup:".red(), detail);
        }
        RunStatus::Aborted(reason) => {
            println!("    {} {}", "aborted:".red(), reason);
        }
    }

    if verbose || !result.passed() {
        for (name, value) in &result.outputs {
            println!("    {} = {}", name.dimmed(), format!("{value:?}").dimmed());
        }
        if let Some(dir) = &result.working_dir {
            println!("    {} {}", "workdir:".dimmed(), dir.display().to_string().dimmed());
        }
    }

    match &result.teardown {
        TeardownStatus::Skipped | TeardownStatus::Destroyed => {}
        TeardownStatus::Failed(detail) => {
            println!(
                "    {} {}",
                "teardown failed, resources may have leaked:".yellow().bold(),
                detail
            );
        }
    }
}

/// Print totals; returns the number of failed scenarios
pub fn print_summary(results: &[RunResult]) -> usize {
    let failed = results.iter().filter(|r| !r.passed()).count();
    let leaked = results
        .iter()
        .filter(|r| matches!(r.teardown, TeardownStatus::Failed(_)))
        .count();
    let passed = results.len() - failed;

    println!();
    if failed == 0 {
        println!(
            "{} {}",
            "✓".green().bold(),
            format!("{passed} scenario(s) passed").green().bold()
        );
    } else {
        println!(
            "{} {}",
            "✗".red().bold(),
            format!("{failed} of {} scenario(s) failed", results.len()).red().bold()
        );
    }
    if leaked > 0 {
        println!(
            "{} {}",
            "!".yellow().bold(),
            format!("{leaked} teardown(s) failed, check for leaked resources")
                .yellow()
                .bold()
        );
    }
    failed
}
