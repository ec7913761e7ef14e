//! tf-scenario - declarative acceptance tests for Terraform modules
//!
//! This library runs scenario files against the `terraform` CLI with
//! randomized resource naming, guaranteed teardown and output assertions.

pub mod cli;
pub mod commands;
pub mod common;
pub mod provision;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use provision::{Provisioner, TerraformCli, TerraformOptions};
pub use testing::{OutputExpectation, RunResult, ScenarioConfig, ScenarioRunner};
