//! Scenario harness
//!
//! Reads declarative scenarios, runs them against a [`Provisioner`] with a
//! fresh isolation key each, and checks the resulting outputs. Teardown is
//! guaranteed once a scenario has been prepared.
//!
//! [`Provisioner`]: crate::provision::Provisioner

mod config;
mod expect;
mod isolation;
mod runner;
mod workdir;

pub use config::{OutputCheck, ScenarioConfig, ScenarioFile};
pub use expect::{evaluate, referenced_outputs, OutputExpectation, Violation};
pub use isolation::{IsolationKey, KeyGenerator, PLACEHOLDER};
pub use runner::{
    assert, RunResult, RunStatus, RunnerOptions, ScenarioRunner, TeardownStatus, WorkingContext,
};
pub(crate) use runner::panic_message;
pub use workdir::{isolated_copy, CopySpec, WorkDir};

use std::path::Path;

use crate::common::Result;

/// Load a scenario file and resolve it with a fresh key from `keys`
pub fn load_scenario(path: &Path, keys: &KeyGenerator) -> Result<ScenarioConfig> {
    let file = ScenarioFile::load(path)?;
    let base_dir = path.parent().unwrap_or(Path::new("."));
    Ok(file.resolve(base_dir, keys.next_key()?))
}
