//! Scenario runner
//!
//! Drives one scenario end-to-end: prepare a working directory, apply,
//! read outputs, assert, tear down. Teardown is owned by a guard created
//! before provisioning starts, so it runs exactly once on every exit path.
//! A panic in the provisioning or assertion phases is caught, the guard is
//! finished normally, and the run is reported as aborted with its real
//! teardown status.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use super::config::ScenarioConfig;
use super::expect::{self, OutputExpectation, Violation};
use super::workdir::{self, CopySpec, WorkDir};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::provision::{Provisioner, TerraformOptions};

/// Directory and merged variables used for one scenario's provisioning calls
#[derive(Debug)]
pub struct WorkingContext {
    scenario: String,
    options: TerraformOptions,
    workdir: WorkDir,
}

impl WorkingContext {
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn options(&self) -> &TerraformOptions {
        &self.options
    }

    pub fn dir(&self) -> &std::path::Path {
        self.workdir.path()
    }

    pub fn is_isolated(&self) -> bool {
        self.workdir.is_isolated()
    }
}

/// Outcome of the provisioning and assertion phases
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Passed,
    AssertionsFailed(Vec<Violation>),
    ProvisionFailed(String),
    SetupFailed(String),
    /// The run never completed (interrupted before start, or panicked)
    Aborted(String),
}

/// Outcome of teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownStatus {
    /// Nothing was prepared, so nothing was destroyed
    Skipped,
    Destroyed,
    /// Destroy failed; resources may have leaked
    Failed(String),
}

/// Result of a scenario run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub name: String,
    pub isolation_key: String,
    pub working_dir: Option<PathBuf>,
    pub outputs: BTreeMap<String, String>,
    pub status: RunStatus,
    pub teardown: TeardownStatus,
}

impl RunResult {
    fn new(config: &ScenarioConfig) -> Self {
        Self {
            name: config.name.clone(),
            isolation_key: config.isolation_key.to_string(),
            working_dir: None,
            outputs: BTreeMap::new(),
            status: RunStatus::Passed,
            teardown: TeardownStatus::Skipped,
        }
    }

    /// Result for a scenario that did not run to completion
    pub fn aborted(config: &ScenarioConfig, reason: &str) -> Self {
        Self {
            status: RunStatus::Aborted(reason.to_string()),
            ..Self::new(config)
        }
    }

    /// Whether the scenario passed; teardown problems do not change this
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

/// Runner settings
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Pass `-upgrade` to `terraform init`
    pub upgrade: bool,
    /// Environment for every provisioning call
    pub env: BTreeMap<String, String>,
    /// Parent directory for isolated working copies
    pub workdir_root: PathBuf,
    /// Leave isolated copies on disk after teardown
    pub keep_workdirs: bool,
}

impl RunnerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upgrade: config.terraform.upgrade,
            env: config.terraform.env.clone(),
            workdir_root: config.runner.workdir_root(),
            keep_workdirs: config.runner.keep_workdirs,
        }
    }
}

/// Executes scenarios against a provisioner
#[derive(Clone)]
pub struct ScenarioRunner {
    provisioner: Arc<dyn Provisioner>,
    options: RunnerOptions,
}

impl ScenarioRunner {
    pub fn new(provisioner: Arc<dyn Provisioner>, options: RunnerOptions) -> Self {
        Self {
            provisioner,
            options,
        }
    }

    /// Resolve the working directory and merged variables for a scenario
    ///
    /// Parallel scenarios get a private temporary copy; others use the
    /// source directory in place.
    pub fn prepare(&self, config: &ScenarioConfig) -> Result<WorkingContext> {
        let workdir = if config.parallel {
            let prefix = format!("{}-{}-", dir_safe(&config.name), config.isolation_key);
            let spec = CopySpec {
                root: config.copy_root.as_deref(),
                exclude: &config.copy_exclude,
                prefix: &prefix,
            };
            workdir::isolated_copy(&config.source_dir, &self.options.workdir_root, &spec)?
        } else {
            if !config.source_dir.is_dir() {
                return Err(Error::Setup(format!(
                    "Source directory '{}' does not exist",
                    config.source_dir.display()
                )));
            }
            WorkDir::shared(config.source_dir.clone())
        };

        let options = TerraformOptions {
            dir: workdir.path().to_path_buf(),
            var_files: config.var_files.clone(),
            vars: config.variables.clone(),
            upgrade: self.options.upgrade,
            env: self.options.env.clone(),
        };

        tracing::debug!(
            "Prepared '{}' in {} (key {})",
            config.name,
            workdir.path().display(),
            config.isolation_key
        );

        Ok(WorkingContext {
            scenario: config.name.clone(),
            options,
            workdir,
        })
    }

    /// Initialize and apply the configuration
    pub fn apply(&self, context: &WorkingContext) -> Result<()> {
        tracing::info!("Applying '{}'", context.scenario);
        self.provisioner.init_and_apply(&context.options)
    }

    /// Read the named outputs; unreadable outputs resolve to the empty string
    pub fn read_outputs(
        &self,
        context: &WorkingContext,
        names: &BTreeSet<String>,
    ) -> BTreeMap<String, String> {
        names
            .iter()
            .map(|name| {
                let value = self
                    .provisioner
                    .output(&context.options, name)
                    .unwrap_or_else(|e| {
                        tracing::debug!("Treating output '{}' as empty: {}", name, e);
                        String::new()
                    });
                (name.clone(), value)
            })
            .collect()
    }

    /// Destroy provisioned resources and release the working directory
    pub fn teardown(&self, context: WorkingContext) -> TeardownStatus {
        tracing::info!("Destroying '{}'", context.scenario);
        let status = match self.provisioner.destroy(&context.options) {
            Ok(()) => TeardownStatus::Destroyed,
            Err(e) => {
                tracing::error!(
                    "Destroy of '{}' failed, resources may have leaked (state in {}): {}",
                    context.scenario,
                    context.workdir.path().display(),
                    e
                );
                TeardownStatus::Failed(e.to_string())
            }
        };

        // Leaked resources are only recoverable from the state in the copy
        let keep = self.options.keep_workdirs || matches!(status, TeardownStatus::Failed(_));
        match context.workdir.release(keep) {
            Ok(Some(path)) => tracing::info!("Kept working directory {}", path.display()),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to remove working directory: {}", e),
        }
        status
    }

    /// Run a scenario end-to-end
    pub fn run(&self, config: &ScenarioConfig) -> RunResult {
        let mut result = RunResult::new(config);

        let context = match self.prepare(config) {
            Ok(context) => context,
            Err(e) => {
                result.status = RunStatus::SetupFailed(e.to_string());
                return result;
            }
        };
        result.working_dir = Some(context.dir().to_path_buf());

        let guard = TeardownGuard::new(self, context);

        let phases = panic::catch_unwind(AssertUnwindSafe(|| {
            self.provision_and_check(guard.context(), config)
        }));
        match phases {
            Ok((status, outputs)) => {
                result.status = status;
                result.outputs = outputs;
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!("Scenario '{}' panicked: {}", config.name, reason);
                result.status = RunStatus::Aborted(format!("panicked: {reason}"));
            }
        }

        result.teardown = guard.finish();
        result
    }

    fn provision_and_check(
        &self,
        context: &WorkingContext,
        config: &ScenarioConfig,
    ) -> (RunStatus, BTreeMap<String, String>) {
        if let Err(e) = self.apply(context) {
            return (RunStatus::ProvisionFailed(e.to_string()), BTreeMap::new());
        }

        let names = expect::referenced_outputs(&config.expectations);
        let outputs = self.read_outputs(context, &names);
        let status = match expect::evaluate(&outputs, &config.expectations) {
            Ok(()) => RunStatus::Passed,
            Err(violations) => RunStatus::AssertionsFailed(violations),
        };
        (status, outputs)
    }
}

/// Evaluate expectations against a run's outputs
pub fn assert(
    result: &RunResult,
    expectations: &[(String, OutputExpectation)],
) -> std::result::Result<(), Vec<Violation>> {
    expect::evaluate(&result.outputs, expectations)
}

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Scenario name reduced to characters safe in a directory name
fn dir_safe(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Owns a prepared context and tears it down exactly once
struct TeardownGuard<'a> {
    runner: &'a ScenarioRunner,
    context: Option<WorkingContext>,
}

impl<'a> TeardownGuard<'a> {
    fn new(runner: &'a ScenarioRunner, context: WorkingContext) -> Self {
        Self {
            runner,
            context: Some(context),
        }
    }

    fn context(&self) -> &WorkingContext {
        // only `finish` and `drop` take the context, and both consume the guard
        self.context
            .as_ref()
            .unwrap_or_else(|| unreachable!("teardown guard used after finish"))
    }

    fn finish(mut self) -> TeardownStatus {
        match self.context.take() {
            Some(context) => self.runner.teardown(context),
            None => TeardownStatus::Skipped,
        }
    }
}

impl Drop for TeardownGuard<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            tracing::warn!(
                "Scenario '{}' aborted, destroying before unwinding",
                context.scenario
            );
            self.runner.teardown(context);
        }
    }
}
