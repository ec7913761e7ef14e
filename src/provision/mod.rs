//! Provisioning tool integration
//!
//! The runner only talks to the provisioning tool through [`Provisioner`].
//! [`TerraformCli`] shells out to the `terraform` binary; tests substitute
//! recording fakes.

mod terraform;
mod vars;

pub use terraform::{parse_output_value, TerraformCli};
pub use vars::format_var;

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::common::Result;

/// Everything needed to invoke the provisioning tool for one working directory
#[derive(Debug, Clone, Default)]
pub struct TerraformOptions {
    /// Directory terraform runs in
    pub dir: PathBuf,
    /// `-var-file` arguments, in order
    pub var_files: Vec<PathBuf>,
    /// `-var` arguments, applied after the var files
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Pass `-upgrade` to `init`
    pub upgrade: bool,
    /// Extra environment for the child process
    pub env: BTreeMap<String, String>,
}

/// Contract with the external provisioning tool
pub trait Provisioner: Send + Sync {
    /// Initialize the working directory and apply the configuration
    fn init_and_apply(&self, options: &TerraformOptions) -> Result<()>;

    /// Read one named output as a string
    fn output(&self, options: &TerraformOptions, name: &str) -> Result<String>;

    /// Destroy everything the working directory's state tracks
    fn destroy(&self, options: &TerraformOptions) -> Result<()>;
}
