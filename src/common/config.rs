//! Configuration file handling

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::paths::{config_path, default_workdir_root};
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Terraform invocation settings
    #[serde(default)]
    pub terraform: TerraformConfig,

    /// Retry settings for transient terraform failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Scenario scheduling settings
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Terraform invocation settings
#[derive(Debug, Deserialize, Clone)]
pub struct TerraformConfig {
    /// Explicit path to the terraform binary (searched on PATH when unset)
    pub binary: Option<PathBuf>,

    /// Pass `-upgrade` to `terraform init`
    #[serde(default = "default_upgrade")]
    pub upgrade: bool,

    /// Oldest terraform release the harness accepts
    #[serde(default = "default_min_version")]
    pub min_version: String,

    /// Extra environment variables for every terraform invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        Self {
            binary: None,
            upgrade: default_upgrade(),
            min_version: default_min_version(),
            env: BTreeMap::new(),
        }
    }
}

fn default_upgrade() -> bool {
    true
}

fn default_min_version() -> String {
    "0.13.0".to_string()
}

/// Retry settings for transient terraform failures
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause between attempts
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,

    /// Output substrings that mark a failure as retryable
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            sleep_secs: default_sleep_secs(),
            retryable_errors: default_retryable_errors(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_sleep_secs() -> u64 {
    5
}
fn default_retryable_errors() -> Vec<String> {
    [
        "RequestError: send request failed",
        "Error installing provider",
        "Failed to query available provider packages",
        "timeout while waiting for plugin to start",
        "could not query provider registry",
        "TLS handshake timeout",
        "connection reset by peer",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Scenario scheduling settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Maximum number of parallel scenarios in flight
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Leave temporary working copies on disk after teardown
    #[serde(default)]
    pub keep_workdirs: bool,

    /// Parent directory for temporary working copies
    pub workdir_root: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            keep_workdirs: false,
            workdir_root: None,
        }
    }
}

fn default_max_parallel() -> usize {
    4
}

impl RunnerConfig {
    /// Directory that holds temporary working copies
    pub fn workdir_root(&self) -> PathBuf {
        self.workdir_root.clone().unwrap_or_else(default_workdir_root)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        if config.runner.max_parallel == 0 {
            return Err(super::Error::ConfigParse(
                "runner.max_parallel must be at least 1".to_string(),
            ));
        }
        semver::Version::parse(&config.terraform.min_version).map_err(|e| {
            super::Error::ConfigParse(format!(
                "terraform.min_version '{}' is not a version: {}",
                config.terraform.min_version, e
            ))
        })?;
        Ok(config)
    }
}
