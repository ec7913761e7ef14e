//! Error types for the scenario harness
//!
//! Messages carry the captured terraform output where there is one, so a
//! failing scenario can be diagnosed from the report alone.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the scenario harness
#[derive(Error, Debug)]
pub enum Error {
    // === Scenario Lifecycle Errors ===
    #[error("Scenario setup failed: {0}")]
    Setup(String),

    #[error("Provisioning failed ({step}): {detail}")]
    Provision { step: String, detail: String },

    #[error("Output '{name}' could not be read: {detail}")]
    OutputRead { name: String, detail: String },

    #[error("Destroy failed, resources may have leaked: {0}")]
    Destroy(String),

    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Tool Errors ===
    #[error("Terraform binary '{name}' not found. Searched: {searched}")]
    ToolNotFound { name: String, searched: String },

    #[error("Terraform {found} is older than the required {required}")]
    UnsupportedVersion { found: String, required: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid scenario '{path}': {reason}")]
    ScenarioParse { path: String, reason: String },

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a tool not found error with the locations that were searched
    pub fn tool_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::ToolNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create a provisioning error for a terraform step
    pub fn provision(step: &str, detail: &str) -> Self {
        Self::Provision {
            step: step.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Create an output read error
    pub fn output_read(name: &str, detail: &str) -> Self {
        Self::OutputRead {
            name: name.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Create a scenario parse error
    pub fn scenario_parse(path: &std::path::Path, reason: impl ToString) -> Self {
        Self::ScenarioParse {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}
