//! Scenario configuration types
//!
//! [`ScenarioFile`] is the YAML document as written; [`ScenarioConfig`] is
//! the immutable, resolved description of one run, with absolute paths and
//! the isolation key substituted.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::expect::OutputExpectation;
use super::isolation::IsolationKey;
use crate::common::{Error, Result};

/// A test scenario loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    /// Terraform configuration under test, relative to the scenario file
    pub source_dir: PathBuf,
    /// Ancestor of `source_dir` to copy as a whole for isolated runs
    pub copy_root: Option<PathBuf>,
    /// Entry names skipped when copying
    #[serde(default)]
    pub copy_exclude: Vec<String>,
    /// Whether the scenario may run concurrently with others
    #[serde(default)]
    pub parallel: bool,
    /// Variable files, relative to the terraform working directory
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// Variables passed with `-var`, merged over the var files
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Output assertions
    #[serde(default)]
    pub expect: Vec<OutputCheck>,
}

/// Assertions for one output
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct OutputCheck {
    /// Output name
    pub output: String,
    /// Expected substring
    pub contains: Option<String>,
    /// Expected exact value
    pub equals: Option<String>,
    /// Expect an empty value
    #[serde(default)]
    pub empty: bool,
    /// Name of another output that must hold the same value
    pub equals_output: Option<String>,
}

impl OutputCheck {
    /// Expectations declared by this check, with the isolation key substituted
    fn expectations(&self, key: &IsolationKey) -> Vec<OutputExpectation> {
        let mut out = Vec::new();
        if let Some(s) = &self.contains {
            out.push(OutputExpectation::Contains(key.render(s)));
        }
        if let Some(s) = &self.equals {
            out.push(OutputExpectation::Equals(key.render(s)));
        }
        if self.empty {
            out.push(OutputExpectation::Empty);
        }
        if let Some(other) = &self.equals_output {
            out.push(OutputExpectation::EqualsOutput(other.clone()));
        }
        out
    }
}

impl ScenarioFile {
    /// Load and parse a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content).map_err(|e| Error::scenario_parse(path, e))
    }

    /// Parse scenario YAML
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let scenario: Self = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        scenario.validate()?;
        Ok(scenario)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("scenario name is empty".to_string());
        }
        for check in &self.expect {
            let declared = usize::from(check.contains.is_some())
                + usize::from(check.equals.is_some())
                + usize::from(check.empty)
                + usize::from(check.equals_output.is_some());
            if declared == 0 {
                return Err(format!(
                    "check for output '{}' declares no assertion",
                    check.output
                ));
            }
            if check.empty && (check.contains.is_some() || check.equals.is_some()) {
                return Err(format!(
                    "check for output '{}' combines 'empty' with a value assertion",
                    check.output
                ));
            }
        }
        Ok(())
    }

    /// Resolve paths against `base_dir` and substitute the isolation key
    pub fn resolve(&self, base_dir: &Path, key: IsolationKey) -> ScenarioConfig {
        let variables = self
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), render_value(value, &key)))
            .collect();
        let expectations = self
            .expect
            .iter()
            .flat_map(|check| {
                check
                    .expectations(&key)
                    .into_iter()
                    .map(move |e| (check.output.clone(), e))
            })
            .collect();

        ScenarioConfig {
            name: self.name.clone(),
            source_dir: base_dir.join(&self.source_dir),
            copy_root: self.copy_root.as_ref().map(|root| base_dir.join(root)),
            copy_exclude: self.copy_exclude.clone(),
            var_files: self.var_files.clone(),
            variables,
            isolation_key: key,
            parallel: self.parallel,
            expectations,
        }
    }
}

/// Substitute the isolation key in every string inside a variable value
fn render_value(value: &Value, key: &IsolationKey) -> Value {
    match value {
        Value::String(s) => Value::String(key.render(s)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, key)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, key)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Immutable description of one scenario run
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub name: String,
    pub source_dir: PathBuf,
    pub copy_root: Option<PathBuf>,
    pub copy_exclude: Vec<String>,
    pub var_files: Vec<PathBuf>,
    pub variables: BTreeMap<String, Value>,
    pub isolation_key: IsolationKey,
    pub parallel: bool,
    pub expectations: Vec<(String, OutputExpectation)>,
}

impl ScenarioConfig {
    /// Start a scenario with no variables or expectations
    pub fn new(name: impl Into<String>, source_dir: impl Into<PathBuf>, key: IsolationKey) -> Self {
        Self {
            name: name.into(),
            source_dir: source_dir.into(),
            copy_root: None,
            copy_exclude: Vec::new(),
            var_files: Vec::new(),
            variables: BTreeMap::new(),
            isolation_key: key,
            parallel: false,
            expectations: Vec::new(),
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn copy_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.copy_root = Some(root.into());
        self
    }

    pub fn var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn expect(mut self, output: impl Into<String>, expectation: OutputExpectation) -> Self {
        self.expectations.push((output.into(), expectation));
        self
    }
}
