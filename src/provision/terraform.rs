//! `terraform` CLI driver

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use serde::Deserialize;

use super::vars::format_var;
use super::{Provisioner, TerraformOptions};
use crate::common::config::{RetryConfig, TerraformConfig};
use crate::common::{tail_lines, Error, Result};

/// Lines of terraform output kept in error details
const DETAIL_LINES: usize = 20;

/// Captured result of one terraform invocation
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    fn detail(&self) -> String {
        let tail = tail_lines(&self.combined(), DETAIL_LINES);
        match self.code {
            Some(code) => format!("exit code {code}: {tail}"),
            None => format!("terminated by signal: {tail}"),
        }
    }
}

/// Subset of `terraform version -json`
#[derive(Deserialize)]
struct VersionOutput {
    terraform_version: String,
}

/// Drives the terraform binary as a child process
#[derive(Debug, Clone)]
pub struct TerraformCli {
    binary: PathBuf,
    retry: RetryConfig,
}

impl TerraformCli {
    /// Create a driver for an explicit binary
    pub fn new(binary: PathBuf, retry: RetryConfig) -> Self {
        Self { binary, retry }
    }

    /// Resolve the binary from configuration, falling back to PATH
    pub fn from_config(terraform: &TerraformConfig, retry: &RetryConfig) -> Result<Self> {
        let binary = match &terraform.binary {
            Some(path) if path.exists() => path.clone(),
            Some(path) => {
                return Err(Error::tool_not_found(
                    "terraform",
                    &[path.display().to_string()],
                ))
            }
            None => which::which("terraform")
                .map_err(|_| Error::tool_not_found("terraform", &["PATH"]))?,
        };
        Ok(Self::new(binary, retry.clone()))
    }

    /// Path of the binary in use
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Installed terraform version
    pub fn version(&self) -> Result<semver::Version> {
        let out = self.exec(Path::new("."), &Default::default(), &["version", "-json"])?;
        if !out.success {
            return Err(Error::Internal(format!(
                "terraform version failed: {}",
                out.detail()
            )));
        }
        let parsed: VersionOutput = serde_json::from_str(&out.stdout)?;
        semver::Version::parse(parsed.terraform_version.trim_start_matches('v')).map_err(|e| {
            Error::Internal(format!(
                "Unparseable terraform version '{}': {}",
                parsed.terraform_version, e
            ))
        })
    }

    /// Fail unless the installed version is at least `min_version`
    pub fn check_version(&self, min_version: &str) -> Result<semver::Version> {
        let found = self.version()?;
        let required = semver::Version::parse(min_version)
            .map_err(|e| Error::Config(format!("Invalid minimum version '{min_version}': {e}")))?;
        if found < required {
            return Err(Error::UnsupportedVersion {
                found: found.to_string(),
                required: required.to_string(),
            });
        }
        Ok(found)
    }

    /// Run one terraform command in `dir`
    fn exec(
        &self,
        dir: &Path,
        env: &std::collections::BTreeMap<String, String>,
        args: &[&str],
    ) -> Result<CommandOutput> {
        tracing::debug!("terraform {} (in {})", args.join(" "), dir.display());

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .env("TF_IN_AUTOMATION", "1")
            .envs(env)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to execute {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run a command, retrying failures whose output matches a retryable error
    fn exec_with_retry(&self, options: &TerraformOptions, args: &[String]) -> Result<CommandOutput> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let mut attempt = 0;
        loop {
            let out = self.exec(&options.dir, &options.env, &args)?;
            if out.success {
                return Ok(out);
            }
            let retryable = is_retryable(&out.combined(), &self.retry.retryable_errors);
            if !retryable || attempt >= self.retry.max_retries {
                return Ok(out);
            }
            attempt += 1;
            tracing::warn!(
                "terraform {} hit a retryable error, retry {}/{} in {}s",
                args.first().copied().unwrap_or_default(),
                attempt,
                self.retry.max_retries,
                self.retry.sleep_secs
            );
            std::thread::sleep(Duration::from_secs(self.retry.sleep_secs));
        }
    }

    fn run_step(&self, step: &str, options: &TerraformOptions, args: Vec<String>) -> Result<()> {
        let out = self.exec_with_retry(options, &args)?;
        if out.success {
            Ok(())
        } else {
            Err(Error::provision(step, &out.detail()))
        }
    }
}

impl Provisioner for TerraformCli {
    fn init_and_apply(&self, options: &TerraformOptions) -> Result<()> {
        self.run_step("init", options, init_args(options))?;
        self.run_step("apply", options, apply_args(options))
    }

    fn output(&self, options: &TerraformOptions, name: &str) -> Result<String> {
        let out = self.exec(
            &options.dir,
            &options.env,
            &["output", "-no-color", "-json", name],
        )?;
        if !out.success {
            return Err(Error::output_read(name, &out.detail()));
        }
        parse_output_value(&out.stdout).map_err(|e| Error::output_read(name, &e.to_string()))
    }

    fn destroy(&self, options: &TerraformOptions) -> Result<()> {
        let out = self.exec_with_retry(options, &destroy_args(options))?;
        if out.success {
            Ok(())
        } else {
            Err(Error::Destroy(out.detail()))
        }
    }
}

fn init_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = vec![
        "init".to_string(),
        "-input=false".to_string(),
        "-no-color".to_string(),
    ];
    if options.upgrade {
        args.push("-upgrade=true".to_string());
    }
    args
}

fn apply_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = vec![
        "apply".to_string(),
        "-input=false".to_string(),
        "-auto-approve".to_string(),
        "-lock=false".to_string(),
        "-no-color".to_string(),
    ];
    push_var_args(&mut args, options);
    args
}

fn destroy_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = vec![
        "destroy".to_string(),
        "-input=false".to_string(),
        "-auto-approve".to_string(),
        "-lock=false".to_string(),
        "-no-color".to_string(),
    ];
    push_var_args(&mut args, options);
    args
}

fn push_var_args(args: &mut Vec<String>, options: &TerraformOptions) {
    for file in &options.var_files {
        args.push(format!("-var-file={}", file.display()));
    }
    for (name, value) in &options.vars {
        args.push("-var".to_string());
        args.push(format_var(name, value));
    }
}

fn is_retryable(output: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| output.contains(p.as_str()))
}

/// Convert `terraform output -json <name>` text to the string the harness compares
///
/// Strings are unquoted, `null` becomes empty, anything else is rendered as
/// compact JSON.
pub fn parse_output_value(json: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(json.trim())?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> TerraformOptions {
        let mut opts = TerraformOptions {
            dir: PathBuf::from("/work"),
            var_files: vec![PathBuf::from("fixtures.us-east-2.tfvars")],
            upgrade: true,
            ..Default::default()
        };
        opts.vars.insert("attributes".to_string(), json!(["42"]));
        opts.vars.insert("enabled".to_string(), json!(true));
        opts
    }

    #[test]
    fn test_init_args_include_upgrade() {
        let mut opts = options();
        assert!(init_args(&opts).contains(&"-upgrade=true".to_string()));
        opts.upgrade = false;
        assert!(!init_args(&opts).iter().any(|a| a.starts_with("-upgrade")));
    }

    #[test]
    fn test_apply_args_order_var_files_before_vars() {
        let args = apply_args(&options());
        assert_eq!(args[0], "apply");
        assert!(args.contains(&"-auto-approve".to_string()));
        let file_pos = args
            .iter()
            .position(|a| a == "-var-file=fixtures.us-east-2.tfvars")
            .unwrap();
        let var_pos = args.iter().position(|a| a == "-var").unwrap();
        assert!(file_pos < var_pos);
        assert!(args.contains(&r#"attributes=["42"]"#.to_string()));
        assert!(args.contains(&"enabled=true".to_string()));
    }

    #[test]
    fn test_destroy_reuses_variables() {
        let args = destroy_args(&options());
        assert_eq!(args[0], "destroy");
        assert!(args.contains(&r#"attributes=["42"]"#.to_string()));
    }

    #[test]
    fn test_parse_output_value() {
        assert_eq!(parse_output_value("\"sg-0123\"\n").unwrap(), "sg-0123");
        assert_eq!(parse_output_value("null").unwrap(), "");
        assert_eq!(parse_output_value("\"\"").unwrap(), "");
        assert_eq!(parse_output_value("[\"a\",\"b\"]").unwrap(), r#"["a","b"]"#);
        assert_eq!(parse_output_value("8080").unwrap(), "8080");
        assert!(parse_output_value("not json").is_err());
    }

    #[test]
    fn test_retryable_detection() {
        let patterns = RetryConfig::default().retryable_errors;
        assert!(is_retryable(
            "Error: Failed to query available provider packages\n",
            &patterns
        ));
        assert!(!is_retryable("Error: InvalidGroup.Duplicate", &patterns));
    }

    #[test]
    fn test_missing_configured_binary() {
        let config = TerraformConfig {
            binary: Some(PathBuf::from("/nonexistent/terraform")),
            ..Default::default()
        };
        let err = TerraformCli::from_config(&config, &RetryConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }
}
