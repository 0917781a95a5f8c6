//! Provisioner backed by the `terraform` (or `tofu`) command line.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{ModuleOutputs, ProvisionOptions, Provisioner};
use crate::errors::ProvisionError;

/// Runs the terraform CLI in the module directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformCli;

impl TerraformCli {
    /// Creates a new CLI provisioner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Arguments for `init`.
    #[must_use]
    pub fn init_args(options: &ProvisionOptions) -> Vec<String> {
        let mut args = vec!["init".to_string(), "-upgrade=false".to_string(), "-input=false".to_string()];
        for (key, value) in &options.backend_config {
            args.push(format!("-backend-config={key}={value}"));
        }
        if options.no_color {
            args.push("-no-color".to_string());
        }
        args
    }

    /// Arguments for `apply`.
    #[must_use]
    pub fn apply_args(options: &ProvisionOptions) -> Vec<String> {
        let mut args = vec!["apply".to_string(), "-input=false".to_string(), "-auto-approve".to_string()];
        args.extend(Self::variable_args(options));
        args
    }

    /// Arguments for `destroy`.
    #[must_use]
    pub fn destroy_args(options: &ProvisionOptions) -> Vec<String> {
        let mut args = vec!["destroy".to_string(), "-input=false".to_string(), "-auto-approve".to_string()];
        args.extend(Self::variable_args(options));
        args
    }

    /// Arguments for `output`.
    #[must_use]
    pub fn output_args(_options: &ProvisionOptions) -> Vec<String> {
        vec!["output".to_string(), "-no-color".to_string(), "-json".to_string()]
    }

    fn variable_args(options: &ProvisionOptions) -> Vec<String> {
        let mut args = Vec::new();
        for (name, value) in &options.vars {
            args.push("-var".to_string());
            args.push(format!("{name}={}", format_var_value(value)));
        }
        for file in &options.var_files {
            args.push(format!("-var-file={}", file.display()));
        }
        for target in &options.targets {
            args.push(format!("-target={target}"));
        }
        if !options.lock {
            args.push("-lock=false".to_string());
        }
        if options.no_color {
            args.push("-no-color".to_string());
        }
        args
    }

    #[instrument(skip_all, fields(binary = %options.binary, command = %args.first().map_or("", String::as_str)))]
    async fn run(options: &ProvisionOptions, args: Vec<String>) -> Result<String, ProvisionError> {
        let command_line = format!("{} {}", options.binary, args.join(" "));
        info!(dir = %options.terraform_dir.display(), "Running {}", command_line);

        let output = Command::new(&options.binary)
            .args(&args)
            .current_dir(&options.terraform_dir)
            .envs(&options.env_vars)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ProvisionError::Spawn {
                binary: options.binary.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(stdout = %stdout, stderr = %stderr, "Command finished");

        if output.status.success() {
            Ok(stdout)
        } else {
            Err(ProvisionError::CommandFailed {
                command: command_line,
                status: output.status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl Provisioner for TerraformCli {
    async fn init_and_apply(&self, options: &ProvisionOptions) -> Result<(), ProvisionError> {
        Self::run(options, Self::init_args(options)).await?;
        Self::run(options, Self::apply_args(options)).await?;
        Ok(())
    }

    async fn destroy(&self, options: &ProvisionOptions) -> Result<(), ProvisionError> {
        Self::run(options, Self::destroy_args(options)).await?;
        Ok(())
    }

    async fn output_all(&self, options: &ProvisionOptions) -> Result<ModuleOutputs, ProvisionError> {
        let stdout = Self::run(options, Self::output_args(options)).await?;
        parse_outputs(&stdout)
    }
}

/// Formats a variable value for `-var name=value`.
///
/// Strings are passed verbatim; everything else as JSON, which the CLI
/// accepts for numbers, booleans, lists and maps.
#[must_use]
pub fn format_var_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct OutputEntry {
    value: serde_json::Value,
}

/// Parses `output -json` into output name to value.
pub fn parse_outputs(json: &str) -> Result<ModuleOutputs, ProvisionError> {
    if json.trim().is_empty() {
        return Ok(ModuleOutputs::new());
    }
    let entries: BTreeMap<String, OutputEntry> =
        serde_json::from_str(json).map_err(|err| ProvisionError::InvalidOutput(err.to_string()))?;
    Ok(entries
        .into_iter()
        .map(|(name, entry)| (name, entry.value))
        .collect())
}
