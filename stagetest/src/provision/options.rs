//! Provisioning options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything needed to apply or destroy one module.
///
/// The options are persisted by the init_apply stage so that destroy can run
/// from a later process that never saw the original test plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionOptions {
    /// Directory containing the module's configuration.
    pub terraform_dir: PathBuf,
    /// Binary to invoke (`terraform` or `tofu`).
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Input variables passed with `-var`.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Variable files passed with `-var-file`.
    #[serde(default)]
    pub var_files: Vec<PathBuf>,
    /// Environment variables set for every invocation.
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
    /// Backend settings passed to `init` with `-backend-config`.
    #[serde(default)]
    pub backend_config: BTreeMap<String, String>,
    /// Resource addresses passed with `-target`.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Whether to pass `-no-color`.
    #[serde(default = "default_true")]
    pub no_color: bool,
    /// Whether state locking is enabled.
    #[serde(default = "default_true")]
    pub lock: bool,
}

fn default_binary() -> String {
    "terraform".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            terraform_dir: PathBuf::from("."),
            binary: default_binary(),
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            env_vars: BTreeMap::new(),
            backend_config: BTreeMap::new(),
            targets: Vec::new(),
            no_color: default_true(),
            lock: default_true(),
        }
    }
}

impl ProvisionOptions {
    /// Creates options for the module in `terraform_dir`.
    #[must_use]
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the binary to invoke.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Adds an input variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    /// Adds a variable file.
    #[must_use]
    pub fn with_var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    /// Adds a backend configuration entry.
    #[must_use]
    pub fn with_backend_config(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend_config.insert(name.into(), value.into());
        self
    }

    /// Adds a target resource address.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Enables or disables colored output.
    #[must_use]
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Enables or disables state locking.
    #[must_use]
    pub fn with_lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }
}
