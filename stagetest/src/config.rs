//! Harness configuration.
//!
//! Everything the orchestrator reads from the environment is read once, here,
//! into a plain value that can also be built by hand in tests.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::failure::FailureMode;
use crate::gate::SkipConfig;
use crate::store::DEFAULT_DATA_DIR;

/// Environment variable overriding [`HarnessConfig::workdir_root`].
pub const WORKDIR_ROOT_ENV: &str = "STAGETEST_WORKDIR_ROOT";

/// Environment variable overriding [`HarnessConfig::validator_mode`].
pub const VALIDATOR_MODE_ENV: &str = "STAGETEST_VALIDATOR_MODE";

/// Default root for derived working directories.
pub const DEFAULT_WORKDIR_ROOT: &str = ".stagetest";

/// Configuration shared by every run of an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Root under which working directories are derived from test names.
    #[serde(default = "default_workdir_root")]
    pub workdir_root: PathBuf,
    /// Name of the directory holding persisted values.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Stages to skip on this invocation.
    #[serde(default)]
    pub skip: SkipConfig,
    /// How the validate stage treats failing validators.
    #[serde(default)]
    pub validator_mode: FailureMode,
}

fn default_workdir_root() -> PathBuf {
    PathBuf::from(DEFAULT_WORKDIR_ROOT)
}

fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workdir_root: default_workdir_root(),
            data_dir: default_data_dir(),
            skip: SkipConfig::default(),
            validator_mode: FailureMode::default(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration with defaults and no skipped stages.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Builds the configuration from `(name, value)` pairs.
    ///
    /// An unparseable validator mode is logged and replaced by the default.
    #[must_use]
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars: Vec<(String, String)> = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();

        let mut config = Self {
            skip: SkipConfig::from_vars(vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
            ..Self::default()
        };

        for (name, value) in &vars {
            match name.as_str() {
                WORKDIR_ROOT_ENV if !value.trim().is_empty() => {
                    config.workdir_root = PathBuf::from(value);
                }
                VALIDATOR_MODE_ENV => match value.parse() {
                    Ok(mode) => config.validator_mode = mode,
                    Err(err) => warn!(variable = VALIDATOR_MODE_ENV, error = %err, "Ignoring invalid value"),
                },
                _ => {}
            }
        }
        config
    }

    /// Sets the working directory root.
    #[must_use]
    pub fn with_workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workdir_root = root.into();
        self
    }

    /// Sets the data directory name.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Sets the skip configuration.
    #[must_use]
    pub fn with_skip(mut self, skip: SkipConfig) -> Self {
        self.skip = skip;
        self
    }

    /// Sets the validator mode.
    #[must_use]
    pub fn with_validator_mode(mut self, mode: FailureMode) -> Self {
        self.validator_mode = mode;
        self
    }
}
