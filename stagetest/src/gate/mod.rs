//! Stage gate: decides whether a stage runs on this invocation.
//!
//! Skip signals come from `SKIP_<stage>` environment variables, but the gate
//! itself never touches the environment. [`SkipConfig::from_env`] reads the
//! process environment once and the gate consults that snapshot.
//!
//! ```
//! use stagetest::core::StageDecision;
//! use stagetest::gate::{SkipConfig, StageGate};
//!
//! let gate = StageGate::new(SkipConfig::from_vars([("SKIP_destroy", "true")]));
//! assert_eq!(gate.should_run("destroy"), StageDecision::Skip);
//! assert_eq!(gate.should_run("validate"), StageDecision::Run);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::core::StageDecision;

/// Prefix of the environment variables that carry skip signals.
pub const SKIP_ENV_PREFIX: &str = "SKIP_";

/// Returns the environment variable that skips `stage`.
#[must_use]
pub fn skip_env_var(stage: &str) -> String {
    format!("{SKIP_ENV_PREFIX}{stage}")
}

/// Returns true if a skip variable's value asks for a skip.
///
/// Any non-empty value does, except `0`, `false`, `no` and `off`.
#[must_use]
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty()
        && !matches!(
            value.to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        )
}

fn normalize(stage: &str) -> String {
    stage.trim().to_ascii_lowercase()
}

/// Explicit mapping from stage name to "skip this stage".
///
/// Stage names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipConfig {
    #[serde(default)]
    stages: BTreeMap<String, bool>,
}

impl SkipConfig {
    /// Creates a configuration with no skip signals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every `SKIP_*` variable from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Builds a configuration from `(name, value)` pairs.
    ///
    /// Pairs whose name does not start with `SKIP_` are ignored.
    #[must_use]
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::new();
        for (name, value) in vars {
            let Some(stage) = name.as_ref().strip_prefix(SKIP_ENV_PREFIX) else {
                continue;
            };
            if stage.is_empty() {
                continue;
            }
            let skip = is_truthy(value.as_ref());
            debug!(stage = %stage, skip, "Read skip signal");
            config.stages.insert(normalize(stage), skip);
        }
        config
    }

    /// Marks a stage as skipped.
    #[must_use]
    pub fn skip(mut self, stage: impl AsRef<str>) -> Self {
        self.stages.insert(normalize(stage.as_ref()), true);
        self
    }

    /// Sets the skip flag of a stage explicitly.
    #[must_use]
    pub fn with_stage(mut self, stage: impl AsRef<str>, skip: bool) -> Self {
        self.stages.insert(normalize(stage.as_ref()), skip);
        self
    }

    /// Returns true if the stage has a skip signal.
    #[must_use]
    pub fn is_skipped(&self, stage: &str) -> bool {
        self.stages.get(&normalize(stage)).copied().unwrap_or(false)
    }

    /// Returns true if any stage has a skip signal.
    #[must_use]
    pub fn any_skipped(&self) -> bool {
        self.stages.values().any(|skip| *skip)
    }

    /// Returns the names of every skipped stage.
    #[must_use]
    pub fn skipped_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|(_, skip)| **skip)
            .map(|(stage, _)| stage.as_str())
            .collect()
    }
}

/// Decides run/skip per stage from a [`SkipConfig`].
///
/// Absence of a signal means run.
#[derive(Debug, Clone, Default)]
pub struct StageGate {
    config: SkipConfig,
}

impl StageGate {
    /// Creates a gate over an explicit skip configuration.
    #[must_use]
    pub fn new(config: SkipConfig) -> Self {
        Self { config }
    }

    /// Creates a gate that runs every stage.
    #[must_use]
    pub fn run_all() -> Self {
        Self::default()
    }

    /// Decides whether `stage` runs.
    #[must_use]
    pub fn should_run(&self, stage: &str) -> StageDecision {
        if self.config.is_skipped(stage) {
            StageDecision::Skip
        } else {
            StageDecision::Run
        }
    }

    /// Returns the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &SkipConfig {
        &self.config
    }
}
