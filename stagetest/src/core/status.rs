//! Stage names, statuses and gate decisions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five stages every orchestrated test goes through.
///
/// The gate and runner accept any stage name; these are the ones the
/// orchestrator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StandardStage {
    /// User-supplied preparation before provisioning.
    Setup,
    /// Persist provisioning options, then init and apply.
    InitApply,
    /// Run validators against the module outputs.
    Validate,
    /// User-supplied cleanup that still sees the module outputs.
    Teardown,
    /// Destroy everything that was provisioned.
    Destroy,
}

impl StandardStage {
    /// All standard stages in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Setup,
        Self::InitApply,
        Self::Validate,
        Self::Teardown,
        Self::Destroy,
    ];

    /// Returns the stage name used for skip signals and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::InitApply => "init_apply",
            Self::Validate => "validate",
            Self::Teardown => "teardown",
            Self::Destroy => "destroy",
        }
    }

    /// Returns true for stages that run as registered cleanups.
    #[must_use]
    pub const fn is_cleanup(&self) -> bool {
        matches!(self, Self::Teardown | Self::Destroy)
    }
}

impl fmt::Display for StandardStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for StandardStage {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Whether the gate lets a stage run on this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDecision {
    /// Execute the stage.
    Run,
    /// Bypass the stage.
    Skip,
}

impl StageDecision {
    /// Returns true if the stage should run.
    #[must_use]
    pub const fn is_run(&self) -> bool {
        matches!(self, Self::Run)
    }

    /// Returns true if the stage should be skipped.
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip)
    }
}

impl fmt::Display for StageDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run => write!(f, "run"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// The outcome of one stage in a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage completed successfully.
    Ok,
    /// Stage was skipped by a skip signal.
    Skip,
    /// Stage failed.
    Fail,
    /// Stage was never reached because an earlier stage failed.
    NotRun,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Fail => write!(f, "fail"),
            Self::NotRun => write!(f, "not_run"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}
