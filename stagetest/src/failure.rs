//! Failure records and collection for a test run.
//!
//! Stage failures, cleanup failures and soft assertion failures all end up in
//! one [`FailureSummary`] so none of them hides another.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::HarnessError;
use crate::utils::iso_timestamp;

/// How the validate stage reacts to a failing validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Run every validator and report all failures (default).
    #[default]
    Accumulate,
    /// Stop at the first failing validator.
    FailFast,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accumulate => write!(f, "accumulate"),
            Self::FailFast => write!(f, "fail_fast"),
        }
    }
}

impl std::str::FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "accumulate" => Ok(Self::Accumulate),
            "fail_fast" | "failfast" => Ok(Self::FailFast),
            other => Err(format!("unknown failure mode '{other}'")),
        }
    }
}

/// Where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A forward stage failed.
    Stage,
    /// A teardown or destroy cleanup failed.
    Cleanup,
    /// A validator or a soft check on the test handle failed.
    Assertion,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stage => write!(f, "stage"),
            Self::Cleanup => write!(f, "cleanup"),
            Self::Assertion => write!(f, "assertion"),
        }
    }
}

/// Record of a single failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage the failure is attributed to.
    pub stage: String,
    /// Failure category.
    pub kind: FailureKind,
    /// Error message.
    pub error: String,
    /// Error type name.
    pub error_type: String,
    /// When the failure was recorded (ISO 8601).
    pub timestamp: String,
}

impl FailureRecord {
    /// Creates a new failure record.
    #[must_use]
    pub fn new(stage: impl Into<String>, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            kind,
            error: error.into(),
            error_type: "Error".to_string(),
            timestamp: iso_timestamp(),
        }
    }

    /// Creates an assertion failure record.
    #[must_use]
    pub fn assertion(stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self::new(stage, FailureKind::Assertion, error).with_error_type("AssertionFailed")
    }

    /// Creates a record from a harness error.
    ///
    /// The stage is taken from the error when it names one.
    #[must_use]
    pub fn from_error(fallback_stage: &str, kind: FailureKind, error: &HarnessError) -> Self {
        let stage = error.stage().unwrap_or(fallback_stage);
        Self::new(stage, kind, error.to_string()).with_error_type(error.kind())
    }

    /// Sets the error type.
    #[must_use]
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}] {}", self.kind, self.stage, self.error)
    }
}

/// All failures observed during one orchestrated run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureSummary {
    /// Failure records in occurrence order.
    pub failures: Vec<FailureRecord>,
}

impl FailureSummary {
    /// Creates an empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failure.
    pub fn push(&mut self, record: FailureRecord) {
        self.failures.push(record);
    }

    /// Returns true if any failures occurred.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns the number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if no failures occurred.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the failures of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: FailureKind) -> Vec<&FailureRecord> {
        self.failures.iter().filter(|f| f.kind == kind).collect()
    }

    /// Returns the failures attributed to a stage.
    #[must_use]
    pub fn for_stage(&self, stage: &str) -> Vec<&FailureRecord> {
        self.failures.iter().filter(|f| f.stage == stage).collect()
    }
}

impl fmt::Display for FailureSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {failure}")?;
        }
        Ok(())
    }
}

/// Collects validator failures under a [`FailureMode`].
#[derive(Debug)]
pub struct FailureCollector {
    /// Failure mode.
    pub mode: FailureMode,
    failures: Vec<FailureRecord>,
}

impl FailureCollector {
    /// Creates a new failure collector.
    #[must_use]
    pub fn new(mode: FailureMode) -> Self {
        Self {
            mode,
            failures: Vec::new(),
        }
    }

    /// Records a failure.
    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failures.push(record);
    }

    /// Returns true if execution should stop based on mode.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        match self.mode {
            FailureMode::FailFast => !self.failures.is_empty(),
            FailureMode::Accumulate => false,
        }
    }

    /// Returns the recorded failures.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Converts the collected failures into a result.
    pub fn into_result(self) -> Result<(), HarnessError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::ValidationFailed {
                failures: self.failures,
            })
        }
    }
}
