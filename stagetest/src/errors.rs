//! Error types for the stagetest harness.
//!
//! Three conditions matter to callers: a persisted key that was never written
//! (`MissingKey`), a stage that failed while running forward (`StageFailure`)
//! and a teardown/destroy cleanup that failed (`CleanupFailure`). A whole run
//! that saw any of them is reported as `TestFailed`, which keeps every failure
//! visible instead of letting one mask another.

use std::path::PathBuf;
use thiserror::Error;

use crate::failure::{FailureRecord, FailureSummary};
use crate::orchestrator::TestReport;

/// The main error type for stagetest operations.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A persistence store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The provisioning tool reported an error.
    #[error("{0}")]
    Provision(#[from] ProvisionError),

    /// A user callback (setup, validator or teardown) returned an error.
    #[error("{0:#}")]
    Callback(#[from] anyhow::Error),

    /// A callback or stage body panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// One or more validators failed.
    #[error("{} validator(s) failed: {}", failures.len(), join_failures(failures))]
    ValidationFailed {
        /// The individual validator failures, in execution order.
        failures: Vec<FailureRecord>,
    },

    /// A forward stage (setup, init_apply, validate) failed.
    #[error("stage '{stage}' failed: {source}")]
    StageFailure {
        /// The stage name.
        stage: String,
        /// What went wrong inside the stage.
        #[source]
        source: Box<HarnessError>,
    },

    /// A registered cleanup stage (teardown, destroy) failed.
    #[error("cleanup stage '{stage}' failed: {source}")]
    CleanupFailure {
        /// The stage name.
        stage: String,
        /// What went wrong inside the cleanup.
        #[source]
        source: Box<HarnessError>,
    },

    /// The orchestrated test run finished with at least one failure.
    #[error("test failed: {}", .0.summary)]
    TestFailed(Box<TestFailure>),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything known about a failed orchestrated run.
#[derive(Debug)]
pub struct TestFailure {
    /// Every failure observed, in occurrence order.
    pub summary: FailureSummary,
    /// Per-stage outcome of the run.
    pub report: TestReport,
}

impl HarnessError {
    /// Wraps an error as the failure of a forward stage.
    ///
    /// An error that already names a stage is returned unchanged.
    #[must_use]
    pub fn stage_failure(stage: impl Into<String>, source: Self) -> Self {
        match source {
            Self::StageFailure { .. } | Self::CleanupFailure { .. } => source,
            other => Self::StageFailure {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// Re-labels an error as the failure of a cleanup stage.
    #[must_use]
    pub fn into_cleanup_failure(self, stage: impl Into<String>) -> Self {
        match self {
            Self::StageFailure { stage, source } => Self::CleanupFailure { stage, source },
            failure @ Self::CleanupFailure { .. } => failure,
            other => Self::CleanupFailure {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// Returns the stage this error is attributed to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::StageFailure { stage, .. } | Self::CleanupFailure { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Returns true if this error, or the error it wraps, is a missing store key.
    #[must_use]
    pub fn is_missing_key(&self) -> bool {
        match self {
            Self::Store(err) => err.is_missing_key(),
            Self::StageFailure { source, .. } | Self::CleanupFailure { source, .. } => {
                source.is_missing_key()
            }
            _ => false,
        }
    }

    /// Returns a short type name used in failure records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(StoreError::MissingKey { .. }) => "MissingKey",
            Self::Store(_) => "StoreError",
            Self::Provision(_) => "ProvisionError",
            Self::Callback(_) => "CallbackError",
            Self::Panicked(_) => "Panic",
            Self::ValidationFailed { .. } => "ValidationFailed",
            Self::StageFailure { .. } => "StageFailure",
            Self::CleanupFailure { .. } => "CleanupFailure",
            Self::TestFailed(_) => "TestFailed",
            Self::Io(_) => "IoError",
        }
    }

    /// Returns the failure details of a failed test run.
    #[must_use]
    pub fn test_failure(&self) -> Option<&TestFailure> {
        match self {
            Self::TestFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

fn join_failures(failures: &[FailureRecord]) -> String {
    failures
        .iter()
        .map(|f| f.error.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Boxed error produced by a codec.
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the keyed persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No value has been written for this key in this working directory.
    #[error("no value stored under key '{key}' in {}", working_dir.display())]
    MissingKey {
        /// The working directory namespace.
        working_dir: PathBuf,
        /// The key that was read.
        key: String,
    },

    /// The key cannot be used as a file name.
    #[error("invalid store key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// The value could not be encoded.
    #[error("failed to encode value for key '{key}': {source}")]
    Encode {
        /// The key being written.
        key: String,
        /// The codec error.
        #[source]
        source: CodecError,
    },

    /// The stored bytes could not be decoded into the requested type.
    #[error("failed to decode value for key '{key}' from {}: {source}", path.display())]
    Decode {
        /// The key being read.
        key: String,
        /// The file holding the value.
        path: PathBuf,
        /// The codec error.
        #[source]
        source: CodecError,
    },

    /// Reading or writing the backing file failed.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Returns true if this is a `MissingKey` error.
    #[must_use]
    pub fn is_missing_key(&self) -> bool {
        matches!(self, Self::MissingKey { .. })
    }
}

/// Errors raised by a provisioning tool.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The tool binary could not be started.
    #[error("failed to launch '{binary}': {source}")]
    Spawn {
        /// The binary name or path.
        binary: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but exited unsuccessfully.
    #[error("'{command}' exited with {}: {stderr}", status.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// The exit code, if the process exited normally.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The tool's output could not be interpreted.
    #[error("invalid provisioner output: {0}")]
    InvalidOutput(String),

    /// Any other provisioner failure.
    #[error("{0}")]
    Other(String),
}

impl ProvisionError {
    /// Creates a generic provisioner error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_key() -> HarnessError {
        StoreError::MissingKey {
            working_dir: PathBuf::from("/tmp/wd"),
            key: "ProvisionOptions".to_string(),
        }
        .into()
    }

    #[test]
    fn test_missing_key_message() {
        let err = missing_key();
        assert_eq!(
            err.to_string(),
            "no value stored under key 'ProvisionOptions' in /tmp/wd"
        );
        assert!(err.is_missing_key());
        assert_eq!(err.kind(), "MissingKey");
    }

    #[test]
    fn test_stage_failure_wraps_once() {
        let err = HarnessError::stage_failure("validate", HarnessError::Panicked("boom".into()));
        assert_eq!(err.stage(), Some("validate"));

        let rewrapped = HarnessError::stage_failure("other", err);
        assert_eq!(rewrapped.stage(), Some("validate"));
        assert_eq!(rewrapped.to_string(), "stage 'validate' failed: panicked: boom");
    }

    #[test]
    fn test_missing_key_seen_through_wrappers() {
        let err = HarnessError::stage_failure("destroy", missing_key()).into_cleanup_failure("destroy");
        assert!(matches!(err, HarnessError::CleanupFailure { .. }));
        assert!(err.is_missing_key());
    }

    #[test]
    fn test_command_failed_message() {
        let err = ProvisionError::CommandFailed {
            command: "terraform apply".into(),
            status: Some(1),
            stderr: "Error: no provider".into(),
        };
        assert_eq!(
            err.to_string(),
            "'terraform apply' exited with status 1: Error: no provider"
        );

        let signalled = ProvisionError::CommandFailed {
            command: "terraform apply".into(),
            status: None,
            stderr: String::new(),
        };
        assert!(signalled.to_string().contains("a signal"));
    }

    #[test]
    fn test_validation_failed_message() {
        let err = HarnessError::ValidationFailed {
            failures: vec![
                FailureRecord::assertion("validate", "first"),
                FailureRecord::assertion("validate", "second"),
            ],
        };
        assert_eq!(err.to_string(), "2 validator(s) failed: first; second");
    }
}
