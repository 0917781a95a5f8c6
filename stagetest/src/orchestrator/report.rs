//! Per-stage outcome of an orchestrated run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::core::StageStatus;
use crate::utils::Timestamp;

/// The outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage: String,
    /// Final status.
    pub status: StageStatus,
    /// Wall time spent in the stage, zero when it did not run.
    pub duration_ms: f64,
    /// Error message when the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    /// Creates a record without an error.
    #[must_use]
    pub fn new(stage: impl Into<String>, status: StageStatus, duration_ms: f64) -> Self {
        Self {
            stage: stage.into(),
            status,
            duration_ms,
            error: None,
        }
    }

    /// Creates a record for a stage that was never reached.
    #[must_use]
    pub fn not_run(stage: impl Into<String>) -> Self {
        Self::new(stage, StageStatus::NotRun, 0.0)
    }

    /// Attaches an error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// What happened in one orchestrated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Name of the test.
    pub test_name: String,
    /// Working directory used for persistence.
    pub working_dir: PathBuf,
    /// Stage outcomes in execution order.
    pub stages: Vec<StageRecord>,
    /// When the run started.
    pub started_at: Timestamp,
    /// Total wall time of the run.
    pub duration_ms: f64,
}

impl TestReport {
    /// Returns the record of `stage`, if the run knows about it.
    #[must_use]
    pub fn stage(&self, stage: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.stage == stage)
    }

    /// Returns the status of `stage`.
    #[must_use]
    pub fn status_of(&self, stage: &str) -> Option<StageStatus> {
        self.stage(stage).map(|record| record.status)
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|record| record.stage.as_str()).collect()
    }

    /// Returns the names of stages that failed.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|record| record.status.is_failure())
            .map(|record| record.stage.as_str())
            .collect()
    }

    /// Returns true if no stage failed or was left unreached.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.stages.iter().all(|record| record.status.is_success())
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({}) in {:.1}ms",
            self.test_name,
            self.working_dir.display(),
            self.duration_ms
        )?;
        for record in &self.stages {
            write!(f, "  {:<12} {}", record.stage, record.status)?;
            if let Some(error) = &record.error {
                write!(f, ": {error}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::now_utc;

    fn report() -> TestReport {
        TestReport {
            test_name: "hello_world".into(),
            working_dir: PathBuf::from("/tmp/wd"),
            stages: vec![
                StageRecord::new("init_apply", StageStatus::Ok, 10.0),
                StageRecord::new("validate", StageStatus::Fail, 2.0).with_error("bad output"),
                StageRecord::new("destroy", StageStatus::Skip, 0.0),
            ],
            started_at: now_utc(),
            duration_ms: 12.0,
        }
    }

    #[test]
    fn test_lookup() {
        let report = report();
        assert_eq!(report.status_of("validate"), Some(StageStatus::Fail));
        assert_eq!(report.status_of("setup"), None);
        assert_eq!(report.stage_names(), ["init_apply", "validate", "destroy"]);
        assert_eq!(report.failed_stages(), ["validate"]);
        assert!(!report.is_success());
    }

    #[test]
    fn test_not_run_is_not_success() {
        let mut report = report();
        report.stages = vec![StageRecord::not_run("validate")];
        assert!(!report.is_success());
    }

    #[test]
    fn test_display() {
        let rendered = report().to_string();
        assert!(rendered.contains("validate     fail: bad output"));
        assert!(rendered.contains("destroy      skip"));
    }

    #[test]
    fn test_serializes_without_empty_error() {
        let json = serde_json::to_value(StageRecord::new("destroy", StageStatus::Ok, 1.0)).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "ok");
    }
}
