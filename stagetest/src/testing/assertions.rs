//! Test assertions for reports and call logs.

use super::CallLog;
use crate::core::StageStatus;
use crate::orchestrator::TestReport;

/// Asserts that every stage in the report passed or was skipped.
pub fn assert_report_succeeded(report: &TestReport) {
    assert!(
        report.is_success(),
        "Expected a successful run, got:\n{report}"
    );
}

/// Asserts that `stage` finished with `expected`.
pub fn assert_stage_status(report: &TestReport, stage: &str, expected: StageStatus) {
    let actual = report.status_of(stage);
    assert_eq!(
        actual,
        Some(expected),
        "Expected stage '{}' to be {:?}, got {:?}",
        stage,
        expected,
        actual
    );
}

/// Asserts that the report lists exactly `expected` stages, in order.
pub fn assert_stage_order(report: &TestReport, expected: &[&str]) {
    assert_eq!(
        report.stage_names(),
        expected,
        "Unexpected stage order in report:\n{report}"
    );
}

/// Asserts that `first` was recorded before `second`.
pub fn assert_called_before(log: &CallLog, first: &str, second: &str) {
    let entries = log.entries();
    let first_at = log.position(first);
    let second_at = log.position(second);
    assert!(
        matches!((first_at, second_at), (Some(a), Some(b)) if a < b),
        "Expected '{}' before '{}', log: {:?}",
        first,
        second,
        entries
    );
}

/// Asserts that `entry` was recorded exactly `times` times.
pub fn assert_called_times(log: &CallLog, entry: &str, times: usize) {
    assert_eq!(
        log.count(entry),
        times,
        "Expected '{}' {} time(s), log: {:?}",
        entry,
        times,
        log.entries()
    );
}
