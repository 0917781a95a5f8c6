//! End-to-end runs of the orchestrator against an in-memory provisioner.

use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use stagetest::failure::FailureKind;
use stagetest::prelude::*;
use stagetest::testing::{
    assert_called_before, assert_called_times, assert_report_succeeded, assert_stage_order,
    assert_stage_status, CallLog, MockProvisioner, ProvisionMethod, RecordingCallbacks,
};

fn config(root: &Path) -> HarnessConfig {
    HarnessConfig::new().with_workdir_root(root)
}

fn hello_plan() -> TestPlan<()> {
    TestPlan::new(ProvisionOptions::new("fixtures/hello-world")).validator(|t, outputs, _, _| {
        t.output_eq(outputs, "hello_world", "Hello, World!");
        Ok(())
    })
}

#[tokio::test]
async fn hello_world_passes_and_destroys_afterwards() {
    stagetest::observability::init_tracing();
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockProvisioner::hello_world());
    let orchestrator = Orchestrator::with_config(mock.clone(), config(root.path()));

    let report = orchestrator
        .execute(&TestHandle::new("hello_world"), hello_plan())
        .await
        .unwrap();

    assert_report_succeeded(&report);
    assert_stage_order(&report, &["init_apply", "validate", "destroy"]);
    assert_eq!(
        mock.calls(),
        vec![
            ProvisionMethod::InitAndApply,
            ProvisionMethod::OutputAll,
            ProvisionMethod::Destroy
        ]
    );
}

#[tokio::test]
async fn wrong_output_fails_the_test_but_still_destroys() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockProvisioner::new().with_output("hello_world", "Goodbye".into()));
    let orchestrator = Orchestrator::with_config(mock.clone(), config(root.path()));

    let err = orchestrator
        .execute(&TestHandle::new("wrong_output"), hello_plan())
        .await
        .unwrap_err();

    let failure = err.test_failure().unwrap();
    assert_eq!(failure.summary.len(), 1);
    assert_eq!(failure.summary.failures[0].kind, FailureKind::Assertion);
    assert!(failure.summary.failures[0].error.contains("Goodbye"));
    assert_stage_status(&failure.report, "validate", StageStatus::Fail);
    assert_eq!(mock.call_count(ProvisionMethod::Destroy), 1);
}

#[tokio::test]
async fn setup_runs_strictly_before_validate() {
    let root = tempfile::tempdir().unwrap();
    let log = CallLog::new();
    let mock = Arc::new(MockProvisioner::hello_world().with_call_log(log.clone()));
    let orchestrator = Orchestrator::with_config(mock, config(root.path()));

    let setup_ran = Arc::new(AtomicBool::new(false));
    let flag = setup_ran.clone();
    let seen = setup_ran.clone();
    let validator_log = log.clone();

    let plan = TestPlan::<()>::new(ProvisionOptions::new("fixtures/hello-world"))
        .setup(move |_, _, _| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .validator(move |_, _, _, _| {
            validator_log.record("validate");
            anyhow::ensure!(seen.load(Ordering::SeqCst), "setup did not run first");
            Ok(())
        });

    let report = orchestrator
        .execute(&TestHandle::new("setup_flag"), plan)
        .await
        .unwrap();

    assert!(setup_ran.load(Ordering::SeqCst));
    assert_stage_order(&report, &["setup", "init_apply", "validate", "destroy"]);
    assert_called_before(&log, "init_and_apply", "validate");
}

#[tokio::test]
async fn validate_failure_runs_teardown_then_destroy_once_each() {
    let root = tempfile::tempdir().unwrap();
    let log = CallLog::new();
    let callbacks = RecordingCallbacks::new(log.clone());
    let mock = Arc::new(MockProvisioner::hello_world().with_call_log(log.clone()));
    let orchestrator = Orchestrator::with_config(mock, config(root.path()));

    let plan = TestPlan::<()>::new(ProvisionOptions::new("fixtures/hello-world"))
        .teardown(callbacks.teardown::<()>())
        .validator(|_, _, _, _| panic!("validator blew up"));

    let err = orchestrator
        .execute(&TestHandle::new("validate_panics"), plan)
        .await
        .unwrap_err();

    assert_called_times(&log, "teardown", 1);
    assert_called_times(&log, "destroy", 1);
    assert_called_before(&log, "teardown", "destroy");

    let failure = err.test_failure().unwrap();
    assert_stage_order(
        &failure.report,
        &["init_apply", "validate", "teardown", "destroy"],
    );
    assert!(failure.summary.failures[0].error.contains("validator blew up"));
}

#[tokio::test]
async fn no_setup_means_no_setup_stage() {
    let root = tempfile::tempdir().unwrap();
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator = Orchestrator::with_config(
        Arc::new(MockProvisioner::hello_world()),
        config(root.path()),
    )
    .with_event_sink(sink.clone());

    let report = orchestrator
        .execute(&TestHandle::new("no_setup"), hello_plan())
        .await
        .unwrap();

    assert!(sink.events_for_stage("setup").is_empty());
    assert!(report.status_of("setup").is_none());
    assert_eq!(
        sink.timeline(),
        vec![
            ("stage.started".to_string(), "init_apply".to_string()),
            ("stage.completed".to_string(), "init_apply".to_string()),
            ("stage.started".to_string(), "validate".to_string()),
            ("stage.completed".to_string(), "validate".to_string()),
            ("stage.started".to_string(), "destroy".to_string()),
            ("stage.completed".to_string(), "destroy".to_string()),
        ]
    );
}

#[tokio::test]
async fn skipped_stages_do_not_run() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockProvisioner::hello_world());
    let skip = SkipConfig::from_vars([("SKIP_init_apply", "1"), ("SKIP_destroy", "true")]);
    let orchestrator =
        Orchestrator::with_config(mock.clone(), config(root.path()).with_skip(skip));

    let report = orchestrator
        .execute(&TestHandle::new("skip_apply"), hello_plan())
        .await
        .unwrap();

    assert_stage_status(&report, "init_apply", StageStatus::Skip);
    assert_stage_status(&report, "validate", StageStatus::Ok);
    assert_stage_status(&report, "destroy", StageStatus::Skip);
    assert_eq!(mock.calls(), vec![ProvisionMethod::OutputAll]);
}

#[tokio::test]
async fn crash_recovery_destroys_from_persisted_options() {
    let root = tempfile::tempdir().unwrap();
    let working_dir = root.path().join("vpc");
    let options = ProvisionOptions::new("fixtures/vpc").with_var("cidr", "10.0.0.0/16".into());

    // First run applies but keeps the infrastructure.
    let first = Arc::new(MockProvisioner::new());
    Orchestrator::with_config(
        first.clone(),
        config(root.path()).with_skip(SkipConfig::new().skip("destroy")),
    )
    .execute(
        &TestHandle::new("vpc"),
        TestPlan::<()>::new(options.clone()).working_directory(&working_dir),
    )
    .await
    .unwrap();
    assert_eq!(first.call_count(ProvisionMethod::Destroy), 0);

    // A later process knows only the working directory.
    let second = Arc::new(MockProvisioner::new());
    let status = Orchestrator::with_config(second.clone(), config(root.path()))
        .destroy_only(&working_dir)
        .await
        .unwrap();

    assert_eq!(status, StageStatus::Ok);
    assert_eq!(second.options_for(ProvisionMethod::Destroy), vec![options]);
}

#[tokio::test]
async fn cleanup_only_invocation_skips_forward_stages() {
    let root = tempfile::tempdir().unwrap();
    let working_dir = root.path().join("cleanup-only");
    let options = ProvisionOptions::new("fixtures/vpc");
    FileStore::new()
        .save_provision_options(&working_dir, &options)
        .unwrap();

    let mock = Arc::new(MockProvisioner::new());
    let skip = SkipConfig::new().skip("init_apply").skip("validate");
    let plan = TestPlan::<()>::new(ProvisionOptions::new("ignored"))
        .working_directory(&working_dir)
        .validator(|_, _, _, _| anyhow::bail!("must not run"));

    let report = Orchestrator::with_config(mock.clone(), config(root.path()).with_skip(skip))
        .execute(&TestHandle::new("cleanup_only"), plan)
        .await
        .unwrap();

    assert_stage_status(&report, "validate", StageStatus::Skip);
    assert_eq!(mock.calls(), vec![ProvisionMethod::Destroy]);
    assert_eq!(mock.options_for(ProvisionMethod::Destroy), vec![options]);
}

#[tokio::test]
async fn accumulate_reports_every_failing_validator() {
    let root = tempfile::tempdir().unwrap();
    let log = CallLog::new();
    let callbacks = RecordingCallbacks::new(log.clone());
    let orchestrator = Orchestrator::with_config(
        Arc::new(MockProvisioner::hello_world()),
        config(root.path()),
    );

    let plan = TestPlan::<()>::new(ProvisionOptions::new("m"))
        .validator(callbacks.failing_validator::<()>("tags", "missing Name tag"))
        .validator(callbacks.validator::<()>("encryption"))
        .validator(callbacks.failing_validator::<()>("logging", "access logs disabled"));

    let err = orchestrator
        .execute(&TestHandle::new("accumulate"), plan)
        .await
        .unwrap_err();

    assert_eq!(log.entries(), vec!["tags", "encryption", "logging"]);
    let failure = err.test_failure().unwrap();
    let messages: Vec<_> = failure
        .summary
        .failures
        .iter()
        .map(|f| f.error.as_str())
        .collect();
    assert_eq!(
        messages,
        vec![
            "validator 1: missing Name tag",
            "validator 3: access logs disabled"
        ]
    );
}

#[tokio::test]
async fn fail_fast_stops_at_first_failing_validator() {
    let root = tempfile::tempdir().unwrap();
    let log = CallLog::new();
    let callbacks = RecordingCallbacks::new(log.clone());
    let orchestrator = Orchestrator::with_config(
        Arc::new(MockProvisioner::hello_world()),
        config(root.path()).with_validator_mode(FailureMode::FailFast),
    );

    let plan = TestPlan::<()>::new(ProvisionOptions::new("m"))
        .validator(callbacks.failing_validator::<()>("tags", "missing Name tag"))
        .validator(callbacks.validator::<()>("encryption"));

    let err = orchestrator
        .execute(&TestHandle::new("fail_fast"), plan)
        .await
        .unwrap_err();

    assert_eq!(log.entries(), vec!["tags"]);
    assert_eq!(err.test_failure().unwrap().summary.len(), 1);
}

#[tokio::test]
async fn cleanup_failure_does_not_mask_stage_failure() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(
        MockProvisioner::new()
            .failing_on(ProvisionMethod::InitAndApply, "provider error")
            .failing_on(ProvisionMethod::Destroy, "state locked"),
    );
    let orchestrator = Orchestrator::with_config(mock, config(root.path()));

    let err = orchestrator
        .execute(&TestHandle::new("double_failure"), hello_plan())
        .await
        .unwrap_err();

    let summary = &err.test_failure().unwrap().summary;
    assert_eq!(summary.len(), 2);
    assert_eq!(summary.of_kind(FailureKind::Stage)[0].stage, "init_apply");
    assert_eq!(summary.of_kind(FailureKind::Cleanup)[0].stage, "destroy");
    assert!(err.to_string().contains("provider error"));
    assert!(err.to_string().contains("state locked"));
}

#[derive(Debug, Default)]
struct BucketData {
    bucket: String,
}

#[tokio::test]
async fn test_data_and_working_dir_reach_every_callback() {
    let root = tempfile::tempdir().unwrap();
    let working_dir = root.path().join("bucket");
    let mock = Arc::new(MockProvisioner::new().with_output("bucket_id", "logs-123".into()));
    let orchestrator = Orchestrator::with_config(mock, config(root.path()));
    let expected_dir = working_dir.clone();

    let plan = TestPlan::with_test_data(
        ProvisionOptions::new("fixtures/bucket"),
        BucketData {
            bucket: "logs-123".into(),
        },
    )
    .working_directory(&working_dir)
    .setup(move |_, data: &BucketData, dir| {
        anyhow::ensure!(dir == expected_dir, "unexpected dir {}", dir.display());
        anyhow::ensure!(data.bucket == "logs-123");
        Ok(())
    })
    .validator(|t, outputs, data, _| {
        t.output_eq(outputs, "bucket_id", data.bucket.as_str());
        Ok(())
    })
    .teardown(|t, outputs, data, dir| {
        t.check(dir.join(".test-data").is_dir(), "options were not persisted");
        t.output_eq(outputs, "bucket_id", data.bucket.as_str());
        Ok(())
    });

    let report = orchestrator
        .execute(&TestHandle::new("bucket"), plan)
        .await
        .unwrap();

    assert_eq!(report.working_dir, working_dir);
    assert!(FileStore::new().is_present(&working_dir, "ProvisionOptions"));
}

#[tokio::test]
async fn soft_failure_in_setup_fails_the_test() {
    let root = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::with_config(
        Arc::new(MockProvisioner::hello_world()),
        config(root.path()),
    );
    let plan = hello_plan().setup(|t, _, _| {
        t.error("fixture account not configured");
        Ok(())
    });

    let handle = TestHandle::new("soft_setup");
    let err = orchestrator.execute(&handle, plan).await.unwrap_err();

    assert!(handle.failed());
    let failure = err.test_failure().unwrap();
    assert_eq!(failure.summary.for_stage("setup").len(), 1);
    assert_stage_status(&failure.report, "setup", StageStatus::Ok);
}

#[tokio::test]
async fn concurrent_tests_use_distinct_working_dirs() {
    let root = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::with_config(
        Arc::new(MockProvisioner::hello_world()),
        config(root.path()),
    );

    let first = TestHandle::new("suite::vpc");
    let second = TestHandle::new("suite/vpc");
    let (a, b) = tokio::join!(
        orchestrator.execute(&first, hello_plan()),
        orchestrator.execute(&second, hello_plan()),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.working_dir, b.working_dir);
    assert!(a.working_dir.starts_with(root.path()));
}
