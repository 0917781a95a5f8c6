//! Test orchestrator.
//!
//! Runs one test through a fixed stage sequence:
//!
//! 1. register `destroy` and, when the plan has a teardown, `teardown` as cleanups
//! 2. `setup`, only when the plan has one
//! 3. `init_apply`: persist the provisioning options, then apply
//! 4. `validate`: fetch outputs and run every validator
//! 5. run the cleanups in reverse order of registration
//!
//! Cleanups run however steps 2-4 ended. They reload the provisioning options
//! from the store rather than the plan, so a later process that only knows
//! the working directory can still destroy what an earlier one applied (see
//! [`Orchestrator::destroy_only`]).

mod handle;
mod plan;
mod report;
mod workdir;

pub use handle::TestHandle;
pub use plan::{SetupFn, TeardownFn, TestPlan, Validator};
pub use report::{StageRecord, TestReport};
pub use workdir::{derive_working_dir, resolve_working_dir};

use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::cleanup::CleanupRegistry;
use crate::config::HarnessConfig;
use crate::core::{StageStatus, StandardStage};
use crate::errors::{HarnessError, TestFailure};
use crate::events::EventSink;
use crate::failure::{FailureCollector, FailureKind, FailureRecord, FailureSummary};
use crate::gate::StageGate;
use crate::provision::Provisioner;
use crate::runner::StageRunner;
use crate::store::{Codec, FileStore, JsonCodec};
use crate::utils::{elapsed_ms, now_utc, panic_message};

/// State shared by the stages of one run.
struct RunContext<'a, D> {
    handle: &'a TestHandle,
    plan: &'a TestPlan<D>,
    working_dir: &'a Path,
    progress: Mutex<Vec<StageRecord>>,
}

/// Composes stage runs into a full apply/validate/destroy test.
pub struct Orchestrator<C: Codec = JsonCodec> {
    config: HarnessConfig,
    provisioner: Arc<dyn Provisioner>,
    store: FileStore<C>,
    runner: StageRunner,
}

impl Orchestrator {
    /// Creates an orchestrator configured from the process environment.
    #[must_use]
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self::with_config(provisioner, HarnessConfig::from_env())
    }

    /// Creates an orchestrator with an explicit configuration.
    #[must_use]
    pub fn with_config(provisioner: Arc<dyn Provisioner>, config: HarnessConfig) -> Self {
        let store = FileStore::new().with_data_dir(config.data_dir.clone());
        let runner = StageRunner::new(StageGate::new(config.skip.clone()));
        Self {
            config,
            provisioner,
            store,
            runner,
        }
    }
}

impl<C: Codec> Orchestrator<C> {
    /// Replaces the event sink stage transitions are reported to.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.runner = self.runner.with_event_sink(sink);
        self
    }

    /// Replaces the persistence store.
    #[must_use]
    pub fn with_store<C2: Codec>(self, store: FileStore<C2>) -> Orchestrator<C2> {
        Orchestrator {
            config: self.config,
            provisioner: self.provisioner,
            store,
            runner: self.runner,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Returns the persistence store.
    #[must_use]
    pub fn store(&self) -> &FileStore<C> {
        &self.store
    }

    /// Runs `plan` as the test identified by `handle`.
    ///
    /// Returns the report when every stage, cleanup and check passed.
    /// Otherwise returns [`HarnessError::TestFailed`] carrying every failure
    /// and the report, so a cleanup failure never hides a stage failure.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::TestFailed`] if anything failed.
    #[instrument(skip_all, fields(test = %handle.name()))]
    pub async fn execute<D: Send + Sync>(
        &self,
        handle: &TestHandle,
        plan: TestPlan<D>,
    ) -> Result<TestReport, HarnessError> {
        let started_at = now_utc();
        let start = Instant::now();
        let soft_failures_before = handle.failure_count();
        let working_dir = resolve_working_dir(
            plan.working_directory.as_deref(),
            &self.config.workdir_root,
            handle.name(),
        );
        info!(working_dir = %working_dir.display(), "Starting test");

        let ctx = RunContext {
            handle,
            plan: &plan,
            working_dir: &working_dir,
            progress: Mutex::new(Vec::new()),
        };
        let mut summary = FailureSummary::new();

        {
            let cleanups = CleanupRegistry::new();
            self.register_cleanups(&ctx, &cleanups);

            if let Err(err) = self.run_forward(&ctx).await {
                for record in forward_failure_records(&err) {
                    summary.push(record);
                }
            }
            mark_not_run(&ctx);

            for err in cleanups.run_all().await {
                summary.push(FailureRecord::from_error("cleanup", FailureKind::Cleanup, &err));
            }
        }

        // Soft failures from validators are already part of the validate result.
        for record in handle.failures_since(soft_failures_before) {
            if record.stage != StandardStage::Validate.as_str() {
                summary.push(record);
            }
        }
        summary.failures.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let report = TestReport {
            test_name: handle.name().to_string(),
            working_dir: working_dir.clone(),
            stages: ctx.progress.into_inner(),
            started_at,
            duration_ms: elapsed_ms(start),
        };

        if summary.has_failures() {
            error!(failures = summary.len(), "Test failed\n{}", report);
            Err(HarnessError::TestFailed(Box::new(TestFailure { summary, report })))
        } else {
            info!(duration_ms = report.duration_ms, "Test passed");
            Ok(report)
        }
    }

    /// Runs only the destroy stage, using options persisted in `working_dir`.
    ///
    /// This is the recovery path for a run that was interrupted before its
    /// own cleanup could finish.
    ///
    /// # Errors
    ///
    /// Returns a stage failure if no options were persisted or destroy failed.
    pub async fn destroy_only(&self, working_dir: &Path) -> Result<StageStatus, HarnessError> {
        self.runner
            .run(StandardStage::Destroy.as_str(), || {
                self.destroy_from_store(working_dir)
            })
            .await
    }

    fn register_cleanups<'a, D: Send + Sync>(
        &'a self,
        ctx: &'a RunContext<'a, D>,
        cleanups: &CleanupRegistry<'a>,
    ) {
        cleanups.register(StandardStage::Destroy.as_str(), move || {
            self.run_stage(ctx, StandardStage::Destroy, move || {
                self.destroy_from_store(ctx.working_dir)
            })
            .boxed()
        });

        if let Some(teardown) = &ctx.plan.teardown {
            cleanups.register(StandardStage::Teardown.as_str(), move || {
                self.run_stage(ctx, StandardStage::Teardown, move || {
                    self.teardown_from_store(ctx, teardown)
                })
                .boxed()
            });
        }
    }

    async fn run_forward<D: Send + Sync>(&self, ctx: &RunContext<'_, D>) -> Result<(), HarnessError> {
        if let Some(setup) = &ctx.plan.setup {
            self.run_stage(ctx, StandardStage::Setup, || async {
                setup(ctx.handle, &ctx.plan.test_data, ctx.working_dir).map_err(HarnessError::from)
            })
            .await?;
        }
        self.run_stage(ctx, StandardStage::InitApply, || self.init_apply(ctx))
            .await?;
        self.run_stage(ctx, StandardStage::Validate, || self.validate(ctx))
            .await
    }

    async fn run_stage<D, F, Fut>(
        &self,
        ctx: &RunContext<'_, D>,
        stage: StandardStage,
        body: F,
    ) -> Result<(), HarnessError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), HarnessError>>,
    {
        ctx.handle.enter_stage(stage.as_str());
        let start = Instant::now();
        let result = self.runner.run(stage.as_str(), body).await;
        let duration_ms = elapsed_ms(start);

        let record = match &result {
            Ok(status) => StageRecord::new(stage.as_str(), *status, duration_ms),
            Err(err) => StageRecord::new(stage.as_str(), StageStatus::Fail, duration_ms)
                .with_error(err.to_string()),
        };
        ctx.progress.lock().push(record);
        result.map(|_| ())
    }

    async fn init_apply<D>(&self, ctx: &RunContext<'_, D>) -> Result<(), HarnessError> {
        let options = &ctx.plan.provision_options;
        self.store.save_provision_options(ctx.working_dir, options)?;
        info!(module = %options.terraform_dir.display(), "Applying module");
        self.provisioner.init_and_apply(options).await?;
        Ok(())
    }

    async fn validate<D>(&self, ctx: &RunContext<'_, D>) -> Result<(), HarnessError> {
        let stage = StandardStage::Validate.as_str();
        let outputs = self.provisioner.output_all(&ctx.plan.provision_options).await?;
        debug!(outputs = outputs.len(), validators = ctx.plan.validators.len(), "Running validators");

        let mut collector = FailureCollector::new(self.config.validator_mode);
        for (index, validator) in ctx.plan.validators.iter().enumerate() {
            let number = index + 1;
            let soft_before = ctx.handle.failure_count();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                validator(ctx.handle, &outputs, &ctx.plan.test_data, ctx.working_dir)
            }));

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => collector.record_failure(
                    FailureRecord::assertion(stage, format!("validator {number}: {err:#}"))
                        .with_error_type("CallbackError"),
                ),
                Err(payload) => collector.record_failure(
                    FailureRecord::assertion(
                        stage,
                        format!("validator {number} panicked: {}", panic_message(payload.as_ref())),
                    )
                    .with_error_type("Panic"),
                ),
            }
            for record in ctx.handle.failures_since(soft_before) {
                collector.record_failure(record);
            }

            if collector.should_stop() {
                warn!(validator = number, "Stopping validation after first failure");
                break;
            }
        }

        collector.into_result()
    }

    async fn teardown_from_store<D>(
        &self,
        ctx: &RunContext<'_, D>,
        teardown: &TeardownFn<D>,
    ) -> Result<(), HarnessError> {
        let options = self.store.load_provision_options(ctx.working_dir)?;
        let outputs = self.provisioner.output_all(&options).await?;
        teardown(ctx.handle, &outputs, &ctx.plan.test_data, ctx.working_dir)?;
        Ok(())
    }

    async fn destroy_from_store(&self, working_dir: &Path) -> Result<(), HarnessError> {
        let options = self.store.load_provision_options(working_dir)?;
        info!(
            working_dir = %working_dir.display(),
            module = %options.terraform_dir.display(),
            "Destroying module"
        );
        self.provisioner.destroy(&options).await?;
        Ok(())
    }
}

impl<C: Codec> std::fmt::Debug for Orchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

/// Expands a forward-stage error into failure records.
///
/// A validate failure contributes one record per failing validator.
fn forward_failure_records(err: &HarnessError) -> Vec<FailureRecord> {
    if let HarnessError::StageFailure { source, .. } = err {
        if let HarnessError::ValidationFailed { failures } = source.as_ref() {
            return failures.clone();
        }
    }
    vec![FailureRecord::from_error("-", FailureKind::Stage, err)]
}

/// Records forward stages that were never reached.
fn mark_not_run<D>(ctx: &RunContext<'_, D>) {
    let mut expected = Vec::with_capacity(3);
    if ctx.plan.setup.is_some() {
        expected.push(StandardStage::Setup);
    }
    expected.extend([StandardStage::InitApply, StandardStage::Validate]);

    let mut progress = ctx.progress.lock();
    for stage in expected {
        if !progress.iter().any(|record| record.stage == stage.as_str()) {
            progress.push(StageRecord::not_run(stage.as_str()));
        }
    }
}
