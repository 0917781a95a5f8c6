//! Runs one named stage under the stage gate.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::core::{StageEvent, StageStatus};
use crate::errors::HarnessError;
use crate::events::{EventSink, LoggingEventSink};
use crate::gate::{skip_env_var, StageGate};
use crate::utils::{elapsed_ms, panic_message};

/// Executes stage bodies, honoring skip signals and reporting every transition.
#[derive(Clone)]
pub struct StageRunner {
    gate: StageGate,
    sink: Arc<dyn EventSink>,
}

impl StageRunner {
    /// Creates a runner that logs events through `tracing`.
    #[must_use]
    pub fn new(gate: StageGate) -> Self {
        Self {
            gate,
            sink: Arc::new(LoggingEventSink::default()),
        }
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the gate.
    #[must_use]
    pub fn gate(&self) -> &StageGate {
        &self.gate
    }

    /// Runs `thunk` as stage `stage` unless the gate says to skip it.
    ///
    /// Returns [`StageStatus::Skip`] without calling `thunk` when skipped and
    /// [`StageStatus::Ok`] when the thunk succeeds. An error or panic from
    /// the thunk comes back as a [`HarnessError::StageFailure`].
    pub async fn run<F, Fut>(&self, stage: &str, thunk: F) -> Result<StageStatus, HarnessError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), HarnessError>>,
    {
        if self.gate.should_run(stage).is_skip() {
            let reason = format!("{} is set", skip_env_var(stage));
            info!(
                stage = %stage,
                "The '{}' environment variable is set, so skipping stage '{}'.",
                skip_env_var(stage),
                stage
            );
            self.sink.emit(&StageEvent::skipped(stage, &reason)).await;
            return Ok(StageStatus::Skip);
        }

        info!(stage = %stage, "Running stage '{}'", stage);
        self.sink.emit(&StageEvent::started(stage)).await;
        let start = Instant::now();

        let result = match AssertUnwindSafe(thunk()).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(HarnessError::Panicked(panic_message(payload.as_ref()))),
        };
        let duration_ms = elapsed_ms(start);

        match result {
            Ok(()) => {
                info!(stage = %stage, duration_ms, "Completed stage '{}'", stage);
                self.sink.emit(&StageEvent::completed(stage, duration_ms)).await;
                Ok(StageStatus::Ok)
            }
            Err(err) => {
                let failure = HarnessError::stage_failure(stage, err);
                error!(stage = %stage, duration_ms, error = %failure, "Stage '{}' failed", stage);
                self.sink
                    .emit(&StageEvent::failed(stage, &failure.to_string(), duration_ms))
                    .await;
                Err(failure)
            }
        }
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner").field("gate", &self.gate).finish()
    }
}
