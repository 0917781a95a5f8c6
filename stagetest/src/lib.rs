//! # Stagetest
//!
//! A staged test harness for infrastructure-as-code modules.
//!
//! A test applies a module, validates what it produced, and destroys it
//! again. Each step is a named stage that can be skipped through a
//! `SKIP_<stage>` environment variable, which makes it possible to iterate:
//!
//! - **Persistence**: provisioning options and test data are stored per working
//!   directory, so a later run can destroy what an earlier run applied
//! - **Stage gating**: any stage can be skipped on one invocation
//! - **Guaranteed cleanup**: teardown and destroy run however the test ended
//! - **Observability**: every stage transition is logged and sent to an event sink
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagetest::prelude::*;
//!
//! #[tokio::test]
//! async fn hello_world() {
//!     stagetest::observability::init_tracing();
//!
//!     let plan = TestPlan::<()>::new(ProvisionOptions::new("fixtures/hello-world"))
//!         .validator(|t, outputs, _, _| {
//!             t.output_eq(outputs, "hello_world", "Hello, World!");
//!             Ok(())
//!         });
//!
//!     Orchestrator::new(Arc::new(TerraformCli::new()))
//!         .execute(&TestHandle::current(), plan)
//!         .await
//!         .unwrap();
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cleanup;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod failure;
pub mod gate;
pub mod observability;
pub mod orchestrator;
pub mod provision;
pub mod runner;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::config::HarnessConfig;
    pub use crate::core::{StageDecision, StageStatus, StandardStage};
    pub use crate::errors::{HarnessError, ProvisionError, StoreError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::failure::{FailureKind, FailureMode, FailureSummary};
    pub use crate::gate::{SkipConfig, StageGate};
    pub use crate::orchestrator::{Orchestrator, TestHandle, TestPlan, TestReport};
    pub use crate::provision::{ModuleOutputs, ProvisionOptions, Provisioner};
    #[cfg(feature = "terraform")]
    pub use crate::provision::TerraformCli;
    pub use crate::runner::StageRunner;
    pub use crate::store::{FileStore, JsonCodec};
}

pub use errors::HarnessError;
pub use orchestrator::{Orchestrator, TestHandle, TestPlan};
