//! Provisioning tool boundary.
//!
//! The orchestrator never talks to infrastructure directly. It calls a
//! [`Provisioner`], which applies, destroys and reports module outputs.

mod options;
#[cfg(feature = "terraform")]
mod terraform;

pub use options::ProvisionOptions;
#[cfg(feature = "terraform")]
pub use terraform::{format_var_value, parse_outputs, TerraformCli};

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::errors::ProvisionError;

/// Output name to value, as reported after a successful apply.
pub type ModuleOutputs = BTreeMap<String, serde_json::Value>;

/// An external provisioning tool.
///
/// Every call is long-running and may block for minutes; the harness applies
/// no timeout of its own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Initializes the module and applies it.
    async fn init_and_apply(&self, options: &ProvisionOptions) -> Result<(), ProvisionError>;

    /// Destroys everything the module created.
    async fn destroy(&self, options: &ProvisionOptions) -> Result<(), ProvisionError>;

    /// Returns every output of the applied module.
    async fn output_all(&self, options: &ProvisionOptions) -> Result<ModuleOutputs, ProvisionError>;
}
