//! The caller-supplied description of one orchestrated test.

use std::path::{Path, PathBuf};

use super::TestHandle;
use crate::provision::{ModuleOutputs, ProvisionOptions};

/// Runs before provisioning with the test data and working directory.
pub type SetupFn<D> = Box<dyn Fn(&TestHandle, &D, &Path) -> anyhow::Result<()> + Send + Sync>;

/// Runs during cleanup with the live module outputs.
pub type TeardownFn<D> =
    Box<dyn Fn(&TestHandle, &ModuleOutputs, &D, &Path) -> anyhow::Result<()> + Send + Sync>;

/// Checks the provisioned module.
pub type Validator<D> =
    Box<dyn Fn(&TestHandle, &ModuleOutputs, &D, &Path) -> anyhow::Result<()> + Send + Sync>;

/// Everything one orchestrated test needs.
///
/// `D` is arbitrary test data threaded through every callback.
pub struct TestPlan<D = ()> {
    /// Options for applying and destroying the module.
    pub provision_options: ProvisionOptions,
    /// Explicit working directory; derived from the test name when unset or empty.
    pub working_directory: Option<PathBuf>,
    /// Optional preparation callback.
    pub setup: Option<SetupFn<D>>,
    /// Optional cleanup callback that still sees module outputs.
    pub teardown: Option<TeardownFn<D>>,
    /// Validators, run in order.
    pub validators: Vec<Validator<D>>,
    /// Test data passed to every callback.
    pub test_data: D,
}

impl<D: Default> TestPlan<D> {
    /// Creates a plan with default test data.
    #[must_use]
    pub fn new(provision_options: ProvisionOptions) -> Self {
        Self::with_test_data(provision_options, D::default())
    }
}

impl<D> TestPlan<D> {
    /// Creates a plan carrying `test_data`.
    #[must_use]
    pub fn with_test_data(provision_options: ProvisionOptions, test_data: D) -> Self {
        Self {
            provision_options,
            working_directory: None,
            setup: None,
            teardown: None,
            validators: Vec::new(),
            test_data,
        }
    }

    /// Sets the working directory.
    #[must_use]
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    /// Sets the setup callback.
    #[must_use]
    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&TestHandle, &D, &Path) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Sets the teardown callback.
    #[must_use]
    pub fn teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(&TestHandle, &ModuleOutputs, &D, &Path) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// Appends a validator.
    #[must_use]
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&TestHandle, &ModuleOutputs, &D, &Path) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.validators.push(Box::new(validator));
        self
    }
}

impl<D: std::fmt::Debug> std::fmt::Debug for TestPlan<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestPlan")
            .field("provision_options", &self.provision_options)
            .field("working_directory", &self.working_directory)
            .field("setup", &self.setup.is_some())
            .field("teardown", &self.teardown.is_some())
            .field("validators", &self.validators.len())
            .field("test_data", &self.test_data)
            .finish()
    }
}
