//! In-memory provisioner and call recording.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::errors::ProvisionError;
use crate::orchestrator::TestHandle;
use crate::provision::{ModuleOutputs, ProvisionOptions, Provisioner};

/// Shared, ordered record of everything that was called.
///
/// Clone it into a provisioner and into callbacks to check relative order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    /// Returns every entry in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Returns the index of the first occurrence of `entry`.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }

    /// Returns how often `entry` was recorded.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == entry).count()
    }

    /// Clears the log.
    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// A provisioner operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionMethod {
    /// `init_and_apply`.
    InitAndApply,
    /// `destroy`.
    Destroy,
    /// `output_all`.
    OutputAll,
}

impl ProvisionMethod {
    /// Returns the name recorded in the call log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InitAndApply => "init_and_apply",
            Self::Destroy => "destroy",
            Self::OutputAll => "output_all",
        }
    }
}

impl fmt::Display for ProvisionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioner that touches no infrastructure.
///
/// Returns configured outputs, records every call with its options, and
/// fails on demand.
#[derive(Debug, Default)]
pub struct MockProvisioner {
    outputs: Mutex<ModuleOutputs>,
    failures: Mutex<HashMap<ProvisionMethod, String>>,
    calls: Mutex<Vec<(ProvisionMethod, ProvisionOptions)>>,
    log: CallLog,
}

impl MockProvisioner {
    /// Creates a provisioner with no outputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provisioner reporting `hello_world = "Hello, World!"`.
    #[must_use]
    pub fn hello_world() -> Self {
        Self::new().with_output("hello_world", serde_json::json!("Hello, World!"))
    }

    /// Adds an output.
    #[must_use]
    pub fn with_output(self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.outputs.lock().insert(name.into(), value);
        self
    }

    /// Records calls into a shared log as well.
    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Makes `method` fail with `message`.
    #[must_use]
    pub fn failing_on(self, method: ProvisionMethod, message: impl Into<String>) -> Self {
        self.fail_on(method, message);
        self
    }

    /// Makes `method` fail with `message` from now on.
    pub fn fail_on(&self, method: ProvisionMethod, message: impl Into<String>) {
        self.failures.lock().insert(method, message.into());
    }

    /// Makes `method` succeed again.
    pub fn clear_failure(&self, method: ProvisionMethod) {
        self.failures.lock().remove(&method);
    }

    /// Returns the call log.
    #[must_use]
    pub fn call_log(&self) -> &CallLog {
        &self.log
    }

    /// Returns the methods called, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ProvisionMethod> {
        self.calls.lock().iter().map(|(method, _)| *method).collect()
    }

    /// Returns how often `method` was called.
    #[must_use]
    pub fn call_count(&self, method: ProvisionMethod) -> usize {
        self.calls.lock().iter().filter(|(m, _)| *m == method).count()
    }

    /// Returns the options passed to each call of `method`.
    #[must_use]
    pub fn options_for(&self, method: ProvisionMethod) -> Vec<ProvisionOptions> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| *m == method)
            .map(|(_, options)| options.clone())
            .collect()
    }

    fn record(&self, method: ProvisionMethod, options: &ProvisionOptions) -> Result<(), ProvisionError> {
        self.calls.lock().push((method, options.clone()));
        self.log.record(method.as_str());
        match self.failures.lock().get(&method) {
            Some(message) => Err(ProvisionError::other(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Provisioner for MockProvisioner {
    async fn init_and_apply(&self, options: &ProvisionOptions) -> Result<(), ProvisionError> {
        self.record(ProvisionMethod::InitAndApply, options)
    }

    async fn destroy(&self, options: &ProvisionOptions) -> Result<(), ProvisionError> {
        self.record(ProvisionMethod::Destroy, options)
    }

    async fn output_all(&self, options: &ProvisionOptions) -> Result<ModuleOutputs, ProvisionError> {
        self.record(ProvisionMethod::OutputAll, options)?;
        Ok(self.outputs.lock().clone())
    }
}

/// Builds callbacks that record their invocation into a [`CallLog`].
#[derive(Debug, Clone, Default)]
pub struct RecordingCallbacks {
    log: CallLog,
}

impl RecordingCallbacks {
    /// Creates recorders writing into `log`.
    #[must_use]
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }

    /// Returns the log.
    #[must_use]
    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// A setup callback recording `"setup"`.
    pub fn setup<D: 'static>(&self) -> impl Fn(&TestHandle, &D, &Path) -> anyhow::Result<()> + Send + Sync + 'static {
        let log = self.log.clone();
        move |_, _, _| {
            log.record("setup");
            Ok(())
        }
    }

    /// A validator recording `name`.
    pub fn validator<D: 'static>(
        &self,
        name: &str,
    ) -> impl Fn(&TestHandle, &ModuleOutputs, &D, &Path) -> anyhow::Result<()> + Send + Sync + 'static
    {
        let log = self.log.clone();
        let name = name.to_string();
        move |_, _, _, _| {
            log.record(name.clone());
            Ok(())
        }
    }

    /// A validator recording `name`, then failing with `message`.
    pub fn failing_validator<D: 'static>(
        &self,
        name: &str,
        message: &str,
    ) -> impl Fn(&TestHandle, &ModuleOutputs, &D, &Path) -> anyhow::Result<()> + Send + Sync + 'static
    {
        let log = self.log.clone();
        let name = name.to_string();
        let message = message.to_string();
        move |_, _, _, _| {
            log.record(name.clone());
            Err(anyhow::anyhow!("{message}"))
        }
    }

    /// A teardown callback recording `"teardown"`.
    pub fn teardown<D: 'static>(
        &self,
    ) -> impl Fn(&TestHandle, &ModuleOutputs, &D, &Path) -> anyhow::Result<()> + Send + Sync + 'static
    {
        let log = self.log.clone();
        move |_, _, _, _| {
            log.record("teardown");
            Ok(())
        }
    }
}
