//! The testing handle passed to every callback.

use parking_lot::Mutex;
use std::fmt::Debug;
use tracing::{error, info};

use crate::failure::FailureRecord;
use crate::provision::ModuleOutputs;

/// Identifies the running test and collects soft assertion failures.
///
/// Checks on the handle record a failure and let the callback carry on, so
/// several problems can be reported from one validator. Returning an error
/// from the callback instead fails it immediately.
#[derive(Debug)]
pub struct TestHandle {
    name: String,
    stage: Mutex<Option<String>>,
    failures: Mutex<Vec<FailureRecord>>,
}

impl TestHandle {
    /// Creates a handle for the test called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: Mutex::new(None),
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Creates a handle named after the current thread.
    ///
    /// The libtest harness names each test thread after the test path, e.g.
    /// `tests::vpc_is_tagged`. With `--test-threads=1` tests run on `main`,
    /// so pass an explicit name via [`TestHandle::new`] when that matters.
    #[must_use]
    pub fn current() -> Self {
        let thread = std::thread::current();
        Self::new(thread.name().unwrap_or("main"))
    }

    /// Returns the test name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage currently running callbacks, if any.
    #[must_use]
    pub fn stage(&self) -> Option<String> {
        self.stage.lock().clone()
    }

    pub(crate) fn enter_stage(&self, stage: &str) {
        *self.stage.lock() = Some(stage.to_string());
    }

    /// Logs a message tagged with the test name.
    pub fn log(&self, message: impl AsRef<str>) {
        info!(test = %self.name, stage = ?self.stage(), "{}", message.as_ref());
    }

    /// Records a failure without stopping the callback.
    pub fn error(&self, message: impl Into<String>) {
        let message = message.into();
        let stage = self.stage().unwrap_or_else(|| "-".to_string());
        error!(test = %self.name, stage = %stage, "{}", message);
        self.failures.lock().push(FailureRecord::assertion(stage, message));
    }

    /// Records a failure if `condition` is false. Returns `condition`.
    pub fn check(&self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.error(message);
        }
        condition
    }

    /// Records a failure if `expected != actual`. Returns whether they match.
    pub fn check_eq<T>(&self, expected: &T, actual: &T, context: &str) -> bool
    where
        T: PartialEq + Debug + ?Sized,
    {
        let equal = expected == actual;
        if !equal {
            self.error(format!(
                "{context}: expected {expected:?}, got {actual:?}"
            ));
        }
        equal
    }

    /// Checks that output `name` exists and equals `expected`.
    pub fn output_eq(
        &self,
        outputs: &ModuleOutputs,
        name: &str,
        expected: impl Into<serde_json::Value>,
    ) -> bool {
        let expected = expected.into();
        match outputs.get(name) {
            Some(actual) => self.check_eq(&expected, actual, &format!("output '{name}'")),
            None => {
                self.error(format!("output '{name}' is missing"));
                false
            }
        }
    }

    /// Returns true if any failure has been recorded.
    #[must_use]
    pub fn failed(&self) -> bool {
        !self.failures.lock().is_empty()
    }

    /// Returns every recorded failure.
    #[must_use]
    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures.lock().clone()
    }

    pub(crate) fn failure_count(&self) -> usize {
        self.failures.lock().len()
    }

    pub(crate) fn failures_since(&self, index: usize) -> Vec<FailureRecord> {
        self.failures.lock().iter().skip(index).cloned().collect()
    }
}
