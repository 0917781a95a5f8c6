//! Registry of cleanup actions executed in LIFO order.
//!
//! Actions are registered before the work they clean up after, then run once
//! the forward sequence is over, whether it succeeded, failed or panicked.
//! The last action registered runs first.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

use crate::errors::HarnessError;
use crate::utils::panic_message;

type CleanupAction<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<(), HarnessError>> + Send + 'a>;

struct CleanupEntry<'a> {
    name: String,
    action: CleanupAction<'a>,
}

/// Registry for cleanup actions executed in LIFO order.
#[derive(Default)]
pub struct CleanupRegistry<'a> {
    entries: Mutex<Vec<CleanupEntry<'a>>>,
}

impl<'a> CleanupRegistry<'a> {
    /// Creates a new cleanup registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Registers a cleanup action under a name.
    pub fn register<F>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> BoxFuture<'a, Result<(), HarnessError>> + Send + 'a,
    {
        let name = name.into();
        debug!(cleanup = %name, "Registered cleanup");
        self.entries.lock().push(CleanupEntry {
            name,
            action: Box::new(action),
        });
    }

    /// Removes every action registered under `name`.
    ///
    /// Returns true if an action was removed.
    pub fn unregister_by_name(&self, name: &str) -> bool {
        let mut entries = self.entries.lock();
        let initial_len = entries.len();
        entries.retain(|entry| entry.name != name);
        entries.len() < initial_len
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns the pending action names in the order they will run.
    #[must_use]
    pub fn execution_order(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .rev()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Runs all actions in LIFO order and empties the registry.
    ///
    /// A failing or panicking action does not stop the ones after it. Every
    /// failure is returned as a [`HarnessError::CleanupFailure`].
    pub async fn run_all(&self) -> Vec<HarnessError> {
        let entries = std::mem::take(&mut *self.entries.lock());
        let mut failures = Vec::new();

        for entry in entries.into_iter().rev() {
            let name = entry.name;
            debug!(cleanup = %name, "Running cleanup");

            let result = match AssertUnwindSafe((entry.action)()).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(HarnessError::Panicked(panic_message(payload.as_ref()))),
            };

            if let Err(err) = result {
                let failure = err.into_cleanup_failure(name.as_str());
                warn!(cleanup = %name, error = %failure, "Cleanup failed");
                failures.push(failure);
            }
        }

        failures
    }
}

impl std::fmt::Debug for CleanupRegistry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("pending", &self.execution_order())
            .finish()
    }
}
