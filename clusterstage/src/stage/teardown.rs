//! Guaranteed teardown.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, warn};

use super::runner::panic_message;
use crate::errors::{ClusterStageError, Result};
use crate::events::{self, EventSink, NoOpEventSink};

type TeardownAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

struct TeardownEntry {
    name: String,
    action: TeardownAction,
}

/// Registry of teardown actions executed in LIFO order.
///
/// Register an action as soon as the resource it releases may exist, then
/// run the work through [`run_with_teardown`]. Each registered action runs
/// at most once: the registry is drained when it runs.
pub struct TeardownRegistry {
    entries: Mutex<Vec<TeardownEntry>>,
    sink: Arc<dyn EventSink>,
}

impl Default for TeardownRegistry {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sink: Arc::new(NoOpEventSink),
        }
    }
}

impl TeardownRegistry {
    /// Creates a new teardown registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event sink that receives teardown failures.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Registers a teardown action.
    pub fn register<F, Fut>(&self, name: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.entries.lock().push(TeardownEntry {
            name: name.into(),
            action: Box::new(move || action().boxed()),
        });
    }

    /// Returns the number of pending actions.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Runs all actions in LIFO order.
    ///
    /// A failing or panicking action does not stop the others. Returns
    /// `(action name, error message)` for each failure.
    pub async fn run_all(&self) -> Vec<(String, String)> {
        let entries: Vec<TeardownEntry> = std::mem::take(&mut *self.entries.lock());
        let mut failures = Vec::new();

        for entry in entries.into_iter().rev() {
            info!(action = %entry.name, "Running teardown");
            let result = AssertUnwindSafe((entry.action)()).catch_unwind().await;

            let message = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            warn!(action = %entry.name, error = %message, "Teardown failed");
            self.sink.try_emit(
                events::TEARDOWN_FAILED,
                Some(serde_json::json!({ "action": entry.name, "error": message })),
            );
            failures.push((entry.name, message));
        }

        failures
    }
}

impl std::fmt::Debug for TeardownRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeardownRegistry")
            .field("pending_count", &self.pending_count())
            .finish()
    }
}

/// Runs `body`, then every registered teardown action, whatever happened.
///
/// - `body` succeeded: teardown failures are returned as
///   [`ClusterStageError::Teardown`].
/// - `body` failed: its error is returned; teardown failures are only logged.
/// - `body` panicked: teardown runs, then the panic resumes.
pub async fn run_with_teardown<T, Fut>(registry: &TeardownRegistry, body: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    let outcome = AssertUnwindSafe(body).catch_unwind().await;
    let failures = registry.run_all().await;

    match outcome {
        Ok(Ok(value)) if failures.is_empty() => Ok(value),
        Ok(Ok(_)) => Err(ClusterStageError::Teardown { failures }),
        Ok(Err(e)) => {
            if !failures.is_empty() {
                warn!(
                    error = %e,
                    teardown_failures = failures.len(),
                    "Teardown also failed after an earlier error"
                );
            }
            Err(e)
        }
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
