//! The stage runner.

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use super::StageConfig;
use crate::core::{StageOutcome, StageRecord};
use crate::errors::{ClusterStageError, Result};
use crate::events::{self, EventSink, NoOpEventSink};

/// Runs named stages, honouring the skip configuration.
///
/// Work runs synchronously from the caller's point of view: the runner
/// awaits it to completion and never cancels it. Failures are logged,
/// reported to the event sink and handed back to the caller; panics are
/// reported and then resumed.
pub struct StageRunner {
    config: Arc<StageConfig>,
    sink: Arc<dyn EventSink>,
    history: Mutex<Vec<StageOutcome>>,
}

impl StageRunner {
    /// Creates a runner with the given skip configuration.
    #[must_use]
    pub fn new(config: StageConfig) -> Self {
        Self::with_shared_config(Arc::new(config))
    }

    /// Creates a runner sharing an existing configuration.
    #[must_use]
    pub fn with_shared_config(config: Arc<StageConfig>) -> Self {
        Self {
            config,
            sink: Arc::new(NoOpEventSink),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns a fresh runner with the same configuration and sink but an
    /// empty history.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            config: self.config.clone(),
            sink: self.sink.clone(),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Returns the skip configuration.
    #[must_use]
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Returns how the named stage is set up for this run.
    #[must_use]
    pub fn record(&self, name: &str) -> StageRecord {
        StageRecord::new(name, self.config.is_skipped(name))
    }

    /// Returns the outcomes of every stage handled so far, in order.
    #[must_use]
    pub fn history(&self) -> Vec<StageOutcome> {
        self.history.lock().clone()
    }

    /// Runs `work` once, unless the stage is skipped.
    ///
    /// A failing `work` is returned as [`ClusterStageError::StageFailed`]
    /// naming this stage.
    pub async fn run_stage<F, Fut>(&self, name: &str, work: F) -> Result<StageOutcome>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let record = self.record(name);
        if record.skip {
            info!(stage = %name, "Skipping stage");
            let outcome = StageOutcome::skipped(name);
            self.sink
                .emit(events::STAGE_SKIPPED, Some(serde_json::json!(outcome.to_dict())))
                .await;
            self.history.lock().push(outcome.clone());
            return Ok(outcome);
        }

        info!(stage = %name, "Running stage");
        self.sink
            .emit(events::STAGE_STARTED, Some(serde_json::json!({ "stage": name })))
            .await;

        let started_at = Utc::now();
        let clock = Instant::now();
        let result = AssertUnwindSafe(work()).catch_unwind().await;
        let duration_ms = clock.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(Ok(())) => {
                info!(stage = %name, duration_ms, "Stage completed");
                let outcome = StageOutcome::ok(name, started_at, duration_ms);
                self.sink
                    .emit(events::STAGE_COMPLETED, Some(serde_json::json!(outcome.to_dict())))
                    .await;
                self.history.lock().push(outcome.clone());
                Ok(outcome)
            }
            Ok(Err(e)) => {
                error!(stage = %name, duration_ms, error = %e, "Stage failed");
                let outcome = StageOutcome::failed(name, started_at, duration_ms, e.to_string());
                self.sink
                    .emit(events::STAGE_FAILED, Some(serde_json::json!(outcome.to_dict())))
                    .await;
                self.history.lock().push(outcome);
                Err(ClusterStageError::stage_failed(name, e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(stage = %name, duration_ms, panic = %message, "Stage panicked");
                let outcome = StageOutcome::failed(
                    name,
                    started_at,
                    duration_ms,
                    format!("panicked: {message}"),
                );
                self.sink
                    .emit(events::STAGE_FAILED, Some(serde_json::json!(outcome.to_dict())))
                    .await;
                self.history.lock().push(outcome);
                std::panic::resume_unwind(panic)
            }
        }
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("skipped", &self.config.skipped_stages())
            .field("history_len", &self.history.lock().len())
            .finish()
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
