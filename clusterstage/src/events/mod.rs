//! Event sinks for stage and poll observability.
//!
//! The stage runner, the convergence poller and the scenario matrix report
//! their progress as named events with a JSON payload. A sink decides what
//! happens to them: log through `tracing`, collect for assertions, or drop.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A stage was picked up and its work is about to run.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage was skipped by an external signal.
pub const STAGE_SKIPPED: &str = "stage.skipped";
/// A stage's work returned successfully.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage's work returned an error or panicked.
pub const STAGE_FAILED: &str = "stage.failed";
/// A probe failed and will be retried.
pub const POLL_RETRY: &str = "poll.retry";
/// A probe succeeded.
pub const POLL_SUCCEEDED: &str = "poll.succeeded";
/// A probe exhausted its attempts or hit a non-retryable error.
pub const POLL_EXHAUSTED: &str = "poll.exhausted";
/// A teardown action failed.
pub const TEARDOWN_FAILED: &str = "teardown.failed";
/// One scenario of the matrix finished.
pub const SCENARIO_COMPLETED: &str = "scenario.completed";
