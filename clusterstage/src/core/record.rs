//! Per-run stage records and outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::StageStatus;

/// One named stage as seen by a single process run.
///
/// The skip flag comes from outside (environment toggle, CLI flag) and is
/// read fresh each run; the record itself is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// The stage name, unique within its scope.
    pub name: String,
    /// Whether the stage is skipped in this run.
    pub skip: bool,
}

impl StageRecord {
    /// Creates a new stage record.
    #[must_use]
    pub fn new(name: impl Into<String>, skip: bool) -> Self {
        Self {
            name: name.into(),
            skip,
        }
    }
}

/// What happened when the runner was asked to run a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    /// The stage name.
    pub name: String,
    /// Terminal status.
    pub status: StageStatus,
    /// When the runner picked the stage up.
    pub started_at: DateTime<Utc>,
    /// Wall time spent in the stage's work, zero when skipped.
    pub duration_ms: f64,
    /// Error message when the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageOutcome {
    /// Creates an outcome for a stage that ran to completion.
    #[must_use]
    pub fn ok(name: impl Into<String>, started_at: DateTime<Utc>, duration_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Ok,
            started_at,
            duration_ms,
            error: None,
        }
    }

    /// Creates an outcome for a skipped stage.
    #[must_use]
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Skip,
            started_at: Utc::now(),
            duration_ms: 0.0,
            error: None,
        }
    }

    /// Creates an outcome for a failed stage.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Fail,
            started_at,
            duration_ms,
            error: Some(error.into()),
        }
    }

    /// Returns true if the stage ran or was skipped without failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("stage".to_string(), serde_json::json!(self.name));
        map.insert("status".to_string(), serde_json::json!(self.status));
        map.insert(
            "started_at".to_string(),
            serde_json::json!(self.started_at.to_rfc3339()),
        );
        map.insert("duration_ms".to_string(), serde_json::json!(self.duration_ms));
        if let Some(ref error) = self.error {
            map.insert("error".to_string(), serde_json::json!(error));
        }
        map
    }
}
