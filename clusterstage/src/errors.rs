//! Error types for the clusterstage engine.
//!
//! Every fallible operation in the crate returns [`ClusterStageError`]. The
//! variants split into two families: errors the convergence poller may retry
//! (the cluster or the cloud may simply not have settled yet) and errors
//! that are fatal to the stage that hit them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ClusterStageError>;

/// Which side of the cluster a membership count belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// Server (raft peer) members.
    Server,
    /// Client (worker node) members.
    Client,
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Server => write!(f, "servers"),
            Self::Client => write!(f, "clients"),
        }
    }
}

/// The main error type for clusterstage operations.
#[derive(Debug, Error)]
pub enum ClusterStageError {
    /// A persisted value was never saved in the scope it was loaded from.
    #[error("No value saved for key '{key}' in scope '{scope}'")]
    NotFound {
        /// The scope that was searched.
        scope: String,
        /// The missing key.
        key: String,
    },

    /// The storage medium failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A network call to the cloud or to the cluster failed.
    #[error("Transport error calling {url}: {message}")]
    Transport {
        /// The target of the call.
        url: String,
        /// What went wrong.
        message: String,
    },

    /// The cluster answered, but not with the expected JSON array.
    #[error("Malformed response from {url}: {message}")]
    MalformedResponse {
        /// The target of the call.
        url: String,
        /// What went wrong while decoding.
        message: String,
    },

    /// A cloud resource exists but is not usable yet (no instances, no address).
    #[error("Resource '{resource}' is not ready: {message}")]
    NotReady {
        /// The resource being waited on.
        resource: String,
        /// What is missing.
        message: String,
    },

    /// The cluster reports a different member count than expected.
    #[error("Expected the cluster to have {expected} {role}, but found {actual}")]
    CountMismatch {
        /// The role being counted.
        role: MemberRole,
        /// The expected count.
        expected: usize,
        /// The observed count.
        actual: usize,
    },

    /// The poller exhausted its attempts.
    #[error("'{description}' unsuccessful after {attempts} attempts: {last_error}")]
    ConvergenceTimeout {
        /// The description given to the poller.
        description: String,
        /// How many attempts were made.
        attempts: usize,
        /// The last observed error.
        last_error: Box<ClusterStageError>,
    },

    /// Infrastructure apply or destroy failed.
    #[error("Provisioning {operation} failed: {message}")]
    Provisioning {
        /// The operation (apply, destroy, build, ...).
        operation: String,
        /// What went wrong.
        message: String,
    },

    /// An external tool exited unsuccessfully.
    #[error("Command '{program}' exited with {status}: {stderr}")]
    Command {
        /// The program that was run.
        program: String,
        /// The exit status as reported by the OS.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// A named stage failed.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        /// The stage name.
        stage: String,
        /// The underlying failure.
        source: Box<ClusterStageError>,
    },

    /// One or more teardown actions failed.
    #[error("Teardown failed: {}", format_failures(.failures))]
    Teardown {
        /// `(action name, error message)` pairs.
        failures: Vec<(String, String)>,
    },

    /// A generated resource name violates provider naming rules.
    #[error("Invalid resource name '{name}': {reason}")]
    InvalidName {
        /// The offending name.
        name: String,
        /// Which rule it breaks.
        reason: String,
    },

    /// Configuration could not be resolved.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A unit of work panicked.
    #[error("Panicked: {0}")]
    Panicked(String),
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, msg)| format!("{name}: {msg}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ClusterStageError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(scope: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            scope: scope.into(),
            key: key.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a malformed-response error.
    #[must_use]
    pub fn malformed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a not-ready error.
    #[must_use]
    pub fn not_ready(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotReady {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Creates a count-mismatch error.
    #[must_use]
    pub fn count_mismatch(role: MemberRole, expected: usize, actual: usize) -> Self {
        Self::CountMismatch {
            role,
            expected,
            actual,
        }
    }

    /// Creates a provisioning error.
    #[must_use]
    pub fn provisioning(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Wraps an error as the failure of a named stage.
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, source: Self) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Returns true if the convergence poller may try again after this error.
    ///
    /// Transport failures, count mismatches and malformed responses can all
    /// be symptoms of a cluster that has not finished bootstrapping.
    /// Command failures come from the cloud CLI and are usually transient
    /// metadata propagation.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::MalformedResponse { .. }
            | Self::NotReady { .. }
            | Self::CountMismatch { .. }
            | Self::Command { .. } => true,
            Self::StageFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns the innermost error, looking through stage and timeout wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::StageFailed { source, .. } => source.root_cause(),
            Self::ConvergenceTimeout { last_error, .. } => last_error.root_cause(),
            other => other,
        }
    }

    /// Returns the name of the failed stage.
    ///
    /// For a teardown failure this is the first teardown action that failed;
    /// actions are registered under the name of the stage they run.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            Self::Teardown { failures } => failures.first().map(|(name, _)| name.as_str()),
            _ => None,
        }
    }

    /// Short machine-readable kind, used in events and reports.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Transport { .. } => "transport",
            Self::MalformedResponse { .. } => "malformed_response",
            Self::NotReady { .. } => "not_ready",
            Self::CountMismatch { .. } => "count_mismatch",
            Self::ConvergenceTimeout { .. } => "convergence_timeout",
            Self::Provisioning { .. } => "provisioning",
            Self::Command { .. } => "command",
            Self::StageFailed { .. } => "stage_failed",
            Self::Teardown { .. } => "teardown",
            Self::InvalidName { .. } => "invalid_name",
            Self::Config(_) => "config",
            Self::Panicked(_) => "panicked",
        }
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));
        if let Some(stage) = self.failed_stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        map
    }
}

impl From<serde_json::Error> for ClusterStageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
