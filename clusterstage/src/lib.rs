//! # Clusterstage
//!
//! A staged integration-test engine for provisioned scheduler clusters.
//!
//! A suite builds machine images, deploys a cluster per scenario and image,
//! checks that the expected number of servers and clients joined, and tears
//! everything down again. Every step is a named stage that can be skipped
//! through the environment, with intermediate values persisted so that a
//! later invocation can pick up where an earlier one stopped.
//!
//! - **Stages**: skippable units of work with guaranteed teardown
//! - **State**: scoped key/value persistence across invocations
//! - **Polling**: bounded, fixed-interval convergence checks
//! - **Scenarios**: topology variants run concurrently as a matrix
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clusterstage::prelude::*;
//!
//! let settings = SuiteConfig::from_env();
//! let env = ScenarioEnv::new(
//!     settings.clone(),
//!     Arc::new(FileStateStore::new()),
//!     Collaborators::command_backed(&settings)?,
//!     StageConfig::from_env(),
//! );
//!
//! let report = Suite::new(env).run().await?;
//! println!("{}", report.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cluster;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod infra;
pub mod observability;
pub mod poll;
pub mod scenario;
pub mod stage;
pub mod state;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cluster::{ClusterStatusApi, ClusterValidator, StatusEndpoint};
    pub use crate::config::SuiteConfig;
    pub use crate::core::{ArtifactId, StageOutcome, StageStatus};
    pub use crate::errors::{ClusterStageError, Result};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::infra::{CloudInventory, ImageBuilder, ProvisionOptions, Provisioner};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::poll::{Poller, RetryConfig};
    pub use crate::scenario::{
        ClusterTopology, Collaborators, ImageSource, MatrixReport, ScenarioEnv, ScenarioKind,
        ScenarioMatrix, Suite, SuiteMode,
    };
    pub use crate::stage::{run_with_teardown, StageConfig, StageRunner, TeardownRegistry};
    pub use crate::state::{FileStateStore, InMemoryStateStore, Scope, StateStore, StateStoreExt};
    pub use std::sync::Arc;
}
