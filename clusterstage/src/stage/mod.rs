//! Named, skippable stages and guaranteed teardown.
//!
//! This module provides:
//! - [`StageConfig`], the explicit skip plane for a run
//! - [`StageRunner`], which runs each named stage once unless it is skipped
//! - [`TeardownRegistry`] and [`run_with_teardown`], which make sure
//!   registered teardown runs exactly once on every exit path

mod config;
mod runner;
mod teardown;

pub use config::{StageConfig, SKIP_ENV_PREFIX};
pub(crate) use runner::panic_message;
pub use runner::StageRunner;
pub use teardown::{run_with_teardown, TeardownRegistry};
