//! Testing utilities for clusterstage suites.
//!
//! This module provides:
//! - In-memory fakes for every external collaborator
//! - A scripted cluster status API
//! - A fixture wiring the fakes into suites and scenarios
//! - Assertions over stage histories and matrix reports

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_stage_absent, assert_stage_failed, assert_stage_ran, assert_stage_skipped,
    assert_stage_status, assert_unit_failed_at, assert_unit_passed, unit,
};
pub use fixtures::SuiteFixture;
pub use mocks::{FakeImageBuilder, FakeInventory, FakeProvisioner, ScriptedStatusApi};
