//! Test assertions for stage histories and matrix reports.

use crate::core::{StageOutcome, StageStatus};
use crate::scenario::{MatrixReport, UnitReport};

fn find<'a>(history: &'a [StageOutcome], stage: &str) -> &'a StageOutcome {
    history.iter().find(|o| o.name == stage).unwrap_or_else(|| {
        panic!(
            "Expected stage '{}' in history, got {:?}",
            stage,
            history.iter().map(|o| o.name.as_str()).collect::<Vec<_>>()
        )
    })
}

/// Asserts that the stage has the expected status.
pub fn assert_stage_status(history: &[StageOutcome], stage: &str, expected: StageStatus) {
    let outcome = find(history, stage);
    assert_eq!(
        outcome.status, expected,
        "Expected stage '{}' to be {:?}, got {:?} (error: {:?})",
        stage, expected, outcome.status, outcome.error
    );
}

/// Asserts that the stage ran to completion.
pub fn assert_stage_ran(history: &[StageOutcome], stage: &str) {
    assert_stage_status(history, stage, StageStatus::Ok);
}

/// Asserts that the stage was skipped.
pub fn assert_stage_skipped(history: &[StageOutcome], stage: &str) {
    assert_stage_status(history, stage, StageStatus::Skip);
}

/// Asserts that the stage failed.
pub fn assert_stage_failed(history: &[StageOutcome], stage: &str) {
    assert_stage_status(history, stage, StageStatus::Fail);
}

/// Asserts that the stage never reached the runner.
pub fn assert_stage_absent(history: &[StageOutcome], stage: &str) {
    assert!(
        history.iter().all(|o| o.name != stage),
        "Expected stage '{}' not to run, but it is in the history",
        stage
    );
}

/// Returns the unit with this label, failing the test if it is missing.
pub fn unit<'a>(report: &'a MatrixReport, label: &str) -> &'a UnitReport {
    report.unit(label).unwrap_or_else(|| {
        panic!(
            "Expected unit '{}' in report, got {:?}",
            label,
            report.units.iter().map(|u| u.label.as_str()).collect::<Vec<_>>()
        )
    })
}

/// Asserts that the unit passed.
pub fn assert_unit_passed(report: &MatrixReport, label: &str) {
    let unit = unit(report, label);
    assert!(
        unit.is_success(),
        "Expected unit '{}' to pass, but it failed at {:?}: {:?}",
        label,
        unit.failed_stage,
        unit.error
    );
}

/// Asserts that the unit failed at the given stage.
pub fn assert_unit_failed_at(report: &MatrixReport, label: &str, stage: &str) {
    let unit = unit(report, label);
    assert!(!unit.is_success(), "Expected unit '{}' to fail, but it passed", label);
    assert_eq!(
        unit.failed_stage.as_deref(),
        Some(stage),
        "Expected unit '{}' to fail at '{}', error: {:?}",
        label,
        stage,
        unit.error
    );
}
