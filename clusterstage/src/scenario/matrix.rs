//! Running scenario instances side by side.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use super::context::{ImageSource, ScenarioContext, ScenarioEnv};
use super::stages::run_scenario;
use super::topology::ScenarioKind;
use crate::core::StageOutcome;
use crate::errors::ClusterStageError;
use crate::events;
use crate::stage::panic_message;

/// What happened to one scenario instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitReport {
    /// `<kind>-<image>`.
    pub label: String,
    /// Scenario shape.
    pub kind: ScenarioKind,
    /// Image label.
    pub image: String,
    /// Outcomes of the stages the unit reached, in order.
    pub stages: Vec<StageOutcome>,
    /// The stage that failed, if one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    /// Kind of the root failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Full failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time of the whole unit.
    pub duration_ms: f64,
}

impl UnitReport {
    fn new(kind: ScenarioKind, image: &ImageSource) -> Self {
        Self {
            label: format!("{kind}-{}", image.label()),
            kind,
            image: image.label().to_string(),
            stages: Vec::new(),
            failed_stage: None,
            error_kind: None,
            error: None,
            duration_ms: 0.0,
        }
    }

    fn fail(mut self, err: &ClusterStageError) -> Self {
        self.failed_stage = err.failed_stage().map(String::from);
        self.error_kind = Some(err.root_cause().kind().to_string());
        self.error = Some(err.to_string());
        self
    }

    /// Returns true if the unit passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of every unit of a matrix run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixReport {
    /// Identifies this run in logs and events.
    pub run_id: Uuid,
    /// One report per unit, sorted by label.
    pub units: Vec<UnitReport>,
}

impl MatrixReport {
    /// Returns true if every unit passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.units.iter().all(UnitReport::is_success)
    }

    /// Returns the units that failed.
    #[must_use]
    pub fn failures(&self) -> Vec<&UnitReport> {
        self.units.iter().filter(|u| !u.is_success()).collect()
    }

    /// Looks up a unit by label.
    #[must_use]
    pub fn unit(&self, label: &str) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.label == label)
    }

    /// One line per unit.
    #[must_use]
    pub fn summary(&self) -> String {
        self.units
            .iter()
            .map(|u| match (&u.failed_stage, &u.error) {
                (_, None) => format!("PASS {}", u.label),
                (Some(stage), Some(e)) => format!("FAIL {} at {stage}: {e}", u.label),
                (None, Some(e)) => format!("FAIL {}: {e}", u.label),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A set of `(kind, image)` units run concurrently.
///
/// Every unit runs in its own task with its own scope and runner history.
/// A unit that fails or panics is reported; it never cancels its siblings.
#[derive(Debug)]
pub struct ScenarioMatrix {
    env: ScenarioEnv,
    units: Vec<(ScenarioKind, ImageSource)>,
}

impl ScenarioMatrix {
    /// Creates an empty matrix.
    #[must_use]
    pub fn new(env: ScenarioEnv) -> Self {
        Self {
            env,
            units: Vec::new(),
        }
    }

    /// Creates the cartesian product of `kinds` and `images`.
    #[must_use]
    pub fn cartesian(env: ScenarioEnv, kinds: &[ScenarioKind], images: &[ImageSource]) -> Self {
        let units = kinds
            .iter()
            .flat_map(|kind| images.iter().map(move |image| (*kind, image.clone())))
            .collect();
        Self { env, units }
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if there are no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Runs every unit to completion and collects the results.
    pub async fn run(self) -> MatrixReport {
        let run_id = Uuid::new_v4();
        info!(%run_id, units = self.units.len(), "Running scenario matrix");

        let mut reports = Vec::with_capacity(self.units.len());
        let mut handles: Vec<(UnitReport, JoinHandle<UnitReport>)> = Vec::new();

        for (kind, image) in self.units {
            let report = UnitReport::new(kind, &image);
            match self.env.scenario(kind, image) {
                Ok(ctx) => {
                    let span = tracing::info_span!("scenario", scenario = %report.label, %run_id);
                    let handle = tokio::spawn(run_unit(ctx, report.clone()).instrument(span));
                    handles.push((report, handle));
                }
                Err(e) => {
                    error!(scenario = %report.label, error = %e, "Could not set up scenario");
                    reports.push(report.fail(&e));
                }
            }
        }

        for (report, handle) in handles {
            match handle.await {
                Ok(done) => reports.push(done),
                Err(join_error) => {
                    error!(scenario = %report.label, error = %join_error, "Scenario task ended without a report");
                    let err = ClusterStageError::Panicked(join_error.to_string());
                    reports.push(report.fail(&err));
                }
            }
        }

        reports.sort_by(|a, b| a.label.cmp(&b.label));
        for report in &reports {
            self.env.sink.try_emit(
                events::SCENARIO_COMPLETED,
                Some(serde_json::json!({
                    "run_id": run_id.to_string(),
                    "scenario": report.label,
                    "success": report.is_success(),
                    "failed_stage": report.failed_stage,
                    "error": report.error,
                })),
            );
        }

        let report = MatrixReport {
            run_id,
            units: reports,
        };
        let failed = report.failures().len();
        info!(%run_id, units = report.units.len(), failed, "Scenario matrix finished");
        report
    }
}

async fn run_unit(ctx: ScenarioContext, mut report: UnitReport) -> UnitReport {
    let clock = Instant::now();
    let result = AssertUnwindSafe(run_scenario(&ctx)).catch_unwind().await;
    report.stages = ctx.runner.history();
    report.duration_ms = clock.elapsed().as_secs_f64() * 1000.0;

    match result {
        Ok(Ok(())) => {
            info!(scenario = %report.label, duration_ms = report.duration_ms, "Scenario passed");
            report
        }
        Ok(Err(e)) => {
            error!(scenario = %report.label, error = %e, "Scenario failed");
            report.fail(&e)
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(scenario = %report.label, panic = %message, "Scenario panicked");
            let stage = report
                .stages
                .iter()
                .rev()
                .find(|o| o.status.is_failure())
                .map(|o| o.name.clone());
            let mut report = report.fail(&ClusterStageError::Panicked(message));
            report.failed_stage = stage;
            report
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(label: &str, error: Option<&str>) -> UnitReport {
        let mut report = UnitReport::new(ScenarioKind::Colocated, &ImageSource::SavedArtifact);
        report.label = label.to_string();
        report.error = error.map(String::from);
        report
    }

    #[test]
    fn test_report_success_and_summary() {
        let mut failing = unit("separate-ubuntu18-image", Some("boom"));
        failing.failed_stage = Some("validate".into());
        let report = MatrixReport {
            run_id: Uuid::new_v4(),
            units: vec![unit("colocated-ubuntu16-image", None), failing],
        };

        assert!(!report.is_success());
        assert_eq!(report.failures().len(), 1);
        assert_eq!(
            report.summary(),
            "PASS colocated-ubuntu16-image\nFAIL separate-ubuntu18-image at validate: boom"
        );
        assert!(report.unit("colocated-ubuntu16-image").unwrap().is_success());
    }

    #[test]
    fn test_empty_report_is_success() {
        let report = MatrixReport {
            run_id: Uuid::new_v4(),
            units: Vec::new(),
        };
        assert!(report.is_success());
    }
}
