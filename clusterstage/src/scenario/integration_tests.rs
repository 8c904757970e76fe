//! End-to-end suite runs against the in-memory collaborators.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::*;
use crate::core::ArtifactId;
use crate::errors::Result;
use crate::events;
use crate::infra::{ProvisionOptions, ProvisionOutputs, Provisioner};
use crate::stage::StageConfig;
use crate::state::keys::{variant_artifact_key, SAVED_ARTIFACT_ID, SAVED_IMAGE_VARIANTS};
use crate::state::{StateStore, StateStoreExt};
use crate::testing::{
    assert_stage_failed, assert_stage_ran, assert_stage_skipped, assert_unit_failed_at,
    assert_unit_passed, unit, FakeImageBuilder, FakeProvisioner, ScriptedStatusApi, SuiteFixture,
};

const LABELS: [&str; 4] = [
    "colocated-ubuntu16-image",
    "colocated-ubuntu18-image",
    "separate-ubuntu16-image",
    "separate-ubuntu18-image",
];

/// Delegates to a [`FakeProvisioner`], but crashes when applying one unit.
struct CrashingProvisioner {
    inner: Arc<FakeProvisioner>,
    crash_in: &'static str,
}

#[async_trait]
impl Provisioner for CrashingProvisioner {
    async fn prepare_dir(&self, module: &Path, dest: &Path) -> Result<PathBuf> {
        self.inner.prepare_dir(module, dest).await
    }

    async fn apply(&self, options: &ProvisionOptions) -> Result<ProvisionOutputs> {
        if options.dir.to_string_lossy().contains(self.crash_in) {
            panic!("provider plugin crashed");
        }
        self.inner.apply(options).await
    }

    async fn output(&self, options: &ProvisionOptions, name: &str) -> Result<String> {
        self.inner.output(options, name).await
    }

    async fn destroy(&self, options: &ProvisionOptions) -> Result<()> {
        self.inner.destroy(options).await
    }
}

#[tokio::test]
async fn test_full_multi_variant_suite() {
    let fixture = SuiteFixture::new();
    let suite = fixture.suite(StageConfig::new());

    let report = suite.run().await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    let labels: Vec<&str> = report.units.iter().map(|u| u.label.as_str()).collect();
    assert_eq!(labels, LABELS);
    for label in LABELS {
        let unit = unit(&report, label);
        assert_stage_ran(&unit.stages, DEPLOY);
        assert_stage_ran(&unit.stages, VALIDATE);
        assert_stage_ran(&unit.stages, TEARDOWN);
    }

    let history = suite.runner().history();
    assert_stage_ran(&history, BUILD_IMAGES);
    assert_stage_ran(&history, DELETE_IMAGES);

    assert_eq!(fixture.images.builds().len(), 2);
    let deleted: BTreeSet<ArtifactId> = fixture.images.deleted().into_iter().collect();
    assert_eq!(
        deleted,
        BTreeSet::from([
            FakeImageBuilder::image_id("ubuntu16-image"),
            FakeImageBuilder::image_id("ubuntu18-image"),
        ])
    );
    assert_eq!(fixture.provisioner.applies().len(), 4);
    assert_eq!(fixture.provisioner.destroys().len(), 4);
    assert_eq!(fixture.provisioner.live_count(), 0);
    assert_eq!(fixture.sink.events_of_type(events::SCENARIO_COMPLETED).len(), 4);
}

#[tokio::test]
async fn test_build_saves_location_and_variants() {
    let fixture = SuiteFixture::new();
    let suite = fixture.suite(StageConfig::new());

    suite.build_images().await.unwrap();

    let scope = fixture.suite_scope();
    let location = Location::load(fixture.store.as_ref(), &scope).await.unwrap();
    assert_eq!(location.project, "test-project");
    assert_eq!(location.region, "us-east1");
    assert_eq!(location.zone, "us-east1-b");

    let variants: Vec<String> = fixture.store.load(&scope, SAVED_IMAGE_VARIANTS).await.unwrap();
    assert_eq!(variants, vec!["ubuntu16-image", "ubuntu18-image"]);
    let id: ArtifactId = fixture
        .store
        .load(&scope, &variant_artifact_key("ubuntu18-image"))
        .await
        .unwrap();
    assert_eq!(id, FakeImageBuilder::image_id("ubuntu18-image"));

    let build = &fixture.images.builds()[0];
    assert_eq!(build.vars.get("project_id").map(String::as_str), Some("test-project"));
    assert_eq!(build.vars.get("zone").map(String::as_str), Some("us-east1-b"));
    assert!(build.only.is_some());
}

#[tokio::test]
async fn test_partial_build_failure_still_deletes_built_images() {
    let fixture = SuiteFixture::new();
    fixture.images.fail_variant("ubuntu18-image");
    let suite = fixture.suite(StageConfig::new());

    let err = suite.run().await.unwrap_err();

    assert_eq!(err.failed_stage(), Some(BUILD_IMAGES));
    assert!(err.to_string().contains("ubuntu18-image"));
    let history = suite.runner().history();
    assert_stage_failed(&history, BUILD_IMAGES);
    assert_stage_ran(&history, DELETE_IMAGES);
    assert_eq!(
        fixture.images.deleted(),
        vec![FakeImageBuilder::image_id("ubuntu16-image")]
    );
    assert!(fixture.provisioner.applies().is_empty());
}

#[tokio::test]
async fn test_failed_deletion_does_not_stop_the_others() {
    let fixture = SuiteFixture::new();
    fixture.images.fail_delete("img-ubuntu16-image");
    let suite = fixture.suite(StageConfig::new());

    let err = suite.run().await.unwrap_err();

    assert_eq!(err.kind(), "teardown");
    assert_eq!(err.failed_stage(), Some(DELETE_IMAGES));
    assert!(err.to_string().contains("is in use"));
    assert_eq!(
        fixture.images.deleted(),
        vec![FakeImageBuilder::image_id("ubuntu18-image")]
    );
    assert_stage_failed(&suite.runner().history(), DELETE_IMAGES);
}

#[tokio::test]
async fn test_failed_rebuild_never_deletes_an_image_twice() {
    let fixture = SuiteFixture::new();
    assert!(fixture.suite(StageConfig::new()).run().await.unwrap().is_success());

    let scope = fixture.suite_scope();
    for name in ["ubuntu16-image", "ubuntu18-image"] {
        assert!(!fixture
            .store
            .contains(&scope, &variant_artifact_key(name))
            .await
            .unwrap());
    }

    fixture.images.fail_variant("ubuntu18-image");
    let suite = fixture.suite(StageConfig::new());
    let err = suite.run().await.unwrap_err();

    assert_eq!(err.failed_stage(), Some(BUILD_IMAGES));
    assert_stage_ran(&suite.runner().history(), DELETE_IMAGES);
    assert_eq!(
        fixture.images.deleted(),
        vec![
            FakeImageBuilder::image_id("ubuntu16-image"),
            FakeImageBuilder::image_id("ubuntu18-image"),
            FakeImageBuilder::image_id("ubuntu16-image"),
        ]
    );
}

#[tokio::test]
async fn test_single_image_id_is_forgotten_after_deletion() {
    let fixture = SuiteFixture::new().with_settings(|s| s.mode = SuiteMode::SingleImage);
    let suite = fixture.suite(StageConfig::new());

    assert!(suite.run().await.unwrap().is_success());
    assert!(!fixture
        .store
        .contains(&fixture.suite_scope(), SAVED_ARTIFACT_ID)
        .await
        .unwrap());

    // Nothing recorded any more, so a second delete is a no-op.
    suite.delete_images().await.unwrap();
    assert_eq!(fixture.images.deleted().len(), 1);
}

#[tokio::test]
async fn test_failed_destroy_reports_teardown_as_failed_stage() {
    let fixture = SuiteFixture::new();
    fixture.provisioner.fail_destroy("quota exceeded");
    let suite = fixture.suite(StageConfig::new());

    let report = suite.run().await.unwrap();

    assert_eq!(report.failures().len(), 4);
    for label in LABELS {
        assert_unit_failed_at(&report, label, TEARDOWN);
        let unit = unit(&report, label);
        assert_stage_failed(&unit.stages, TEARDOWN);
        assert!(unit.error.as_deref().unwrap().contains("quota exceeded"));
    }
    assert!(report.summary().contains("at teardown"));
}

#[tokio::test]
async fn test_crashing_unit_does_not_affect_siblings() {
    let fixture = SuiteFixture::new();
    let mut collaborators = fixture.collaborators();
    collaborators.provisioner = Arc::new(CrashingProvisioner {
        inner: fixture.provisioner.clone(),
        crash_in: "separate-ubuntu18-image",
    });
    let env = ScenarioEnv::new(
        fixture.settings.clone(),
        fixture.store.clone(),
        collaborators,
        StageConfig::new(),
    );
    let suite = Suite::new(env);

    let report = suite.run().await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failures().len(), 1);
    assert_unit_failed_at(&report, "separate-ubuntu18-image", DEPLOY);
    let crashed = unit(&report, "separate-ubuntu18-image");
    assert_eq!(crashed.error_kind.as_deref(), Some("panicked"));
    assert_stage_ran(&crashed.stages, TEARDOWN);
    for label in &LABELS[..3] {
        assert_unit_passed(&report, label);
    }
    assert_eq!(fixture.provisioner.live_count(), 0);
    assert_stage_ran(&suite.runner().history(), DELETE_IMAGES);
}

#[tokio::test]
async fn test_unconverged_cluster_fails_every_unit_with_last_mismatch() {
    let fixture = SuiteFixture::new().with_status(
        ScriptedStatusApi::new()
            .then_transport_error()
            .then_malformed()
            .then_counts(3, 1),
    );
    let suite = fixture.suite(StageConfig::new());

    let report = suite.run().await.unwrap();

    assert_eq!(report.failures().len(), 4);
    for label in LABELS {
        assert_unit_failed_at(&report, label, VALIDATE);
    }
    assert!(report.summary().contains("Expected the cluster to have 2 clients, but found 1"));
    assert_eq!(fixture.provisioner.live_count(), 0);
}

#[tokio::test]
async fn test_single_image_suite() {
    let fixture = SuiteFixture::new().with_settings(|s| s.mode = SuiteMode::SingleImage);
    let suite = fixture.suite(StageConfig::new());

    let report = suite.run().await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    let labels: Vec<&str> = report.units.iter().map(|u| u.label.as_str()).collect();
    assert_eq!(labels, vec!["colocated-image", "separate-image"]);

    let history = suite.runner().history();
    assert_stage_ran(&history, BUILD_IMAGE);
    assert_stage_ran(&history, DELETE_IMAGE);

    let builds = fixture.images.builds();
    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].only.as_deref(), Some("ubuntu16-image"));
    assert_eq!(
        fixture.images.deleted(),
        vec![FakeImageBuilder::image_id("ubuntu16-image")]
    );
    for options in fixture.provisioner.applies() {
        assert!(options
            .vars
            .values()
            .any(|v| v.as_str() == Some("img-ubuntu16-image")));
    }
}

#[tokio::test]
async fn test_skipping_outer_stages_reuses_saved_images() {
    let fixture = SuiteFixture::new();
    fixture.seed_suite_state(&["ubuntu16-image", "ubuntu18-image"]).await;
    let suite = fixture.suite(
        StageConfig::new()
            .with_skip(BUILD_IMAGES)
            .with_skip(DELETE_IMAGES),
    );

    let report = suite.run().await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    let history = suite.runner().history();
    assert_stage_skipped(&history, BUILD_IMAGES);
    assert_stage_skipped(&history, DELETE_IMAGES);
    assert!(fixture.images.builds().is_empty());
    assert!(fixture.images.deleted().is_empty());
    assert_eq!(fixture.provisioner.applies().len(), 4);
}

#[tokio::test]
async fn test_split_runs_share_state_across_invocations() {
    let fixture = SuiteFixture::new()
        .with_settings(|s| s.scenarios = vec![ScenarioKind::Colocated]);

    // First invocation: build and deploy, leave everything up.
    let first = fixture.suite(
        StageConfig::new()
            .with_skip(VALIDATE)
            .with_skip(TEARDOWN)
            .with_skip(DELETE_IMAGES),
    );
    assert!(first.run().await.unwrap().is_success());
    assert_eq!(fixture.provisioner.live_count(), 2);

    // Second invocation: only validate and tear down.
    let second = fixture.suite(
        StageConfig::new()
            .with_skip(BUILD_IMAGES)
            .with_skip(DEPLOY),
    );
    let report = second.run().await.unwrap();

    assert!(report.is_success(), "{}", report.summary());
    for u in &report.units {
        assert_stage_skipped(&u.stages, DEPLOY);
        assert_stage_ran(&u.stages, VALIDATE);
        assert_stage_ran(&u.stages, TEARDOWN);
    }
    assert_eq!(fixture.images.builds().len(), 2);
    assert_eq!(fixture.images.deleted().len(), 2);
    assert_eq!(fixture.provisioner.applies().len(), 2);
    assert_eq!(fixture.provisioner.live_count(), 0);
}

#[tokio::test]
async fn test_concurrent_units_never_share_names_or_scopes() {
    let fixture = SuiteFixture::new();
    let report = fixture.suite(StageConfig::new()).run().await.unwrap();
    assert!(report.is_success());

    let applies = fixture.provisioner.applies();
    let dirs: BTreeSet<_> = applies.iter().map(|o| o.dir.clone()).collect();
    assert_eq!(dirs.len(), 4);

    let names: Vec<&str> = applies
        .iter()
        .flat_map(|o| {
            o.vars
                .iter()
                .filter(|(k, _)| k.ends_with("_cluster_name"))
                .filter_map(|(_, v)| v.as_str())
        })
        .collect();
    let unique: BTreeSet<&str> = names.iter().copied().collect();
    assert_eq!(unique.len(), names.len());
    for name in names {
        assert!(validate_resource_name(name).is_ok(), "{name}");
    }
}

#[tokio::test]
async fn test_empty_instance_group_is_waited_out() {
    let fixture = SuiteFixture::new()
        .with_settings(|s| {
            s.scenarios = vec![ScenarioKind::Separate];
            s.build_names = vec!["ubuntu18-image".into()];
        })
        .with_inventory(crate::testing::FakeInventory::new().with_empty_fetches(2));

    let report = fixture.suite(StageConfig::new()).run().await.unwrap();

    assert_unit_passed(&report, "separate-ubuntu18-image");
    assert_eq!(fixture.inventory.fetches(), 3);
}
