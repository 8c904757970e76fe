//! The outer stages: build images, run the matrix, delete images.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::context::{ImageSource, Location, ScenarioEnv};
use super::matrix::{MatrixReport, ScenarioMatrix};
use super::vars::{PACKER_VAR_PROJECT_ID, PACKER_VAR_ZONE};
use super::SuiteMode;
use crate::core::{ArtifactId, ProvisionedArtifact};
use crate::errors::{ClusterStageError, Result};
use crate::infra::ImageBuildOptions;
use crate::stage::{run_with_teardown, StageRunner, TeardownRegistry};
use crate::state::keys::{
    variant_artifact_key, SAVED_ARTIFACT_ID, SAVED_GCP_PROJECT_ID, SAVED_IMAGE_VARIANTS,
};
use crate::state::{StateStore, StateStoreExt};

/// A full suite run.
///
/// Images are built once for every scenario, and deleted after the last
/// scenario finished. Both outer stages are skippable like any other, so a
/// developer can keep images around between runs.
#[derive(Debug, Clone)]
pub struct Suite {
    env: ScenarioEnv,
    runner: Arc<StageRunner>,
}

impl Suite {
    /// Creates a suite over an environment.
    #[must_use]
    pub fn new(env: ScenarioEnv) -> Self {
        let runner = Arc::new(env.runner());
        Self { env, runner }
    }

    /// The environment.
    #[must_use]
    pub fn env(&self) -> &ScenarioEnv {
        &self.env
    }

    /// The runner of the outer stages.
    #[must_use]
    pub fn runner(&self) -> &StageRunner {
        &self.runner
    }

    fn mode(&self) -> SuiteMode {
        self.env.settings.mode
    }

    /// The images scenarios run against.
    #[must_use]
    pub fn images(&self) -> Vec<ImageSource> {
        match self.mode() {
            SuiteMode::SingleImage => vec![ImageSource::SavedArtifact],
            SuiteMode::MultiVariant => self
                .env
                .settings
                .build_names
                .iter()
                .cloned()
                .map(ImageSource::Variant)
                .collect(),
        }
    }

    /// Every configured scenario against every image.
    #[must_use]
    pub fn matrix(&self) -> ScenarioMatrix {
        ScenarioMatrix::cartesian(self.env.clone(), &self.env.settings.scenarios, &self.images())
    }

    fn image_options(&self, location: &Location, build_name: Option<&str>) -> ImageBuildOptions {
        let options = ImageBuildOptions::new(self.env.settings.image_template.clone())
            .with_var(PACKER_VAR_PROJECT_ID, location.project.as_str())
            .with_var(PACKER_VAR_ZONE, location.zone.as_str());
        match build_name {
            Some(name) => options.only(name),
            None => options,
        }
    }

    /// Work of the build stage.
    ///
    /// Picks the location, saves it, then builds. In multi-variant mode the
    /// variant list is saved before any build starts so that the delete
    /// stage can find whatever did get built; every successful build is
    /// recorded even when a sibling build fails. Ids left by an earlier run
    /// are dropped first, so a failed build never leaves a stale id behind.
    pub async fn build_images(&self) -> Result<()> {
        let settings = &self.env.settings;
        let store = self.env.store.as_ref();
        let scope = self.env.suite_scope();
        let inventory = &self.env.collaborators.inventory;
        let images = &self.env.collaborators.images;

        let project = inventory.current_project_id().await?;
        let region = inventory
            .random_region(&project, &settings.allowed_regions)
            .await?;
        let zone = inventory.random_zone_in_region(&project, &region).await?;
        let location = Location {
            project,
            region,
            zone,
        };
        info!(project = %location.project, region = %location.region, zone = %location.zone, "Selected test location");
        location.save(store, &scope).await?;

        match self.mode() {
            SuiteMode::SingleImage => {
                store.delete(&scope, SAVED_ARTIFACT_ID).await?;
                let options =
                    self.image_options(&location, settings.build_names.first().map(String::as_str));
                let id = images.build(&options).await?;
                info!(image = %id, "Built image");
                store.save_artifact_id(&scope, &id).await
            }
            SuiteMode::MultiVariant => {
                store
                    .save(&scope, SAVED_IMAGE_VARIANTS, &settings.build_names)
                    .await?;
                for name in &settings.build_names {
                    store.delete(&scope, &variant_artifact_key(name)).await?;
                }

                let requests: BTreeMap<String, ImageBuildOptions> = settings
                    .build_names
                    .iter()
                    .map(|name| (name.clone(), self.image_options(&location, Some(name))))
                    .collect();

                let mut failures = Vec::new();
                for (variant, result) in images.build_all(&requests).await {
                    match result {
                        Ok(id) => {
                            let artifact = ProvisionedArtifact::new(id, variant);
                            info!(variant = %artifact.variant_key, image = %artifact.id, "Built image");
                            store
                                .save(&scope, &variant_artifact_key(&artifact.variant_key), &artifact.id)
                                .await?;
                        }
                        Err(e) => {
                            error!(%variant, error = %e, "Image build failed");
                            failures.push(format!("{variant}: {e}"));
                        }
                    }
                }

                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(ClusterStageError::provisioning(
                        "build_images",
                        failures.join("; "),
                    ))
                }
            }
        }
    }

    /// Work of the delete stage.
    ///
    /// Iterates the persisted variant list, not the configured one. A
    /// variant with no recorded image is skipped; a failed deletion does not
    /// stop the others. The id of every deleted image is forgotten.
    pub async fn delete_images(&self) -> Result<()> {
        let store = self.env.store.as_ref();
        let scope = self.env.suite_scope();
        let project = store.load_string(&scope, SAVED_GCP_PROJECT_ID).await?;

        match self.mode() {
            SuiteMode::SingleImage => {
                let id = match store.load_artifact_id(&scope).await {
                    Ok(id) => id,
                    Err(ClusterStageError::NotFound { .. }) => {
                        warn!("No image recorded, nothing to delete");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                };
                self.delete_one(&project, &id).await?;
                store.delete(&scope, SAVED_ARTIFACT_ID).await
            }
            SuiteMode::MultiVariant => {
                let variants: Vec<String> = store.load(&scope, SAVED_IMAGE_VARIANTS).await?;
                let mut failures = Vec::new();

                for variant in &variants {
                    let id: ArtifactId =
                        match store.load(&scope, &variant_artifact_key(variant)).await {
                            Ok(id) => id,
                            Err(ClusterStageError::NotFound { .. }) => {
                                warn!(%variant, "No image recorded for variant, nothing to delete");
                                continue;
                            }
                            Err(e) => {
                                failures.push(format!("{variant}: {e}"));
                                continue;
                            }
                        };
                    match self.delete_one(&project, &id).await {
                        Ok(()) => store.delete(&scope, &variant_artifact_key(variant)).await?,
                        Err(e) => {
                            error!(%variant, image = %id, error = %e, "Image deletion failed");
                            failures.push(format!("{variant}: {e}"));
                        }
                    }
                }

                if failures.is_empty() {
                    Ok(())
                } else {
                    Err(ClusterStageError::provisioning(
                        "delete_images",
                        failures.join("; "),
                    ))
                }
            }
        }
    }

    async fn delete_one(&self, project: &str, id: &ArtifactId) -> Result<()> {
        let images = &self.env.collaborators.images;
        let handle = images.fetch_image(project, id).await?;
        images.delete_image(&handle).await?;
        info!(image = %id, "Deleted image");
        Ok(())
    }

    /// Runs the whole suite.
    ///
    /// The delete stage is registered before the build stage starts, so it
    /// runs even when the build fails partway. Scenario failures land in
    /// the returned report; a failed build or delete stage is an error.
    pub async fn run(&self) -> Result<MatrixReport> {
        let mode = self.mode();
        let registry = TeardownRegistry::new().with_sink(self.env.sink.clone());

        let suite = self.clone();
        registry.register(mode.delete_stage(), move || async move {
            suite
                .runner
                .run_stage(mode.delete_stage(), || suite.delete_images())
                .await
                .map(|_| ())
        });

        run_with_teardown(&registry, async {
            self.runner
                .run_stage(mode.build_stage(), || self.build_images())
                .await?;
            let report = self.matrix().run().await;
            info!("Scenario results:\n{}", report.summary());
            Ok(report)
        })
        .await
    }
}
