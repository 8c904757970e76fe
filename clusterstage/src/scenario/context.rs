//! What a scenario needs to run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::topology::{ClusterTopology, ScenarioKind};
use crate::cluster::ClusterStatusApi;
use crate::config::SuiteConfig;
use crate::core::ArtifactId;
use crate::errors::Result;
use crate::events::{EventSink, NoOpEventSink};
use crate::infra::{CloudInventory, ImageBuilder, Provisioner};
use crate::poll::Poller;
use crate::stage::{StageConfig, StageRunner};
use crate::state::keys::{
    variant_artifact_key, SAVED_GCP_PROJECT_ID, SAVED_GCP_REGION_NAME, SAVED_GCP_ZONE_NAME,
};
use crate::state::{Scope, StateStore, StateStoreExt};

/// Hidden directory under the work dir holding one scope per scenario.
pub const SCENARIO_SCOPE_DIR: &str = ".clusterstage";

/// The external systems a suite talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Applies and destroys infrastructure.
    pub provisioner: Arc<dyn Provisioner>,
    /// Builds and deletes machine images.
    pub images: Arc<dyn ImageBuilder>,
    /// Looks up projects, regions and instances.
    pub inventory: Arc<dyn CloudInventory>,
    /// Reads cluster membership.
    pub status: Arc<dyn ClusterStatusApi>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[cfg(feature = "http")]
impl Collaborators {
    /// The real thing: `terraform`, `packer`, `gcloud` and HTTP.
    pub fn command_backed(config: &SuiteConfig) -> Result<Self> {
        use crate::cluster::HttpClusterStatusClient;
        use crate::infra::{GcloudInventory, PackerImageBuilder, TerraformProvisioner};

        let status =
            HttpClusterStatusClient::new(config.http_timeout())?.with_port(config.status_port);
        Ok(Self {
            provisioner: Arc::new(TerraformProvisioner::new()),
            images: Arc::new(PackerImageBuilder::new()),
            inventory: Arc::new(GcloudInventory::new()),
            status: Arc::new(status),
        })
    }
}

/// Where in the cloud a suite runs, chosen once by the build stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Project id.
    pub project: String,
    /// Region name.
    pub region: String,
    /// Zone name.
    pub zone: String,
}

impl Location {
    /// Saves the location under its well-known keys.
    pub async fn save(&self, store: &dyn StateStore, scope: &Scope) -> Result<()> {
        store.save_string(scope, SAVED_GCP_PROJECT_ID, &self.project).await?;
        store.save_string(scope, SAVED_GCP_REGION_NAME, &self.region).await?;
        store.save_string(scope, SAVED_GCP_ZONE_NAME, &self.zone).await
    }

    /// Loads a location saved by [`save`](Self::save).
    pub async fn load(store: &dyn StateStore, scope: &Scope) -> Result<Self> {
        Ok(Self {
            project: store.load_string(scope, SAVED_GCP_PROJECT_ID).await?,
            region: store.load_string(scope, SAVED_GCP_REGION_NAME).await?,
            zone: store.load_string(scope, SAVED_GCP_ZONE_NAME).await?,
        })
    }
}

/// Which image a scenario deploys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// The image built for a named variant.
    Variant(String),
    /// The single image of a single-image suite.
    SavedArtifact,
}

impl ImageSource {
    /// Label used in scope names and reports.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Variant(name) => name,
            Self::SavedArtifact => "image",
        }
    }

    /// Loads the image id the build stage saved for this source.
    pub async fn resolve(&self, store: &dyn StateStore, scope: &Scope) -> Result<ArtifactId> {
        match self {
            Self::Variant(name) => store.load(scope, &variant_artifact_key(name)).await,
            Self::SavedArtifact => store.load_artifact_id(scope).await,
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything shared by the scenarios of one suite run.
#[derive(Clone)]
pub struct ScenarioEnv {
    /// Suite settings.
    pub settings: Arc<SuiteConfig>,
    /// Where values are handed between stages.
    pub store: Arc<dyn StateStore>,
    /// The external systems.
    pub collaborators: Collaborators,
    /// Skip configuration shared by every runner.
    pub stages: Arc<StageConfig>,
    /// Receives stage, poll and scenario events.
    pub sink: Arc<dyn EventSink>,
}

impl fmt::Debug for ScenarioEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioEnv")
            .field("settings", &self.settings)
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl ScenarioEnv {
    /// Creates an environment with no event reporting.
    #[must_use]
    pub fn new(
        settings: SuiteConfig,
        store: Arc<dyn StateStore>,
        collaborators: Collaborators,
        stages: StageConfig,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            store,
            collaborators,
            stages: Arc::new(stages),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Scope of the suite-wide values: location and image ids.
    #[must_use]
    pub fn suite_scope(&self) -> Scope {
        Scope::new(self.settings.work_dir.clone())
    }

    /// A stage runner sharing this environment's skip plane and sink.
    #[must_use]
    pub fn runner(&self) -> StageRunner {
        StageRunner::with_shared_config(self.stages.clone()).with_sink(self.sink.clone())
    }

    /// A poller reporting to this environment's sink.
    #[must_use]
    pub fn poller(&self) -> Poller {
        Poller::new(self.sink.clone())
    }

    /// Builds the context of one scenario instance.
    ///
    /// The scope is derived from kind and image only, so a later process
    /// (re-running `validate` or `teardown` alone) finds the values the
    /// earlier `deploy` saved.
    pub fn scenario(&self, kind: ScenarioKind, image: ImageSource) -> Result<ScenarioContext> {
        let topology = ClusterTopology::new(
            kind,
            self.settings.num_servers,
            self.settings.num_clients,
        )?;
        let scope = self
            .suite_scope()
            .child(SCENARIO_SCOPE_DIR)
            .child(&format!("{kind}-{}", image.label()));
        Ok(ScenarioContext {
            kind,
            image,
            topology,
            scope,
            suite_scope: self.suite_scope(),
            runner: Arc::new(self.runner()),
            poller: self.poller(),
            env: self.clone(),
        })
    }
}

/// One scenario instance: a kind, an image and a private scope.
#[derive(Clone)]
pub struct ScenarioContext {
    /// Scenario shape.
    pub kind: ScenarioKind,
    /// Image to deploy.
    pub image: ImageSource,
    /// Sizes and naming suffix.
    pub topology: ClusterTopology,
    /// This instance's private scope.
    pub scope: Scope,
    /// Scope of suite-wide values.
    pub suite_scope: Scope,
    /// Runner with this instance's own history.
    pub runner: Arc<StageRunner>,
    /// Poller used for address and membership polls.
    pub poller: Poller,
    /// The shared environment.
    pub env: ScenarioEnv,
}

impl fmt::Debug for ScenarioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScenarioContext")
            .field("kind", &self.kind)
            .field("image", &self.image)
            .field("topology", &self.topology)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl ScenarioContext {
    /// `<kind>-<image>`, unique within a suite.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}-{}", self.kind, self.image.label())
    }

    /// Directory the module copy of this instance lives in.
    #[must_use]
    pub fn module_dir(&self) -> PathBuf {
        self.scope.as_path().join("module")
    }

    /// The state store.
    #[must_use]
    pub fn store(&self) -> &dyn StateStore {
        self.env.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStateStore;
    use crate::testing::SuiteFixture;

    #[tokio::test]
    async fn test_location_round_trip() {
        let store = InMemoryStateStore::new();
        let scope = Scope::new("/work");
        let location = Location {
            project: "my-project".into(),
            region: "us-east1".into(),
            zone: "us-east1-b".into(),
        };

        location.save(&store, &scope).await.unwrap();
        assert_eq!(Location::load(&store, &scope).await.unwrap(), location);
        assert_eq!(
            Location::load(&store, &Scope::new("/elsewhere")).await.unwrap_err().kind(),
            "not_found"
        );
    }

    #[tokio::test]
    async fn test_image_source_resolve() {
        let store = InMemoryStateStore::new();
        let scope = Scope::new("/work");
        store
            .save_string(&scope, "ubuntu18-image-id", "img-18")
            .await
            .unwrap();
        store
            .save_artifact_id(&scope, &ArtifactId::new("img-single"))
            .await
            .unwrap();

        let variant = ImageSource::Variant("ubuntu18-image".into());
        assert_eq!(variant.resolve(&store, &scope).await.unwrap().as_str(), "img-18");
        assert_eq!(
            ImageSource::SavedArtifact.resolve(&store, &scope).await.unwrap().as_str(),
            "img-single"
        );
        assert!(ImageSource::Variant("ubuntu16-image".into())
            .resolve(&store, &scope)
            .await
            .is_err());
    }

    #[test]
    fn test_scenario_scopes_are_distinct_and_stable() {
        let fixture = SuiteFixture::new();
        let env = fixture.env(StageConfig::new());

        let a = env
            .scenario(ScenarioKind::Colocated, ImageSource::Variant("ubuntu16-image".into()))
            .unwrap();
        let b = env
            .scenario(ScenarioKind::Colocated, ImageSource::Variant("ubuntu18-image".into()))
            .unwrap();
        let a_again = env
            .scenario(ScenarioKind::Colocated, ImageSource::Variant("ubuntu16-image".into()))
            .unwrap();

        assert_ne!(a.scope, b.scope);
        assert_eq!(a.scope, a_again.scope);
        assert_eq!(a.label(), "colocated-ubuntu16-image");
        assert_ne!(a.topology.unique_suffix, b.topology.unique_suffix);
    }
}
