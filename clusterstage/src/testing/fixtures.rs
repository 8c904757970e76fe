//! Test fixtures for suite and scenario testing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::mocks::{FakeImageBuilder, FakeInventory, FakeProvisioner, ScriptedStatusApi};
use crate::config::SuiteConfig;
use crate::events::CollectingEventSink;
use crate::poll::RetryConfig;
use crate::scenario::{Collaborators, Location, ScenarioEnv, Suite};
use crate::stage::StageConfig;
use crate::state::keys::variant_artifact_key;
use crate::state::{InMemoryStateStore, Scope, StateStoreExt};

/// Fakes for every collaborator plus a shared in-memory store.
///
/// Polls never sleep and give up after a few attempts. Every environment
/// created from one fixture shares the same store and fakes, so several
/// `env` calls behave like successive processes of one CI job.
pub struct SuiteFixture {
    /// Suite settings handed to every environment.
    pub settings: SuiteConfig,
    /// Shared state.
    pub store: Arc<InMemoryStateStore>,
    /// Provisioning fake.
    pub provisioner: Arc<FakeProvisioner>,
    /// Image build fake.
    pub images: Arc<FakeImageBuilder>,
    /// Inventory fake.
    pub inventory: Arc<FakeInventory>,
    /// Status API script.
    pub status: Arc<ScriptedStatusApi>,
    /// Records every event.
    pub sink: Arc<CollectingEventSink>,
}

impl Default for SuiteFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl SuiteFixture {
    /// Creates a fixture whose cluster reports 3 servers and 2 clients.
    #[must_use]
    pub fn new() -> Self {
        let settings = SuiteConfig {
            work_dir: PathBuf::from("/work"),
            address_poll: RetryConfig::fixed(3, Duration::ZERO),
            cluster_poll: RetryConfig::fixed(3, Duration::ZERO),
            ..SuiteConfig::default()
        };
        Self {
            settings,
            store: Arc::new(InMemoryStateStore::new()),
            provisioner: Arc::new(FakeProvisioner::new()),
            images: Arc::new(FakeImageBuilder::new()),
            inventory: Arc::new(FakeInventory::new()),
            status: Arc::new(ScriptedStatusApi::steady(3, 2)),
            sink: Arc::new(CollectingEventSink::new()),
        }
    }

    /// Replaces the status API with one reporting fixed counts.
    #[must_use]
    pub fn with_cluster_counts(self, servers: usize, clients: usize) -> Self {
        self.with_status(ScriptedStatusApi::steady(servers, clients))
    }

    /// Replaces the status API.
    #[must_use]
    pub fn with_status(mut self, status: ScriptedStatusApi) -> Self {
        self.status = Arc::new(status);
        self
    }

    /// Replaces the inventory.
    #[must_use]
    pub fn with_inventory(mut self, inventory: FakeInventory) -> Self {
        self.inventory = Arc::new(inventory);
        self
    }

    /// Edits the settings.
    #[must_use]
    pub fn with_settings(mut self, edit: impl FnOnce(&mut SuiteConfig)) -> Self {
        edit(&mut self.settings);
        self
    }

    /// The fakes as collaborators.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            provisioner: self.provisioner.clone(),
            images: self.images.clone(),
            inventory: self.inventory.clone(),
            status: self.status.clone(),
        }
    }

    /// An environment over the fakes, with the given skip flags.
    #[must_use]
    pub fn env(&self, stages: StageConfig) -> ScenarioEnv {
        ScenarioEnv::new(
            self.settings.clone(),
            self.store.clone(),
            self.collaborators(),
            stages,
        )
        .with_sink(self.sink.clone())
    }

    /// A suite over the fakes, with the given skip flags.
    #[must_use]
    pub fn suite(&self, stages: StageConfig) -> Suite {
        Suite::new(self.env(stages))
    }

    /// Scope of suite-wide values.
    #[must_use]
    pub fn suite_scope(&self) -> Scope {
        Scope::new(self.settings.work_dir.clone())
    }

    /// Saves what a successful build stage would have: the location and
    /// one image per listed variant.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory store rejects a write.
    pub async fn seed_suite_state(&self, variants: &[&str]) {
        let scope = self.suite_scope();
        let location = Location {
            project: "test-project".into(),
            region: "us-east1".into(),
            zone: "us-east1-b".into(),
        };
        location.save(self.store.as_ref(), &scope).await.unwrap();
        for variant in variants {
            self.store
                .save(
                    &scope,
                    &variant_artifact_key(variant),
                    &FakeImageBuilder::image_id(variant),
                )
                .await
                .unwrap();
        }
    }
}
