//! In-memory collaborators for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cluster::{ClusterStatusApi, MemberCount, StatusEndpoint, DEFAULT_STATUS_PORT};
use crate::core::ArtifactId;
use crate::errors::{ClusterStageError, Result};
use crate::infra::{
    choose_random, CloudInventory, ImageBuildOptions, ImageBuilder, ImageHandle, Instance,
    InstanceGroup, ProvisionOptions, ProvisionOutputs, Provisioner,
};
use crate::scenario::vars::{
    TFOUT_SERVER_INSTANCE_GROUP_NAME, TFVAR_NOMAD_CONSUL_SERVER_CLUSTER_NAME,
    TFVAR_NOMAD_SERVER_CLUSTER_NAME,
};

/// A provisioner that records what it was asked to do.
///
/// Applied module directories count as live until destroyed. The server
/// instance group output is the server cluster name from the options.
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    applies: Mutex<Vec<ProvisionOptions>>,
    destroys: Mutex<Vec<ProvisionOptions>>,
    live: Mutex<BTreeSet<PathBuf>>,
    apply_error: Mutex<Option<String>>,
    destroy_error: Mutex<Option<String>>,
}

impl FakeProvisioner {
    /// Creates a provisioner that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every apply fail with the given message.
    pub fn fail_apply(&self, message: impl Into<String>) {
        *self.apply_error.lock() = Some(message.into());
    }

    /// Makes every destroy fail with the given message.
    pub fn fail_destroy(&self, message: impl Into<String>) {
        *self.destroy_error.lock() = Some(message.into());
    }

    /// Options of every apply, in order.
    #[must_use]
    pub fn applies(&self) -> Vec<ProvisionOptions> {
        self.applies.lock().clone()
    }

    /// Options of every destroy, in order.
    #[must_use]
    pub fn destroys(&self) -> Vec<ProvisionOptions> {
        self.destroys.lock().clone()
    }

    /// Number of applied, not yet destroyed module directories.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    fn server_group(options: &ProvisionOptions) -> Result<String> {
        options
            .var_str(TFVAR_NOMAD_SERVER_CLUSTER_NAME)
            .or_else(|| options.var_str(TFVAR_NOMAD_CONSUL_SERVER_CLUSTER_NAME))
            .map(String::from)
            .ok_or_else(|| ClusterStageError::provisioning("output", "no server cluster name set"))
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn prepare_dir(&self, _module: &Path, dest: &Path) -> Result<PathBuf> {
        Ok(dest.to_path_buf())
    }

    async fn apply(&self, options: &ProvisionOptions) -> Result<ProvisionOutputs> {
        self.applies.lock().push(options.clone());
        if let Some(message) = self.apply_error.lock().clone() {
            return Err(ClusterStageError::provisioning("apply", message));
        }
        self.live.lock().insert(options.dir.clone());
        Ok(ProvisionOutputs::new().with(TFOUT_SERVER_INSTANCE_GROUP_NAME, Self::server_group(options)?))
    }

    async fn output(&self, options: &ProvisionOptions, name: &str) -> Result<String> {
        if !self.live.lock().contains(&options.dir) {
            return Err(ClusterStageError::provisioning(
                "output",
                format!("nothing applied in {}", options.dir.display()),
            ));
        }
        if name != TFOUT_SERVER_INSTANCE_GROUP_NAME {
            return Err(ClusterStageError::provisioning(
                "output",
                format!("no output named '{name}'"),
            ));
        }
        Self::server_group(options)
    }

    async fn destroy(&self, options: &ProvisionOptions) -> Result<()> {
        self.destroys.lock().push(options.clone());
        if let Some(message) = self.destroy_error.lock().clone() {
            return Err(ClusterStageError::provisioning("destroy", message));
        }
        self.live.lock().remove(&options.dir);
        Ok(())
    }
}

/// An image builder that hands out `img-<build name>` ids.
#[derive(Debug, Default)]
pub struct FakeImageBuilder {
    builds: Mutex<Vec<ImageBuildOptions>>,
    failing_builds: Mutex<BTreeSet<String>>,
    failing_deletes: Mutex<BTreeSet<String>>,
    deleted: Mutex<Vec<ArtifactId>>,
}

impl FakeImageBuilder {
    /// Creates a builder that succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the build of one build name fail.
    pub fn fail_variant(&self, build_name: impl Into<String>) {
        self.failing_builds.lock().insert(build_name.into());
    }

    /// Makes the deletion of one image fail.
    pub fn fail_delete(&self, id: impl Into<String>) {
        self.failing_deletes.lock().insert(id.into());
    }

    /// Options of every build, in order.
    #[must_use]
    pub fn builds(&self) -> Vec<ImageBuildOptions> {
        self.builds.lock().clone()
    }

    /// Images deleted so far, in order.
    #[must_use]
    pub fn deleted(&self) -> Vec<ArtifactId> {
        self.deleted.lock().clone()
    }

    /// The id a build of `build_name` produces.
    #[must_use]
    pub fn image_id(build_name: &str) -> ArtifactId {
        ArtifactId::new(format!("img-{build_name}"))
    }
}

#[async_trait]
impl ImageBuilder for FakeImageBuilder {
    async fn build(&self, options: &ImageBuildOptions) -> Result<ArtifactId> {
        self.builds.lock().push(options.clone());
        let name = options.only.clone().unwrap_or_else(|| "image".to_string());
        if self.failing_builds.lock().contains(&name) {
            return Err(ClusterStageError::provisioning(
                "build",
                format!("builder '{name}' failed"),
            ));
        }
        Ok(Self::image_id(&name))
    }

    async fn fetch_image(&self, project: &str, id: &ArtifactId) -> Result<ImageHandle> {
        Ok(ImageHandle {
            project: project.to_string(),
            id: id.clone(),
        })
    }

    async fn delete_image(&self, handle: &ImageHandle) -> Result<()> {
        if self.failing_deletes.lock().contains(handle.id.as_str()) {
            return Err(ClusterStageError::provisioning(
                "delete_image",
                format!("image '{}' is in use", handle.id),
            ));
        }
        self.deleted.lock().push(handle.id.clone());
        Ok(())
    }
}

/// A cloud inventory with one project and fixed-size instance groups.
#[derive(Debug)]
pub struct FakeInventory {
    project: String,
    group_size: usize,
    address: String,
    empty_fetches: AtomicUsize,
    fetches: AtomicUsize,
}

impl Default for FakeInventory {
    fn default() -> Self {
        Self {
            project: "test-project".to_string(),
            group_size: 3,
            address: "10.0.0.1".to_string(),
            empty_fetches: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
        }
    }
}

impl FakeInventory {
    /// Creates an inventory for `test-project`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the project id.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Makes the first `n` group fetches return an empty group.
    #[must_use]
    pub fn with_empty_fetches(self, n: usize) -> Self {
        self.empty_fetches.store(n, Ordering::SeqCst);
        self
    }

    /// Number of instance group fetches so far.
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudInventory for FakeInventory {
    async fn current_project_id(&self) -> Result<String> {
        Ok(self.project.clone())
    }

    async fn random_region(&self, _project: &str, allowed: &[String]) -> Result<String> {
        choose_random(allowed, "region")
    }

    async fn random_zone_in_region(&self, _project: &str, region: &str) -> Result<String> {
        Ok(format!("{region}-b"))
    }

    async fn fetch_instance_group(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<InstanceGroup> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let empty = self
            .empty_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let size = if empty { 0 } else { self.group_size };
        Ok(InstanceGroup {
            project: project.to_string(),
            region: region.to_string(),
            name: name.to_string(),
            instances: (0..size)
                .map(|i| Instance {
                    project: project.to_string(),
                    zone: format!("{region}-b"),
                    name: format!("{name}-{i}"),
                })
                .collect(),
        })
    }

    async fn public_address(&self, _instance: &Instance) -> Result<String> {
        Ok(self.address.clone())
    }
}

#[derive(Debug, Clone, Copy)]
enum Reply {
    Counts { servers: usize, clients: usize },
    Transport,
    Malformed,
}

/// A status API that plays back scripted rounds.
///
/// Each `v1/nodes` call starts the next round and `v1/status/peers` answers
/// from the current one, matching the order the validator reads them in.
/// The last round repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedStatusApi {
    rounds: Vec<Reply>,
    node_calls: AtomicUsize,
    peer_calls: AtomicUsize,
}

impl ScriptedStatusApi {
    /// Creates an API with no rounds; every call fails with a transport error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An API that always reports the same counts.
    #[must_use]
    pub fn steady(servers: usize, clients: usize) -> Self {
        Self::new().then_counts(servers, clients)
    }

    /// Adds a round reporting these counts.
    #[must_use]
    pub fn then_counts(mut self, servers: usize, clients: usize) -> Self {
        self.rounds.push(Reply::Counts { servers, clients });
        self
    }

    /// Adds a round where the node is unreachable.
    #[must_use]
    pub fn then_transport_error(mut self) -> Self {
        self.rounds.push(Reply::Transport);
        self
    }

    /// Adds a round where the node answers with a JSON object.
    #[must_use]
    pub fn then_malformed(mut self) -> Self {
        self.rounds.push(Reply::Malformed);
        self
    }

    /// Number of calls made to an endpoint.
    #[must_use]
    pub fn calls(&self, endpoint: StatusEndpoint) -> usize {
        match endpoint {
            StatusEndpoint::Nodes => self.node_calls.load(Ordering::SeqCst),
            StatusEndpoint::Peers => self.peer_calls.load(Ordering::SeqCst),
        }
    }

    fn reply(&self, endpoint: StatusEndpoint) -> Reply {
        let node_calls = match endpoint {
            StatusEndpoint::Nodes => self.node_calls.fetch_add(1, Ordering::SeqCst) + 1,
            StatusEndpoint::Peers => {
                self.peer_calls.fetch_add(1, Ordering::SeqCst);
                self.node_calls.load(Ordering::SeqCst)
            }
        };
        let round = node_calls.saturating_sub(1).min(self.rounds.len().saturating_sub(1));
        self.rounds.get(round).copied().unwrap_or(Reply::Transport)
    }
}

#[async_trait]
impl ClusterStatusApi for ScriptedStatusApi {
    async fn member_count(&self, address: &str, endpoint: StatusEndpoint) -> Result<MemberCount> {
        let url = endpoint.url(address, DEFAULT_STATUS_PORT);
        match self.reply(endpoint) {
            Reply::Counts { servers, clients } => Ok(MemberCount {
                count: match endpoint {
                    StatusEndpoint::Nodes => clients,
                    StatusEndpoint::Peers => servers,
                },
            }),
            Reply::Transport => Err(ClusterStageError::transport(url, "connection refused")),
            Reply::Malformed => Err(ClusterStageError::malformed(
                url,
                "expected a JSON array, found an object",
            )),
        }
    }
}
