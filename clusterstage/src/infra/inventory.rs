//! Cloud inventory: projects, regions, zones and instances.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::command::{non_empty_lines, run_command, CommandSpec};
use crate::errors::{ClusterStageError, Result};

/// Environment variables consulted, in order, for the current project.
pub const PROJECT_ENV_VARS: [&str; 3] =
    ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT", "CLOUDSDK_CORE_PROJECT"];

/// One compute instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// The owning project.
    pub project: String,
    /// The zone the instance runs in.
    pub zone: String,
    /// The instance name.
    pub name: String,
}

/// A regional instance group as seen at one point in time.
///
/// Membership changes while a group scales up, so fetch a fresh group on
/// every poll attempt rather than holding on to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroup {
    /// The owning project.
    pub project: String,
    /// The group's region.
    pub region: String,
    /// The group name.
    pub name: String,
    /// Current members.
    pub instances: Vec<Instance>,
}

impl InstanceGroup {
    /// Picks one member at random.
    ///
    /// An empty group is not ready yet, which is a retryable condition.
    pub fn random_instance(&self) -> Result<&Instance> {
        self.instances
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| ClusterStageError::not_ready(&self.name, "instance group has no instances"))
    }
}

/// The cloud provider collaborator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudInventory: Send + Sync {
    /// Returns the project tests run in.
    async fn current_project_id(&self) -> Result<String>;

    /// Picks a random region, restricted to `allowed` when it is not empty.
    async fn random_region(&self, project: &str, allowed: &[String]) -> Result<String>;

    /// Picks a random zone of a region.
    async fn random_zone_in_region(&self, project: &str, region: &str) -> Result<String>;

    /// Fetches the current membership of a regional instance group.
    async fn fetch_instance_group(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<InstanceGroup>;

    /// Returns the public address of an instance.
    ///
    /// An instance without an external address yet is reported as
    /// [`ClusterStageError::NotReady`].
    async fn public_address(&self, instance: &Instance) -> Result<String>;
}

/// Picks one of `candidates` at random.
pub fn choose_random(candidates: &[String], what: &str) -> Result<String> {
    candidates
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or_else(|| ClusterStageError::Config(format!("no {what} to choose from")))
}

/// [`CloudInventory`] backed by the `gcloud` CLI.
#[derive(Debug, Clone)]
pub struct GcloudInventory {
    binary: String,
}

impl Default for GcloudInventory {
    fn default() -> Self {
        Self {
            binary: "gcloud".to_string(),
        }
    }
}

impl GcloudInventory {
    /// Creates an inventory using `gcloud` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific gcloud binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    async fn list(&self, args: &[&str]) -> Result<Vec<String>> {
        let stdout = run_command(&CommandSpec::new(&self.binary).args(args.iter().copied())).await?;
        Ok(non_empty_lines(&stdout))
    }
}

#[async_trait]
impl CloudInventory for GcloudInventory {
    async fn current_project_id(&self) -> Result<String> {
        project_from_vars(std::env::vars())
    }

    async fn random_region(&self, project: &str, allowed: &[String]) -> Result<String> {
        let regions = self
            .list(&["compute", "regions", "list", "--project", project, "--format=value(name)"])
            .await?;
        let candidates: Vec<String> = if allowed.is_empty() {
            regions
        } else {
            regions.into_iter().filter(|r| allowed.contains(r)).collect()
        };
        choose_random(&candidates, "region")
    }

    async fn random_zone_in_region(&self, project: &str, region: &str) -> Result<String> {
        let filter = format!("--filter=region:{region}");
        let zones = self
            .list(&[
                "compute",
                "zones",
                "list",
                "--project",
                project,
                filter.as_str(),
                "--format=value(name)",
            ])
            .await?;
        choose_random(&zones, "zone")
    }

    async fn fetch_instance_group(
        &self,
        project: &str,
        region: &str,
        name: &str,
    ) -> Result<InstanceGroup> {
        let urls = self
            .list(&[
                "compute",
                "instance-groups",
                "list-instances",
                name,
                "--region",
                region,
                "--project",
                project,
                "--format=value(instance)",
            ])
            .await?;
        debug!(group = %name, members = urls.len(), "Fetched instance group");

        let instances = urls
            .iter()
            .map(|url| parse_instance_url(project, url))
            .collect::<Result<Vec<_>>>()?;
        Ok(InstanceGroup {
            project: project.to_string(),
            region: region.to_string(),
            name: name.to_string(),
            instances,
        })
    }

    async fn public_address(&self, instance: &Instance) -> Result<String> {
        let stdout = run_command(&CommandSpec::new(&self.binary).args([
            "compute",
            "instances",
            "describe",
            instance.name.as_str(),
            "--zone",
            instance.zone.as_str(),
            "--project",
            instance.project.as_str(),
            "--format=value(networkInterfaces[0].accessConfigs[0].natIP)",
        ]))
        .await?;

        let address = stdout.trim();
        if address.is_empty() {
            return Err(ClusterStageError::not_ready(
                &instance.name,
                "instance has no public address",
            ));
        }
        Ok(address.to_string())
    }
}

/// Resolves the project from the first set variable of [`PROJECT_ENV_VARS`].
pub fn project_from_vars<I, K, V>(vars: I) -> Result<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let found: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(k, v)| PROJECT_ENV_VARS.contains(&k.as_ref()) && !v.as_ref().trim().is_empty())
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().trim().to_string()))
        .collect();

    PROJECT_ENV_VARS
        .iter()
        .find_map(|name| found.iter().find(|(k, _)| k.as_str() == *name).map(|(_, v)| v.clone()))
        .ok_or_else(|| {
            ClusterStageError::Config(format!(
                "no project id set; export one of {}",
                PROJECT_ENV_VARS.join(", ")
            ))
        })
}

/// Parses an instance URL of the form
/// `.../projects/<p>/zones/<zone>/instances/<name>`, or a bare name.
fn parse_instance_url(project: &str, url: &str) -> Result<Instance> {
    let segments: Vec<&str> = url.trim_end_matches('/').split('/').collect();
    let position = |key: &str| segments.iter().position(|s| *s == key);

    match (position("zones"), position("instances")) {
        (Some(z), Some(i)) if z + 1 < segments.len() && i + 1 < segments.len() => Ok(Instance {
            project: project.to_string(),
            zone: segments[z + 1].to_string(),
            name: segments[i + 1].to_string(),
        }),
        _ => Err(ClusterStageError::malformed(
            url,
            "expected an instance URL with zone and name",
        )),
    }
}
