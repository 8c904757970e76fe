//! Machine-image builds.

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::info;

use super::command::{run_command, CommandSpec};
use crate::core::ArtifactId;
use crate::errors::{ClusterStageError, Result};

/// Inputs to one image build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuildOptions {
    /// The build template.
    pub template: PathBuf,
    /// Restricts the build to one named builder.
    #[serde(default)]
    pub only: Option<String>,
    /// Template variables.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

impl ImageBuildOptions {
    /// Creates options for a template.
    #[must_use]
    pub fn new(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            only: None,
            vars: BTreeMap::new(),
        }
    }

    /// Restricts the build to one builder.
    #[must_use]
    pub fn only(mut self, build_name: impl Into<String>) -> Self {
        self.only = Some(build_name.into());
        self
    }

    /// Sets a template variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

/// A built image that exists in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    /// The owning project.
    pub project: String,
    /// The image identifier.
    pub id: ArtifactId,
}

/// The machine-image build collaborator.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    /// Builds one image and returns its identifier.
    async fn build(&self, options: &ImageBuildOptions) -> Result<ArtifactId>;

    /// Builds several images concurrently, one per build name.
    ///
    /// Every build runs to completion; the result for each name is reported
    /// separately so the caller can record the images that did get built.
    async fn build_all(
        &self,
        options: &BTreeMap<String, ImageBuildOptions>,
    ) -> BTreeMap<String, Result<ArtifactId>> {
        let builds = options.iter().map(|(name, opts)| async move {
            info!(variant = %name, "Building image");
            (name.clone(), self.build(opts).await)
        });
        join_all(builds).await.into_iter().collect()
    }

    /// Looks up an existing image.
    async fn fetch_image(&self, project: &str, id: &ArtifactId) -> Result<ImageHandle>;

    /// Deletes an image.
    async fn delete_image(&self, handle: &ImageHandle) -> Result<()>;
}

/// [`ImageBuilder`] backed by `packer`, with image lookup and deletion
/// through `gcloud`.
#[derive(Debug, Clone)]
pub struct PackerImageBuilder {
    packer: String,
    gcloud: String,
}

impl Default for PackerImageBuilder {
    fn default() -> Self {
        Self {
            packer: "packer".to_string(),
            gcloud: "gcloud".to_string(),
        }
    }
}

impl PackerImageBuilder {
    /// Creates a builder using `packer` and `gcloud` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses specific binaries.
    #[must_use]
    pub fn with_binaries(mut self, packer: impl Into<String>, gcloud: impl Into<String>) -> Self {
        self.packer = packer.into();
        self.gcloud = gcloud.into();
        self
    }

    fn build_command(&self, options: &ImageBuildOptions) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.packer).args(["build", "-machine-readable"]);
        if let Some(only) = &options.only {
            spec = spec.arg(format!("-only={only}"));
        }
        for (name, value) in &options.vars {
            spec = spec.arg("-var").arg(format!("{name}={value}"));
        }
        spec.arg(options.template.display().to_string())
    }
}

#[async_trait]
impl ImageBuilder for PackerImageBuilder {
    async fn build(&self, options: &ImageBuildOptions) -> Result<ArtifactId> {
        let stdout = run_command(&self.build_command(options))
            .await
            .map_err(|e| ClusterStageError::provisioning("build", e.to_string()))?;
        parse_artifact_id(&stdout).ok_or_else(|| {
            ClusterStageError::provisioning(
                "build",
                format!(
                    "no artifact id in output of {}",
                    options.template.display()
                ),
            )
        })
    }

    async fn fetch_image(&self, project: &str, id: &ArtifactId) -> Result<ImageHandle> {
        let spec = CommandSpec::new(&self.gcloud).args([
            "compute",
            "images",
            "describe",
            id.as_str(),
            "--project",
            project,
            "--format=value(name)",
        ]);
        let name = run_command(&spec).await?;
        if name.trim().is_empty() {
            return Err(ClusterStageError::provisioning(
                "fetch_image",
                format!("image '{id}' not found in project '{project}'"),
            ));
        }
        Ok(ImageHandle {
            project: project.to_string(),
            id: id.clone(),
        })
    }

    async fn delete_image(&self, handle: &ImageHandle) -> Result<()> {
        info!(image = %handle.id, project = %handle.project, "Deleting image");
        let spec = CommandSpec::new(&self.gcloud).args([
            "compute",
            "images",
            "delete",
            handle.id.as_str(),
            "--project",
            handle.project.as_str(),
            "--quiet",
        ]);
        run_command(&spec)
            .await
            .map_err(|e| ClusterStageError::provisioning("delete_image", e.to_string()))?;
        Ok(())
    }
}

fn artifact_line() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"artifact,\d+,id,(.+)").ok())
        .as_ref()
}

/// Extracts the image id from `packer build -machine-readable` output.
///
/// For multi-region builders the id is `region:id`; only the id is kept.
#[must_use]
pub fn parse_artifact_id(stdout: &str) -> Option<ArtifactId> {
    let pattern = artifact_line()?;
    stdout
        .lines()
        .filter_map(|line| pattern.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .last()
        .map(|raw| raw.rsplit(':').next().unwrap_or(raw))
        .filter(|id| !id.is_empty())
        .map(ArtifactId::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_artifact_id() {
        let stdout = "\
1563291022,,ui,say,==> googlecompute: Creating image...
1563291150,googlecompute,artifact-count,1
1563291150,googlecompute,artifact,0,builder-id,packer.googlecompute
1563291150,googlecompute,artifact,0,id,nomad-consul-ubuntu16-1563291022
1563291150,googlecompute,artifact,0,end
";
        assert_eq!(
            parse_artifact_id(stdout),
            Some(ArtifactId::new("nomad-consul-ubuntu16-1563291022"))
        );
    }

    #[test]
    fn test_parse_artifact_id_missing() {
        assert_eq!(parse_artifact_id("1563291022,,ui,error,Build failed"), None);
    }

    #[test]
    fn test_parse_artifact_id_strips_region() {
        let stdout = "1,amazon-ebs,artifact,0,id,us-east-1:ami-0123";
        assert_eq!(parse_artifact_id(stdout), Some(ArtifactId::new("ami-0123")));
    }

    #[test]
    fn test_build_command() {
        let options = ImageBuildOptions::new("../examples/nomad-consul-image/nomad-consul.json")
            .only("ubuntu16-image")
            .with_var("project_id", "my-project")
            .with_var("zone", "us-east1-b");
        let spec = PackerImageBuilder::new().build_command(&options);
        assert_eq!(
            spec.display(),
            "packer build -machine-readable -only=ubuntu16-image \
             -var project_id=my-project -var zone=us-east1-b \
             ../examples/nomad-consul-image/nomad-consul.json"
        );
    }
}
