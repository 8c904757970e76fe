//! Infrastructure provisioning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::command::{run_command, CommandSpec};
use crate::errors::{ClusterStageError, Result};

/// A declarative module directory plus the variables to apply it with.
///
/// This is the bundle the deploy stage persists so that teardown, possibly
/// in another process, can destroy exactly what was applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionOptions {
    /// The module directory.
    pub dir: PathBuf,
    /// Input variables, ordered by name.
    #[serde(default)]
    pub vars: BTreeMap<String, serde_json::Value>,
}

impl ProvisionOptions {
    /// Creates options for a module directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            vars: BTreeMap::new(),
        }
    }

    /// Sets an input variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Returns a variable as a string, if set to one.
    #[must_use]
    pub fn var_str(&self, name: &str) -> Option<&str> {
        self.vars.get(name).and_then(serde_json::Value::as_str)
    }

    /// Renders the variables as `-var name=value` arguments.
    #[must_use]
    pub fn var_args(&self) -> Vec<String> {
        self.vars
            .iter()
            .flat_map(|(name, value)| {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                ["-var".to_string(), format!("{name}={rendered}")]
            })
            .collect()
    }
}

/// Outputs reported by a successful apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisionOutputs(BTreeMap<String, serde_json::Value>);

impl ProvisionOutputs {
    /// Creates an empty output set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an output.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Returns a raw output value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Returns a string output, failing if it is missing or not a string.
    pub fn required_str(&self, name: &str) -> Result<String> {
        self.0
            .get(name)
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                ClusterStageError::provisioning("output", format!("missing string output '{name}'"))
            })
    }

    /// Parses `terraform output -json`, which wraps every value as
    /// `{"value": ..., "type": ..., "sensitive": ...}`.
    pub fn from_terraform_json(raw: &str) -> Result<Self> {
        let parsed: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
        Ok(Self(
            parsed
                .into_iter()
                .map(|(name, mut wrapped)| {
                    let value = wrapped
                        .get_mut("value")
                        .map(serde_json::Value::take)
                        .unwrap_or(wrapped);
                    (name, value)
                })
                .collect(),
        ))
    }
}

/// The infrastructure-as-code collaborator.
///
/// Provisioning failures are never retried here; whatever semantics the
/// underlying tool has are the only ones that apply.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Makes a private working copy of `module` at `dest` and returns it.
    ///
    /// If `dest` already exists it is reused as is, so a later process
    /// picks up the state left by an earlier apply.
    async fn prepare_dir(&self, module: &Path, dest: &Path) -> Result<PathBuf>;

    /// Creates or updates the resources and returns the module's outputs.
    async fn apply(&self, options: &ProvisionOptions) -> Result<ProvisionOutputs>;

    /// Reads a single string output of an applied module.
    async fn output(&self, options: &ProvisionOptions, name: &str) -> Result<String>;

    /// Destroys everything the module created.
    async fn destroy(&self, options: &ProvisionOptions) -> Result<()>;
}

/// [`Provisioner`] backed by the `terraform` binary.
#[derive(Debug, Clone)]
pub struct TerraformProvisioner {
    binary: String,
}

impl Default for TerraformProvisioner {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
        }
    }
}

impl TerraformProvisioner {
    /// Creates a provisioner using `terraform` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a specific terraform binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self, options: &ProvisionOptions) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .current_dir(&options.dir)
            .env("TF_IN_AUTOMATION", "1")
    }

    async fn run(&self, operation: &str, spec: CommandSpec) -> Result<String> {
        run_command(&spec).await.map_err(|e| match e {
            ClusterStageError::Command { stderr, .. } => {
                ClusterStageError::provisioning(operation, stderr)
            }
            other => other,
        })
    }
}

#[async_trait]
impl Provisioner for TerraformProvisioner {
    async fn prepare_dir(&self, module: &Path, dest: &Path) -> Result<PathBuf> {
        copy_module_dir(module, dest).await?;
        Ok(dest.to_path_buf())
    }

    async fn apply(&self, options: &ProvisionOptions) -> Result<ProvisionOutputs> {
        info!(dir = %options.dir.display(), "Running terraform init and apply");
        self.run("init", self.command(options).args(["init", "-input=false"]))
            .await?;
        self.run(
            "apply",
            self.command(options)
                .args(["apply", "-auto-approve", "-input=false"])
                .args(options.var_args()),
        )
        .await?;

        let raw = self
            .run("output", self.command(options).args(["output", "-json"]))
            .await?;
        ProvisionOutputs::from_terraform_json(&raw)
    }

    async fn output(&self, options: &ProvisionOptions, name: &str) -> Result<String> {
        let raw = self
            .run("output", self.command(options).args(["output", "-raw", name]))
            .await?;
        Ok(raw.trim().to_string())
    }

    async fn destroy(&self, options: &ProvisionOptions) -> Result<()> {
        info!(dir = %options.dir.display(), "Running terraform destroy");
        self.run(
            "destroy",
            self.command(options)
                .args(["destroy", "-auto-approve", "-input=false"])
                .args(options.var_args()),
        )
        .await?;
        Ok(())
    }
}

/// Recursively copies a module directory, leaving out hidden entries
/// (`.terraform`, `.git`, saved test data, local state caches).
///
/// Does nothing if `dest` already exists.
pub async fn copy_module_dir(source: &Path, dest: &Path) -> Result<()> {
    if tokio::fs::try_exists(dest).await? {
        debug!(dest = %dest.display(), "Reusing existing module copy");
        return Ok(());
    }

    let mut pending = vec![(source.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        tokio::fs::create_dir_all(&to).await?;
        let mut entries = tokio::fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let target = to.join(&name);
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                tokio::fs::copy(entry.path(), target).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_var_args_render_strings_bare() {
        let options = ProvisionOptions::new("/tmp/module")
            .with_var("gcp_project", "my-project")
            .with_var("nomad_client_cluster_size", 2);

        assert_eq!(
            options.var_args(),
            vec![
                "-var",
                "gcp_project=my-project",
                "-var",
                "nomad_client_cluster_size=2",
            ]
        );
        assert_eq!(options.var_str("gcp_project"), Some("my-project"));
        assert_eq!(options.var_str("nomad_client_cluster_size"), None);
    }

    #[test]
    fn test_options_survive_json() {
        let options = ProvisionOptions::new("/tmp/module").with_var("gcp_zone", "us-east1-b");
        let value = serde_json::to_value(&options).unwrap();
        let back: ProvisionOptions = serde_json::from_value(value).unwrap();
        assert_eq!(back, options);
    }

    #[test]
    fn test_outputs_from_terraform_json() {
        let raw = r#"{
            "nomad_server_instance_group_name": {
                "sensitive": false,
                "type": "string",
                "value": "nomad-server-ab12cd"
            }
        }"#;
        let outputs = ProvisionOutputs::from_terraform_json(raw).unwrap();
        assert_eq!(
            outputs.required_str("nomad_server_instance_group_name").unwrap(),
            "nomad-server-ab12cd"
        );
        assert_eq!(outputs.required_str("missing").unwrap_err().kind(), "provisioning");
    }

    #[tokio::test]
    async fn test_copy_module_dir_skips_hidden_and_reuses() {
        let source = tempfile::tempdir().unwrap();
        let dest_root = tempfile::tempdir().unwrap();
        let dest = dest_root.path().join("module");

        std::fs::write(source.path().join("main.tf"), "# main").unwrap();
        std::fs::create_dir_all(source.path().join("modules/cluster")).unwrap();
        std::fs::write(source.path().join("modules/cluster/vars.tf"), "# vars").unwrap();
        std::fs::create_dir_all(source.path().join(".terraform")).unwrap();
        std::fs::write(source.path().join(".terraform/state"), "x").unwrap();

        copy_module_dir(source.path(), &dest).await.unwrap();

        assert!(dest.join("main.tf").exists());
        assert!(dest.join("modules/cluster/vars.tf").exists());
        assert!(!dest.join(".terraform").exists());

        std::fs::write(source.path().join("late.tf"), "# late").unwrap();
        copy_module_dir(source.path(), &dest).await.unwrap();
        assert!(!dest.join("late.tf").exists());
    }
}
