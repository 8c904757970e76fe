//! Suite configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.
//! Loading order:
//! 1. defaults, or a JSON file
//! 2. `CLUSTERSTAGE_*` environment overrides
//! 3. command-line flags, applied by the binary

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::cluster::DEFAULT_STATUS_PORT;
use crate::errors::{ClusterStageError, Result};
use crate::poll::RetryConfig;
use crate::scenario::{ScenarioKind, SuiteMode};

/// Prefix of the environment overrides.
pub const ENV_PREFIX: &str = "CLUSTERSTAGE_";

/// Settings shared by every scenario of a suite run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Directory whose scope holds suite-wide values (location, image ids).
    pub work_dir: PathBuf,
    /// Image build template.
    pub image_template: PathBuf,
    /// Root of the infrastructure modules.
    pub terraform_root: PathBuf,
    /// Image variants to build, one per build name in the template.
    pub build_names: Vec<String>,
    /// Regions tests may run in.
    pub allowed_regions: Vec<String>,
    /// Server members per cluster.
    pub num_servers: usize,
    /// Client members per cluster.
    pub num_clients: usize,
    /// Budget for finding a node's public address.
    pub address_poll: RetryConfig,
    /// Budget for cluster membership to converge.
    pub cluster_poll: RetryConfig,
    /// Port of the cluster's HTTP API.
    pub status_port: u16,
    /// Per-request timeout of status API calls.
    pub http_timeout_secs: u64,
    /// Scenario shapes to run.
    pub scenarios: Vec<ScenarioKind>,
    /// Whether to build one shared image or one image per variant.
    pub mode: SuiteMode,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("./"),
            image_template: PathBuf::from("../examples/nomad-consul-image/nomad-consul.json"),
            terraform_root: PathBuf::from("../"),
            build_names: vec!["ubuntu16-image".to_string(), "ubuntu18-image".to_string()],
            // Limited to one region because of the quota on in-use IP addresses.
            allowed_regions: vec!["us-east1".to_string()],
            num_servers: 3,
            num_clients: 2,
            address_poll: RetryConfig::instance_address(),
            cluster_poll: RetryConfig::cluster_membership(),
            status_port: DEFAULT_STATUS_PORT,
            http_timeout_secs: 10,
            scenarios: vec![ScenarioKind::Colocated, ScenarioKind::Separate],
            mode: SuiteMode::MultiVariant,
        }
    }
}

impl SuiteConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClusterStageError::Config(format!("invalid suite config: {e}")))
    }

    /// Reads a JSON config file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ClusterStageError::Config(format!("config file not found: {}", path.display()))
            } else {
                ClusterStageError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// Defaults with the process environment applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(std::env::vars());
        config
    }

    /// Applies `CLUSTERSTAGE_*` overrides.
    ///
    /// Values that do not parse are logged and ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| {
                k.as_ref()
                    .strip_prefix(ENV_PREFIX)
                    .map(|name| (name.to_string(), v.as_ref().to_string()))
            })
            .collect();
        let get = |name: &str| vars.get(name).map(String::as_str);

        override_path(&mut self.work_dir, get("WORK_DIR"));
        override_path(&mut self.image_template, get("IMAGE_TEMPLATE"));
        override_path(&mut self.terraform_root, get("TERRAFORM_ROOT"));
        override_csv(&mut self.build_names, get("BUILD_NAMES"));
        override_csv(&mut self.allowed_regions, get("ALLOWED_REGIONS"));
        override_parsed(&mut self.num_servers, "NUM_SERVERS", get("NUM_SERVERS"));
        override_parsed(&mut self.num_clients, "NUM_CLIENTS", get("NUM_CLIENTS"));
        override_parsed(&mut self.status_port, "STATUS_PORT", get("STATUS_PORT"));
        override_parsed(
            &mut self.http_timeout_secs,
            "HTTP_TIMEOUT_SECS",
            get("HTTP_TIMEOUT_SECS"),
        );
        override_parsed(
            &mut self.cluster_poll.max_attempts,
            "CLUSTER_POLL_ATTEMPTS",
            get("CLUSTER_POLL_ATTEMPTS"),
        );
        override_parsed(
            &mut self.cluster_poll.interval_ms,
            "CLUSTER_POLL_INTERVAL_MS",
            get("CLUSTER_POLL_INTERVAL_MS"),
        );
        override_parsed(
            &mut self.address_poll.max_attempts,
            "ADDRESS_POLL_ATTEMPTS",
            get("ADDRESS_POLL_ATTEMPTS"),
        );
        override_parsed(
            &mut self.address_poll.interval_ms,
            "ADDRESS_POLL_INTERVAL_MS",
            get("ADDRESS_POLL_INTERVAL_MS"),
        );
    }

    /// Per-request timeout of status API calls.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Checks the config is usable.
    pub fn validate(&self) -> Result<()> {
        if self.num_servers == 0 {
            return Err(ClusterStageError::Config(
                "num_servers must be at least 1".into(),
            ));
        }
        if self.mode == SuiteMode::MultiVariant && self.build_names.is_empty() {
            return Err(ClusterStageError::Config(
                "build_names must not be empty".into(),
            ));
        }
        if self.scenarios.is_empty() {
            return Err(ClusterStageError::Config(
                "at least one scenario must be selected".into(),
            ));
        }
        self.address_poll.validate()?;
        self.cluster_poll.validate()?;
        Ok(())
    }
}

fn override_path(target: &mut PathBuf, value: Option<&str>) {
    if let Some(val) = value.filter(|v| !v.trim().is_empty()) {
        *target = PathBuf::from(val.trim());
    }
}

fn override_csv(target: &mut Vec<String>, value: Option<&str>) {
    if let Some(val) = value {
        *target = val
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, name: &str, value: Option<&str>) {
    if let Some(val) = value {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key = %format!("{ENV_PREFIX}{name}"),
                value = val,
                "failed to parse env override, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SuiteConfig::default();
        assert_eq!(config.num_servers, 3);
        assert_eq!(config.num_clients, 2);
        assert_eq!(config.status_port, 4646);
        assert_eq!(config.build_names, vec!["ubuntu16-image", "ubuntu18-image"]);
        assert_eq!(config.allowed_regions, vec!["us-east1"]);
        assert_eq!(config.address_poll.max_attempts, 10);
        assert_eq!(config.cluster_poll.max_attempts, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_object_uses_defaults() {
        assert_eq!(SuiteConfig::parse("{}").unwrap(), SuiteConfig::default());
    }

    #[test]
    fn test_parse_partial() {
        let config = SuiteConfig::parse(
            r#"{"num_clients": 4, "scenarios": ["separate"], "mode": "single_image"}"#,
        )
        .unwrap();
        assert_eq!(config.num_clients, 4);
        assert_eq!(config.num_servers, 3);
        assert_eq!(config.scenarios, vec![ScenarioKind::Separate]);
        assert_eq!(config.mode, SuiteMode::SingleImage);
    }

    #[test]
    fn test_parse_partial_poll_block() {
        let config =
            SuiteConfig::parse(r#"{"cluster_poll": {"max_attempts": 5, "interval_ms": 100}}"#)
                .unwrap();
        assert_eq!(config.cluster_poll.max_attempts, 5);
        assert_eq!(config.cluster_poll.interval_ms, 100);
        assert_eq!(
            config.cluster_poll.max_interval_ms,
            RetryConfig::default().max_interval_ms
        );
        assert_eq!(config.address_poll, RetryConfig::instance_address());
    }

    #[test]
    fn test_parse_invalid() {
        let err = SuiteConfig::parse(r#"{"num_servers": "three"}"#).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SuiteConfig::default();
        config.apply_overrides([
            ("CLUSTERSTAGE_NUM_SERVERS", "5"),
            ("CLUSTERSTAGE_BUILD_NAMES", "ubuntu18-image, "),
            ("CLUSTERSTAGE_WORK_DIR", "/tmp/run"),
            ("CLUSTERSTAGE_CLUSTER_POLL_INTERVAL_MS", "250"),
            ("CLUSTERSTAGE_NUM_CLIENTS", "many"),
            ("NUM_CLIENTS", "9"),
        ]);

        assert_eq!(config.num_servers, 5);
        assert_eq!(config.num_clients, 2);
        assert_eq!(config.build_names, vec!["ubuntu18-image"]);
        assert_eq!(config.work_dir, PathBuf::from("/tmp/run"));
        assert_eq!(config.cluster_poll.interval_ms, 250);
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = SuiteConfig::default();
        config.num_servers = 0;
        assert!(config.validate().is_err());

        let mut config = SuiteConfig::default();
        config.build_names.clear();
        assert!(config.validate().is_err());
        config.mode = SuiteMode::SingleImage;
        assert!(config.validate().is_ok());

        let mut config = SuiteConfig::default();
        config.cluster_poll.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.json");
        std::fs::write(&path, r#"{"allowed_regions": ["us-east1", "us-west1"]}"#).unwrap();

        let config = SuiteConfig::from_file(&path).await.unwrap();
        assert_eq!(config.allowed_regions.len(), 2);

        let err = SuiteConfig::from_file(dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
