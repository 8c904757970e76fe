//! Scenario shapes and resource naming.

use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::errors::{ClusterStageError, Result};

/// Length of generated unique suffixes.
pub const UNIQUE_SUFFIX_LEN: usize = 6;

/// Longest resource name the provider accepts.
pub const MAX_RESOURCE_NAME_LEN: usize = 63;

/// How servers and clients are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    /// One resource group; servers and clients share infrastructure.
    Colocated,
    /// Dedicated server and client groups, sized independently.
    Separate,
}

impl ScenarioKind {
    /// Stable name used in scopes, logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Colocated => "colocated",
            Self::Separate => "separate",
        }
    }

    /// Module directory relative to the infrastructure root.
    #[must_use]
    pub fn module_subdir(self) -> &'static str {
        match self {
            Self::Colocated => ".",
            Self::Separate => "examples/nomad-consul-separate-cluster",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScenarioKind {
    type Err = ClusterStageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "colocated" => Ok(Self::Colocated),
            "separate" => Ok(Self::Separate),
            other => Err(ClusterStageError::Config(format!(
                "unknown scenario '{other}', expected 'colocated' or 'separate'"
            ))),
        }
    }
}

/// The shape of one scenario instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTopology {
    /// Servers to run (at least one).
    pub server_count: usize,
    /// Clients to run.
    pub client_count: usize,
    /// Whether servers and clients share one resource group.
    pub colocated: bool,
    /// Lowercase suffix that keeps this instance's resource names apart
    /// from every other instance sharing the project.
    pub unique_suffix: String,
}

impl ClusterTopology {
    /// Creates a topology with a fresh suffix.
    pub fn new(kind: ScenarioKind, server_count: usize, client_count: usize) -> Result<Self> {
        Self::with_suffix(kind, server_count, client_count, unique_suffix())
    }

    /// Creates a topology with the given suffix.
    pub fn with_suffix(
        kind: ScenarioKind,
        server_count: usize,
        client_count: usize,
        unique_suffix: impl Into<String>,
    ) -> Result<Self> {
        if server_count == 0 {
            return Err(ClusterStageError::Config(
                "a cluster needs at least one server".into(),
            ));
        }
        let unique_suffix = unique_suffix.into();
        if unique_suffix.is_empty()
            || !unique_suffix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(ClusterStageError::InvalidName {
                name: unique_suffix,
                reason: "suffix must be lowercase alphanumeric".into(),
            });
        }
        Ok(Self {
            server_count,
            client_count,
            colocated: kind == ScenarioKind::Colocated,
            unique_suffix,
        })
    }

    /// Derives a resource name, `<prefix>-<suffix>`, and checks it.
    pub fn resource_name(&self, prefix: &str) -> Result<String> {
        let name = format!("{prefix}-{}", self.unique_suffix);
        validate_resource_name(&name)?;
        Ok(name)
    }
}

/// Generates a lowercase alphanumeric suffix.
#[must_use]
pub fn unique_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UNIQUE_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

fn name_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$"))
        .as_ref()
        .map_err(|e| ClusterStageError::Config(format!("invalid resource name pattern: {e}")))
}

/// Checks a name against the provider's resource naming rules.
pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.len() > MAX_RESOURCE_NAME_LEN {
        return Err(ClusterStageError::InvalidName {
            name: name.to_string(),
            reason: format!("longer than {MAX_RESOURCE_NAME_LEN} characters"),
        });
    }
    if !name_pattern()?.is_match(name) {
        return Err(ClusterStageError::InvalidName {
            name: name.to_string(),
            reason: "must start with a lowercase letter and contain only lowercase letters, digits and hyphens, not ending in a hyphen".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_scenario_kind_parses_its_own_name() {
        for kind in [ScenarioKind::Colocated, ScenarioKind::Separate] {
            assert_eq!(kind.as_str().parse::<ScenarioKind>().unwrap(), kind);
        }
        assert!(" Separate ".parse::<ScenarioKind>().is_ok());
        assert_eq!("mixed".parse::<ScenarioKind>().unwrap_err().kind(), "config");
    }

    #[test]
    fn test_unique_suffix_shape() {
        for _ in 0..50 {
            let suffix = unique_suffix();
            assert_eq!(suffix.len(), UNIQUE_SUFFIX_LEN);
            assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_suffixes_rarely_collide() {
        let suffixes: HashSet<String> = (0..200).map(|_| unique_suffix()).collect();
        assert!(suffixes.len() > 195);
    }

    #[test]
    fn test_resource_names() {
        let topology =
            ClusterTopology::with_suffix(ScenarioKind::Separate, 3, 2, "ab12cd").unwrap();
        assert_eq!(topology.resource_name("nomad-server").unwrap(), "nomad-server-ab12cd");
        assert!(!topology.colocated);
    }

    #[test]
    fn test_validate_resource_name() {
        assert!(validate_resource_name("nomad-client-x9y8z7").is_ok());
        assert!(validate_resource_name("Nomad-client").is_err());
        assert!(validate_resource_name("1nomad").is_err());
        assert!(validate_resource_name("nomad-").is_err());
        assert!(validate_resource_name("nomad_client").is_err());
        assert!(validate_resource_name(&"a".repeat(64)).is_err());
        assert!(validate_resource_name(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn test_topology_rejects_bad_input() {
        assert!(ClusterTopology::with_suffix(ScenarioKind::Colocated, 0, 2, "ab12cd").is_err());
        let err = ClusterTopology::with_suffix(ScenarioKind::Colocated, 3, 2, "AB12").unwrap_err();
        assert_eq!(err.kind(), "invalid_name");
    }
}
