//! Skip configuration for stages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Prefix of the environment toggles that skip a stage.
pub const SKIP_ENV_PREFIX: &str = "SKIP_";

/// Which stages to skip in this run.
///
/// The runner only looks at this map; where the flags come from (process
/// environment, CLI, a test) is up to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name to skip flag.
    #[serde(default)]
    pub skip: HashMap<String, bool>,
}

impl StageConfig {
    /// Creates a config that runs every stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a stage as skipped.
    #[must_use]
    pub fn with_skip(mut self, stage: impl Into<String>) -> Self {
        self.skip.insert(stage.into(), true);
        self
    }

    /// Sets the skip flag for a stage.
    pub fn set_skip(&mut self, stage: impl Into<String>, skip: bool) {
        self.skip.insert(stage.into(), skip);
    }

    /// Returns true if the stage is skipped.
    #[must_use]
    pub fn is_skipped(&self, stage: &str) -> bool {
        self.skip.get(stage).copied().unwrap_or(false)
    }

    /// Returns the names of skipped stages, sorted.
    #[must_use]
    pub fn skipped_stages(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .skip
            .iter()
            .filter(|(_, skip)| **skip)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Builds a config from `SKIP_<stage-name>` entries.
    ///
    /// Empty values, `0` and `false` leave the stage enabled; anything else
    /// skips it.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::new();
        for (key, value) in vars {
            if let Some(stage) = key.as_ref().strip_prefix(SKIP_ENV_PREFIX) {
                if stage.is_empty() {
                    continue;
                }
                config.set_skip(stage, parse_toggle(value.as_ref()));
            }
        }
        config
    }

    /// Builds a config from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Layers another config on top of this one; its flags win.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.skip.extend(other.skip);
        self
    }
}

fn parse_toggle(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}
