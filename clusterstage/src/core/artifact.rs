//! Built machine-image artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque provider-assigned image identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Wraps a provider identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ArtifactId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ArtifactId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One built image together with the build variant that produced it.
///
/// Created by the build stage, consumed by deploy, destroyed by the delete
/// stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedArtifact {
    /// Provider-assigned identifier.
    pub id: ArtifactId,
    /// The build name the image came from (e.g. `ubuntu18-image`).
    pub variant_key: String,
}

impl ProvisionedArtifact {
    /// Creates a new artifact record.
    #[must_use]
    pub fn new(id: impl Into<ArtifactId>, variant_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            variant_key: variant_key.into(),
        }
    }
}
