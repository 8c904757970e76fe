//! State store trait and typed helpers.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::keys::{SAVED_ARTIFACT_ID, SAVED_PROVISION_OPTIONS};
use super::Scope;
use crate::core::ArtifactId;
use crate::errors::{ClusterStageError, Result};
use crate::infra::ProvisionOptions;

/// Protocol for state storage backends.
///
/// Values are opaque JSON documents. A value written by one stage must be
/// readable, unmodified, by any later stage in the same scope, including
/// from a process that never performed the write. Values never expire;
/// [`clear_scope`](Self::clear_scope) removes them explicitly.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Saves a value, replacing any previous value for the key.
    async fn save_value(&self, scope: &Scope, key: &str, value: serde_json::Value) -> Result<()>;

    /// Loads a value.
    ///
    /// Fails with [`ClusterStageError::NotFound`] if the key was never
    /// written in this scope.
    async fn load_value(&self, scope: &Scope, key: &str) -> Result<serde_json::Value>;

    /// Returns true if a value exists for the key.
    async fn contains(&self, scope: &Scope, key: &str) -> Result<bool>;

    /// Deletes a value. Deleting a missing key is not an error.
    async fn delete(&self, scope: &Scope, key: &str) -> Result<()>;

    /// Removes every value saved under the scope.
    async fn clear_scope(&self, scope: &Scope) -> Result<()>;
}

/// Typed conveniences over any [`StateStore`].
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Serializes and saves a value.
    async fn save<T>(&self, scope: &Scope, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let value = serde_json::to_value(value)?;
        self.save_value(scope, key, value).await
    }

    /// Loads and deserializes a value.
    async fn load<T>(&self, scope: &Scope, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Send,
    {
        let value = self.load_value(scope, key).await?;
        serde_json::from_value(value).map_err(|e| {
            ClusterStageError::Serialization(format!(
                "value for '{key}' in scope '{scope}' has unexpected shape: {e}"
            ))
        })
    }

    /// Saves a plain string.
    async fn save_string(&self, scope: &Scope, key: &str, value: &str) -> Result<()> {
        self.save(scope, key, value).await
    }

    /// Loads a plain string.
    async fn load_string(&self, scope: &Scope, key: &str) -> Result<String> {
        self.load(scope, key).await
    }

    /// Saves the resolved provisioning options of a scenario.
    async fn save_options(&self, scope: &Scope, options: &ProvisionOptions) -> Result<()> {
        self.save(scope, SAVED_PROVISION_OPTIONS, options).await
    }

    /// Loads the provisioning options saved by [`save_options`](Self::save_options).
    async fn load_options(&self, scope: &Scope) -> Result<ProvisionOptions> {
        self.load(scope, SAVED_PROVISION_OPTIONS).await
    }

    /// Saves the artifact of a single-image suite.
    async fn save_artifact_id(&self, scope: &Scope, id: &ArtifactId) -> Result<()> {
        self.save(scope, SAVED_ARTIFACT_ID, id).await
    }

    /// Loads the artifact of a single-image suite.
    async fn load_artifact_id(&self, scope: &Scope) -> Result<ArtifactId> {
        self.load(scope, SAVED_ARTIFACT_ID).await
    }
}

#[async_trait]
impl<S: StateStore + ?Sized> StateStoreExt for S {}

/// Checks that a key can be used as a file name inside a scope.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(ClusterStageError::Config("state key must not be empty".into()));
    }
    if key == "." || key == ".." || key.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
        return Err(ClusterStageError::Config(format!(
            "state key '{key}' must not contain path separators"
        )));
    }
    Ok(())
}
