//! Filesystem-backed state store.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

use super::store::validate_key;
use super::{Scope, StateStore};
use crate::errors::{ClusterStageError, Result};

/// Default directory, inside each scope, that holds saved values.
pub const DEFAULT_DATA_DIR: &str = ".test-data";

/// A state store that keeps each value as a JSON file inside its scope.
///
/// Layout: `<scope>/<data dir>/<key>.json`. Writes go to a temporary file
/// first and are renamed into place, so a reader in another process never
/// sees a half-written value.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    data_dir: String,
}

impl Default for FileStateStore {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
        }
    }
}

impl FileStateStore {
    /// Creates a file store using the default data directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different data directory name inside each scope.
    #[must_use]
    pub fn with_data_dir(mut self, name: impl Into<String>) -> Self {
        self.data_dir = name.into();
        self
    }

    fn scope_dir(&self, scope: &Scope) -> PathBuf {
        scope.as_path().join(&self.data_dir)
    }

    /// Returns the file a key is stored in.
    pub fn value_path(&self, scope: &Scope, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.scope_dir(scope).join(format!("{key}.json")))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save_value(&self, scope: &Scope, key: &str, value: serde_json::Value) -> Result<()> {
        let path = self.value_path(scope, key)?;
        tokio::fs::create_dir_all(self.scope_dir(scope)).await?;

        let bytes = serde_json::to_vec_pretty(&value)?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(scope = %scope, key = %key, path = %path.display(), "Saved value");
        Ok(())
    }

    async fn load_value(&self, scope: &Scope, key: &str) -> Result<serde_json::Value> {
        let path = self.value_path(scope, key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ClusterStageError::not_found(scope.to_string(), key));
            }
            Err(e) => return Err(e.into()),
        };

        debug!(scope = %scope, key = %key, path = %path.display(), "Loaded value");
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn contains(&self, scope: &Scope, key: &str) -> Result<bool> {
        let path = self.value_path(scope, key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, scope: &Scope, key: &str) -> Result<()> {
        let path = self.value_path(scope, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_scope(&self, scope: &Scope) -> Result<()> {
        match tokio::fs::remove_dir_all(self.scope_dir(scope)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
