//! In-memory state store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::store::validate_key;
use super::{Scope, StateStore};
use crate::errors::{ClusterStageError, Result};

/// A state store that lives only as long as the process.
///
/// Suitable when every stage of a suite runs in one invocation, and for
/// tests. Clones share the same underlying map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateStore {
    entries: Arc<DashMap<(Scope, String), serde_json::Value>>,
}

impl InMemoryStateStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries across all scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the keys saved under a scope, sorted.
    #[must_use]
    pub fn keys(&self, scope: &Scope) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| &entry.key().0 == scope)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save_value(&self, scope: &Scope, key: &str, value: serde_json::Value) -> Result<()> {
        validate_key(key)?;
        self.entries.insert((scope.clone(), key.to_string()), value);
        Ok(())
    }

    async fn load_value(&self, scope: &Scope, key: &str) -> Result<serde_json::Value> {
        validate_key(key)?;
        self.entries
            .get(&(scope.clone(), key.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClusterStageError::not_found(scope.to_string(), key))
    }

    async fn contains(&self, scope: &Scope, key: &str) -> Result<bool> {
        validate_key(key)?;
        Ok(self.entries.contains_key(&(scope.clone(), key.to_string())))
    }

    async fn delete(&self, scope: &Scope, key: &str) -> Result<()> {
        validate_key(key)?;
        self.entries.remove(&(scope.clone(), key.to_string()));
        Ok(())
    }

    async fn clear_scope(&self, scope: &Scope) -> Result<()> {
        self.entries.retain(|(s, _), _| s != scope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStoreExt;

    #[tokio::test]
    async fn test_round_trip_and_not_found() {
        let store = InMemoryStateStore::new();
        let scope = Scope::new("/work");

        store.save_string(&scope, "GcpProjectId", "proj-1").await.unwrap();
        assert_eq!(store.load_string(&scope, "GcpProjectId").await.unwrap(), "proj-1");

        let err = store.load_string(&scope, "GcpZoneName").await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_structured_value_round_trip() {
        let store = InMemoryStateStore::new();
        let scope = Scope::new("/work");
        let variants = vec!["ubuntu16-image".to_string(), "ubuntu18-image".to_string()];

        store.save(&scope, "ImageVariants", &variants).await.unwrap();
        let loaded: Vec<String> = store.load(&scope, "ImageVariants").await.unwrap();
        assert_eq!(loaded, variants);
    }

    #[tokio::test]
    async fn test_wrong_shape_is_serialization_error() {
        let store = InMemoryStateStore::new();
        let scope = Scope::new("/work");

        store.save_string(&scope, "k", "text").await.unwrap();
        let err = store.load::<Vec<u32>>(&scope, "k").await.unwrap_err();
        assert_eq!(err.kind(), "serialization");
    }

    #[tokio::test]
    async fn test_clear_scope_leaves_other_scopes() {
        let store = InMemoryStateStore::new();
        let a = Scope::new("/a");
        let b = Scope::new("/b");

        store.save_string(&a, "x", "1").await.unwrap();
        store.save_string(&b, "x", "2").await.unwrap();
        store.clear_scope(&a).await.unwrap();

        assert!(store.keys(&a).is_empty());
        assert_eq!(store.keys(&b), vec!["x".to_string()]);
        assert_eq!(store.len(), 1);
    }
}
