//! Namespaces for persisted values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A directory-like namespace under which values are keyed.
///
/// Two scenarios running side by side must use distinct scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(PathBuf);

impl Scope {
    /// Creates a scope rooted at the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(dir.into())
    }

    /// Returns a child scope nested under this one.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        Self(self.0.join(name))
    }

    /// Returns the scope directory.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl From<&str> for Scope {
    fn from(dir: &str) -> Self {
        Self::new(dir)
    }
}

impl From<PathBuf> for Scope {
    fn from(dir: PathBuf) -> Self {
        Self(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_scope() {
        let root = Scope::new("/tmp/work");
        let child = root.child("colocated-ubuntu16-image-ab12cd");
        assert_eq!(
            child.as_path(),
            Path::new("/tmp/work/colocated-ubuntu16-image-ab12cd")
        );
        assert_ne!(root, child);
    }
}
