//! Stage status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage ended.
///
/// A skipped stage is not a failure: it means an earlier or later
/// invocation owns that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The work ran and returned success.
    Ok,
    /// A skip toggle was set; the work never ran.
    Skip,
    /// The work returned an error or panicked.
    Fail,
}

impl StageStatus {
    /// Lowercase name, as written to reports and events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skip => "skip",
            Self::Fail => "fail",
        }
    }

    /// Returns true unless the stage failed.
    #[must_use]
    pub fn is_success(self) -> bool {
        !self.is_failure()
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(self) -> bool {
        self == Self::Fail
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_counts_as_success() {
        assert!(StageStatus::Ok.is_success());
        assert!(StageStatus::Skip.is_success());
        assert!(StageStatus::Fail.is_failure());
        assert!(!StageStatus::Skip.is_failure());
    }

    #[test]
    fn test_wire_names_match_display() {
        for status in [StageStatus::Ok, StageStatus::Skip, StageStatus::Fail] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{status}\""));
            assert_eq!(serde_json::from_str::<StageStatus>(&json).unwrap(), status);
        }
    }
}
