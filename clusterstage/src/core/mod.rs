//! Core domain model types for clusterstage.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage status enum and per-run stage records
//! - Built machine-image artifacts

mod artifact;
mod record;
mod status;

pub use artifact::{ArtifactId, ProvisionedArtifact};
pub use record::{StageOutcome, StageRecord};
pub use status::StageStatus;
