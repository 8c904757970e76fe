//! Scenario composition.
//!
//! A suite builds its images once, runs every scenario shape against every
//! image as an independent unit, then deletes the images. Each unit is a
//! sequential `deploy -> validate` pipeline with `teardown` registered for
//! guaranteed execution before anything is provisioned.
//!
//! ```text
//! build_images ──► ┌ colocated × ubuntu16-image ┐
//!                  │ colocated × ubuntu18-image │ ──► delete_images
//!                  │ separate  × ubuntu16-image │
//!                  └ separate  × ubuntu18-image ┘
//! ```

mod combined;
mod context;
mod matrix;
mod separate;
mod stages;
mod suite;
mod topology;
pub mod vars;

#[cfg(test)]
mod integration_tests;

use serde::{Deserialize, Serialize};

pub use combined::combined_options;
pub use context::{Collaborators, ImageSource, Location, ScenarioContext, ScenarioEnv, SCENARIO_SCOPE_DIR};
pub use matrix::{MatrixReport, ScenarioMatrix, UnitReport};
pub use separate::separate_options;
pub use stages::{deploy, run_scenario, teardown, validate};
pub use suite::Suite;
pub use topology::{
    unique_suffix, validate_resource_name, ClusterTopology, ScenarioKind, MAX_RESOURCE_NAME_LEN,
    UNIQUE_SUFFIX_LEN,
};

/// Builds one image per variant.
pub const BUILD_IMAGES: &str = "build_images";
/// Deletes every image recorded by [`BUILD_IMAGES`].
pub const DELETE_IMAGES: &str = "delete_images";
/// Builds the single image of a single-image suite.
pub const BUILD_IMAGE: &str = "build_image";
/// Deletes the image recorded by [`BUILD_IMAGE`].
pub const DELETE_IMAGE: &str = "delete_image";
/// Provisions one scenario's clusters.
pub const DEPLOY: &str = "deploy";
/// Checks cluster membership.
pub const VALIDATE: &str = "validate";
/// Destroys one scenario's clusters.
pub const TEARDOWN: &str = "teardown";

/// How many images a suite builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteMode {
    /// One image shared by every scenario, saved as the suite artifact.
    SingleImage,
    /// One image per build name; every scenario runs against each.
    #[default]
    MultiVariant,
}

impl SuiteMode {
    /// Name of the stage that builds images in this mode.
    #[must_use]
    pub fn build_stage(self) -> &'static str {
        match self {
            Self::SingleImage => BUILD_IMAGE,
            Self::MultiVariant => BUILD_IMAGES,
        }
    }

    /// Name of the stage that deletes images in this mode.
    #[must_use]
    pub fn delete_stage(self) -> &'static str {
        match self {
            Self::SingleImage => DELETE_IMAGE,
            Self::MultiVariant => DELETE_IMAGES,
        }
    }
}

impl std::str::FromStr for SuiteMode {
    type Err = crate::errors::ClusterStageError;

    fn from_str(s: &str) -> crate::errors::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "single_image" | "single" => Ok(Self::SingleImage),
            "multi_variant" | "multi" => Ok(Self::MultiVariant),
            other => Err(crate::errors::ClusterStageError::Config(format!(
                "unknown suite mode '{other}', expected 'single_image' or 'multi_variant'"
            ))),
        }
    }
}
