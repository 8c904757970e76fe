//! Well-known keys for values handed between stages.

/// GCP project chosen by the build stage.
pub const SAVED_GCP_PROJECT_ID: &str = "GcpProjectId";
/// Region chosen by the build stage.
pub const SAVED_GCP_REGION_NAME: &str = "GcpRegionName";
/// Zone chosen by the build stage.
pub const SAVED_GCP_ZONE_NAME: &str = "GcpZoneName";
/// Image variants the build stage was asked to produce.
pub const SAVED_IMAGE_VARIANTS: &str = "ImageVariants";
/// Artifact of the single-image suite.
pub const SAVED_ARTIFACT_ID: &str = "Artifact";
/// Fully resolved provisioning options of one scenario.
pub const SAVED_PROVISION_OPTIONS: &str = "TerraformOptions";

/// Key under which the image of one build variant is saved.
#[must_use]
pub fn variant_artifact_key(variant: &str) -> String {
    format!("{variant}-id")
}
