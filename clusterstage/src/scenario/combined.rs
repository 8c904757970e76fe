//! Colocated scenario: servers and clients from one image, one module.

use std::path::PathBuf;

use super::context::Location;
use super::topology::ClusterTopology;
use super::vars::{
    TFVAR_GCP_PROJECT_ID, TFVAR_GCP_REGION, TFVAR_GCP_ZONE, TFVAR_NOMAD_CLIENT_CLUSTER_NAME,
    TFVAR_NOMAD_CLIENT_CLUSTER_SIZE, TFVAR_NOMAD_CLIENT_SOURCE_IMAGE,
    TFVAR_NOMAD_CONSUL_SERVER_CLUSTER_NAME, TFVAR_NOMAD_CONSUL_SERVER_CLUSTER_SIZE,
    TFVAR_NOMAD_CONSUL_SERVER_SOURCE_IMAGE,
};
use crate::core::ArtifactId;
use crate::errors::Result;
use crate::infra::ProvisionOptions;

/// Resolves the module variables of a colocated cluster.
pub fn combined_options(
    dir: impl Into<PathBuf>,
    location: &Location,
    image: &ArtifactId,
    topology: &ClusterTopology,
) -> Result<ProvisionOptions> {
    Ok(ProvisionOptions::new(dir)
        .with_var(TFVAR_GCP_PROJECT_ID, location.project.as_str())
        .with_var(TFVAR_GCP_REGION, location.region.as_str())
        .with_var(TFVAR_GCP_ZONE, location.zone.as_str())
        .with_var(
            TFVAR_NOMAD_CONSUL_SERVER_CLUSTER_NAME,
            topology.resource_name("nomad-consul")?,
        )
        .with_var(TFVAR_NOMAD_CONSUL_SERVER_SOURCE_IMAGE, image.as_str())
        .with_var(TFVAR_NOMAD_CONSUL_SERVER_CLUSTER_SIZE, topology.server_count)
        .with_var(TFVAR_NOMAD_CLIENT_CLUSTER_NAME, topology.resource_name("nomad-client")?)
        .with_var(TFVAR_NOMAD_CLIENT_SOURCE_IMAGE, image.as_str())
        .with_var(TFVAR_NOMAD_CLIENT_CLUSTER_SIZE, topology.client_count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_combined_options() {
        let location = Location {
            project: "my-project".into(),
            region: "us-east1".into(),
            zone: "us-east1-c".into(),
        };
        let topology =
            ClusterTopology::with_suffix(ScenarioKind::Colocated, 3, 2, "k3x9qa").unwrap();

        let options =
            combined_options("/tmp/module", &location, &ArtifactId::new("img-16"), &topology)
                .unwrap();

        assert_eq!(options.var_str("gcp_project"), Some("my-project"));
        assert_eq!(
            options.var_str("nomad_consul_server_cluster_name"),
            Some("nomad-consul-k3x9qa")
        );
        assert_eq!(options.var_str("nomad_client_cluster_name"), Some("nomad-client-k3x9qa"));
        assert_eq!(options.var_str("nomad_client_source_image"), Some("img-16"));
        assert_eq!(
            options.vars.get("nomad_consul_server_cluster_size"),
            Some(&serde_json::json!(3))
        );
        assert_eq!(options.dir, PathBuf::from("/tmp/module"));
    }
}
