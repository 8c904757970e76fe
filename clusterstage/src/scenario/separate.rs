//! Separate scenario: dedicated Nomad servers, Consul servers and clients.

use std::path::PathBuf;

use super::context::Location;
use super::topology::ClusterTopology;
use super::vars::{
    TFVAR_CONSUL_SERVER_CLUSTER_NAME, TFVAR_CONSUL_SERVER_SOURCE_IMAGE, TFVAR_GCP_PROJECT_ID,
    TFVAR_GCP_REGION, TFVAR_GCP_ZONE, TFVAR_NOMAD_CLIENT_CLUSTER_NAME,
    TFVAR_NOMAD_CLIENT_CLUSTER_SIZE, TFVAR_NOMAD_CLIENT_SOURCE_IMAGE,
    TFVAR_NOMAD_SERVER_CLUSTER_NAME, TFVAR_NOMAD_SERVER_CLUSTER_SIZE,
    TFVAR_NOMAD_SERVER_SOURCE_IMAGE,
};
use crate::core::ArtifactId;
use crate::errors::Result;
use crate::infra::ProvisionOptions;

/// Resolves the module variables of a separate-cluster deployment.
///
/// Server and client groups are sized independently from the topology.
pub fn separate_options(
    dir: impl Into<PathBuf>,
    location: &Location,
    image: &ArtifactId,
    topology: &ClusterTopology,
) -> Result<ProvisionOptions> {
    Ok(ProvisionOptions::new(dir)
        .with_var(TFVAR_GCP_PROJECT_ID, location.project.as_str())
        .with_var(TFVAR_GCP_REGION, location.region.as_str())
        .with_var(TFVAR_GCP_ZONE, location.zone.as_str())
        .with_var(TFVAR_NOMAD_SERVER_CLUSTER_NAME, topology.resource_name("nomad-server")?)
        .with_var(TFVAR_NOMAD_SERVER_SOURCE_IMAGE, image.as_str())
        .with_var(TFVAR_NOMAD_SERVER_CLUSTER_SIZE, topology.server_count)
        .with_var(TFVAR_CONSUL_SERVER_CLUSTER_NAME, topology.resource_name("consul-server")?)
        .with_var(TFVAR_CONSUL_SERVER_SOURCE_IMAGE, image.as_str())
        .with_var(TFVAR_NOMAD_CLIENT_CLUSTER_NAME, topology.resource_name("nomad-client")?)
        .with_var(TFVAR_NOMAD_CLIENT_SOURCE_IMAGE, image.as_str())
        .with_var(TFVAR_NOMAD_CLIENT_CLUSTER_SIZE, topology.client_count))
}
