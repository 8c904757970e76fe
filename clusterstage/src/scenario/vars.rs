//! Input variable and output names of the infrastructure modules.

/// Module variable `gcp_project`.
pub const TFVAR_GCP_PROJECT_ID: &str = "gcp_project";
/// Module variable `gcp_region`.
pub const TFVAR_GCP_REGION: &str = "gcp_region";
/// Module variable `gcp_zone`.
pub const TFVAR_GCP_ZONE: &str = "gcp_zone";

/// Module variable `nomad_consul_server_cluster_name`.
pub const TFVAR_NOMAD_CONSUL_SERVER_CLUSTER_NAME: &str = "nomad_consul_server_cluster_name";
/// Module variable `nomad_consul_server_source_image`.
pub const TFVAR_NOMAD_CONSUL_SERVER_SOURCE_IMAGE: &str = "nomad_consul_server_source_image";
/// Module variable `nomad_consul_server_cluster_size`.
pub const TFVAR_NOMAD_CONSUL_SERVER_CLUSTER_SIZE: &str = "nomad_consul_server_cluster_size";

/// Module variable `nomad_client_cluster_name`.
pub const TFVAR_NOMAD_CLIENT_CLUSTER_NAME: &str = "nomad_client_cluster_name";
/// Module variable `nomad_client_source_image`.
pub const TFVAR_NOMAD_CLIENT_SOURCE_IMAGE: &str = "nomad_client_source_image";
/// Module variable `nomad_client_cluster_size`.
pub const TFVAR_NOMAD_CLIENT_CLUSTER_SIZE: &str = "nomad_client_cluster_size";

/// Module variable `nomad_server_cluster_name`.
pub const TFVAR_NOMAD_SERVER_CLUSTER_NAME: &str = "nomad_server_cluster_name";
/// Module variable `nomad_server_source_image`.
pub const TFVAR_NOMAD_SERVER_SOURCE_IMAGE: &str = "nomad_server_source_image";
/// Module variable `nomad_server_cluster_size`.
pub const TFVAR_NOMAD_SERVER_CLUSTER_SIZE: &str = "nomad_server_cluster_size";

/// Module variable `consul_server_cluster_name`.
pub const TFVAR_CONSUL_SERVER_CLUSTER_NAME: &str = "consul_server_cluster_name";
/// Module variable `consul_server_source_image`.
pub const TFVAR_CONSUL_SERVER_SOURCE_IMAGE: &str = "consul_server_source_image";

/// Output naming the instance group whose members run the servers.
pub const TFOUT_SERVER_INSTANCE_GROUP_NAME: &str = "nomad_server_instance_group_name";

/// Template variable `project_id`.
pub const PACKER_VAR_PROJECT_ID: &str = "project_id";
/// Template variable `zone`.
pub const PACKER_VAR_ZONE: &str = "zone";
