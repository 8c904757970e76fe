//! External collaborators: provisioning, image builds and cloud inventory.
//!
//! Each collaborator is a trait so scenarios can run against fakes in tests.
//! The command-backed implementations shell out to `terraform`, `packer`
//! and `gcloud` through [`run_command`].

mod command;
mod image;
mod inventory;
mod provision;

pub use command::{non_empty_lines, run_command, CommandSpec};
pub use image::{parse_artifact_id, ImageBuildOptions, ImageBuilder, ImageHandle, PackerImageBuilder};
#[cfg(test)]
pub use inventory::MockCloudInventory;
pub use inventory::{
    choose_random, project_from_vars, CloudInventory, GcloudInventory, Instance, InstanceGroup,
    PROJECT_ENV_VARS,
};
pub use provision::{
    copy_module_dir, ProvisionOptions, ProvisionOutputs, Provisioner, TerraformProvisioner,
};
