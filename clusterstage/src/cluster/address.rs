//! Finding a node to talk to.

use crate::errors::Result;
use crate::infra::CloudInventory;
use crate::poll::{Poller, RetryConfig};

/// Returns the public address of one random member of an instance group.
///
/// The group is fetched again on every attempt since its size may change
/// while it scales up. Empty groups, instances without an address yet and
/// failing inventory calls are retried within `retry`.
pub async fn fetch_cluster_node_ip(
    inventory: &dyn CloudInventory,
    poller: &Poller,
    retry: &RetryConfig,
    project: &str,
    region: &str,
    group_name: &str,
) -> Result<String> {
    let description = format!("Waiting for instances in group {group_name}");
    poller
        .run(&description, retry, move || async move {
            let group = inventory
                .fetch_instance_group(project, region, group_name)
                .await?;
            let instance = group.random_instance()?;
            inventory.public_address(instance).await
        })
        .await
}
