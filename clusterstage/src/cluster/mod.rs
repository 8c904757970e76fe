//! Cluster validation.
//!
//! A freshly provisioned cluster converges over time: members boot, join
//! gossip and elect a raft leader. The [`ClusterValidator`] reads the
//! cluster's membership endpoints through the convergence poller and only
//! passes once a single read sees exactly the expected servers and clients.

mod address;
mod status;
mod validator;

pub use address::fetch_cluster_node_ip;
#[cfg(feature = "http")]
pub use status::HttpClusterStatusClient;
pub use status::{ClusterStatusApi, MemberCount, StatusEndpoint, DEFAULT_STATUS_PORT};
pub use validator::ClusterValidator;
