//! Membership validation.

use std::sync::Arc;
use tracing::info;

use super::status::{ClusterStatusApi, StatusEndpoint};
use crate::errors::{ClusterStageError, Result};
use crate::poll::{Poller, RetryConfig};

/// Checks that a running cluster has exactly the expected members.
#[derive(Clone)]
pub struct ClusterValidator {
    api: Arc<dyn ClusterStatusApi>,
    poller: Poller,
    retry: RetryConfig,
}

impl std::fmt::Debug for ClusterValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterValidator")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ClusterValidator {
    /// Creates a validator polling with [`RetryConfig::cluster_membership`].
    #[must_use]
    pub fn new(api: Arc<dyn ClusterStatusApi>) -> Self {
        Self {
            api,
            poller: Poller::default(),
            retry: RetryConfig::cluster_membership(),
        }
    }

    /// Sets the poller, and with it the event sink.
    #[must_use]
    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = poller;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Performs one check of both counts against the node at `address`.
    ///
    /// Clients are counted through the node list and servers through the
    /// raft peer list. Counts must match exactly: an extra member is as
    /// wrong as a missing one.
    pub async fn check_once(
        &self,
        address: &str,
        expected_servers: usize,
        expected_clients: usize,
    ) -> Result<String> {
        let clients = self.api.member_count(address, StatusEndpoint::Nodes).await?;
        if clients.count != expected_clients {
            return Err(ClusterStageError::count_mismatch(
                StatusEndpoint::Nodes.role(),
                expected_clients,
                clients.count,
            ));
        }

        let servers = self.api.member_count(address, StatusEndpoint::Peers).await?;
        if servers.count != expected_servers {
            return Err(ClusterStageError::count_mismatch(
                StatusEndpoint::Peers.role(),
                expected_servers,
                servers.count,
            ));
        }

        Ok(format!(
            "Got back expected number of clients ({}) and servers ({})",
            clients.count, servers.count
        ))
    }

    /// Polls until one check observes both expected counts.
    ///
    /// Transport failures, malformed bodies and count mismatches are
    /// retried; once the budget is spent the last of them is returned
    /// inside [`ClusterStageError::ConvergenceTimeout`].
    pub async fn validate(
        &self,
        address: &str,
        expected_servers: usize,
        expected_clients: usize,
    ) -> Result<()> {
        let summary = self
            .poller
            .run(
                "Check cluster has expected number of servers and clients",
                &self.retry,
                move || self.check_once(address, expected_servers, expected_clients),
            )
            .await?;
        info!(address, %summary, "Cluster is properly deployed");
        Ok(())
    }
}
