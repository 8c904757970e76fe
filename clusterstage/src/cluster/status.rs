//! The cluster's HTTP status API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{ClusterStageError, MemberRole, Result};

/// Port the scheduler's HTTP API listens on.
pub const DEFAULT_STATUS_PORT: u16 = 4646;

/// A membership endpoint of the status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEndpoint {
    /// `v1/nodes`: one entry per registered client node.
    Nodes,
    /// `v1/status/peers`: one entry per raft peer, i.e. per server.
    Peers,
}

impl StatusEndpoint {
    /// Path below the API root, without a leading slash.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Nodes => "v1/nodes",
            Self::Peers => "v1/status/peers",
        }
    }

    /// The member role this endpoint counts.
    #[must_use]
    pub fn role(self) -> MemberRole {
        match self {
            Self::Nodes => MemberRole::Client,
            Self::Peers => MemberRole::Server,
        }
    }

    /// Builds the endpoint URL for a node.
    #[must_use]
    pub fn url(self, address: &str, port: u16) -> String {
        format!("http://{address}:{port}/{}", self.path())
    }
}

/// The only datum consumed from a membership endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCount {
    /// Number of entries in the returned array.
    pub count: usize,
}

impl MemberCount {
    /// Parses a response body that must be a JSON array at the top level.
    ///
    /// Anything else is reported as [`ClusterStageError::MalformedResponse`].
    pub fn from_body(url: &str, body: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ClusterStageError::malformed(url, format!("invalid JSON: {e}")))?;
        match value {
            serde_json::Value::Array(items) => Ok(Self { count: items.len() }),
            other => Err(ClusterStageError::malformed(
                url,
                format!("expected a JSON array, found {}", json_kind(&other)),
            )),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Read access to a running cluster's membership.
#[async_trait]
pub trait ClusterStatusApi: Send + Sync {
    /// Counts the members an endpoint reports.
    async fn member_count(&self, address: &str, endpoint: StatusEndpoint) -> Result<MemberCount>;
}

#[cfg(feature = "http")]
pub use http::HttpClusterStatusClient;

#[cfg(feature = "http")]
mod http {
    use async_trait::async_trait;
    use std::time::Duration;
    use tracing::debug;

    use super::{ClusterStatusApi, MemberCount, StatusEndpoint, DEFAULT_STATUS_PORT};
    use crate::errors::{ClusterStageError, Result};

    /// [`ClusterStatusApi`] over plain HTTP GET.
    #[derive(Debug, Clone)]
    pub struct HttpClusterStatusClient {
        client: reqwest::Client,
        port: u16,
    }

    impl HttpClusterStatusClient {
        /// Creates a client with the given per-request timeout.
        pub fn new(timeout: Duration) -> Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ClusterStageError::Config(format!("failed to build HTTP client: {e}")))?;
            Ok(Self {
                client,
                port: DEFAULT_STATUS_PORT,
            })
        }

        /// Targets a different API port.
        #[must_use]
        pub fn with_port(mut self, port: u16) -> Self {
            self.port = port;
            self
        }
    }

    #[async_trait]
    impl ClusterStatusApi for HttpClusterStatusClient {
        async fn member_count(
            &self,
            address: &str,
            endpoint: StatusEndpoint,
        ) -> Result<MemberCount> {
            let url = endpoint.url(address, self.port);
            debug!(url = %url, "Making an HTTP GET");

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ClusterStageError::transport(&url, e.to_string()))?;

            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|e| ClusterStageError::transport(&url, e.to_string()))?;
            debug!(url = %url, status = %status, body = %String::from_utf8_lossy(&body), "Status API response");

            if !status.is_success() {
                return Err(ClusterStageError::transport(
                    &url,
                    format!("HTTP {status}: {}", String::from_utf8_lossy(&body).trim()),
                ));
            }

            MemberCount::from_body(&url, &body)
        }
    }
}
