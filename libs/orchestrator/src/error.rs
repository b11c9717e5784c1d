//! Error taxonomy for cluster operations.

use thiserror::Error;

use skylift_cloud::CloudError;
use skylift_dns::DnsError;
use skylift_remote::{ConfigureError, RemoteError};
use skylift_topology::TopologyError;

/// Top-level error for any cluster lifecycle operation.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Invalid operator input, caught before any side effect.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provisioning failed: {0}")]
    Provisioning(#[from] CloudError),

    #[error("remote configuration failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("topology persistence failed: {0}")]
    Persistence(#[from] TopologyError),

    #[error("DNS publishing failed: {0}")]
    Dns(#[from] DnsError),

    /// Multiple teardown sub-steps failed; each is listed.
    #[error("teardown completed with {} failure(s): {}", .0.len(), .0.join("; "))]
    PartialTeardown(Vec<String>),
}

impl From<ConfigureError> for ClusterError {
    fn from(err: ConfigureError) -> Self {
        match err {
            ConfigureError::Config(message) => Self::Configuration(message),
            ConfigureError::Remote(remote) => Self::Remote(remote),
        }
    }
}
