//! Cluster lifecycle orchestration.
//!
//! Ties the cloud, topology, remote, and DNS crates together into the
//! operations an operator actually runs: create a cluster, configure it,
//! start it, publish its records, and tear it all down again.
//!
//! ## Modules
//!
//! - `spec`: validated cluster description and the names derived from it
//! - `provision`: per-node resource chain and teardown over `CloudApi`
//! - `cluster`: the `ClusterOrchestrator` driving whole-cluster operations
//! - `error`: the `ClusterError` taxonomy

pub mod cluster;
pub mod error;
pub mod provision;
pub mod spec;

pub use cluster::{ClusterOrchestrator, CreateReport, SettleDelays};
pub use error::ClusterError;
pub use provision::{NodeOutcome, NodeParams, NodeProvisioner};
pub use spec::ClusterSpec;
