//! Cluster topology records.
//!
//! A topology is the durable description of one live cluster: the node set
//! (one coordinator, zero or more workers) plus the security groups those
//! nodes were attached to. It is written once by a successful create and is
//! the source of truth for every later lifecycle operation, including the
//! final teardown.
//!
//! ## Modules
//!
//! - `store`: plain-text persistence (`TopologyStore` trait + `FileStore`)

use std::net::IpAddr;

pub mod store;

pub use store::{FileStore, TopologyError, TopologyStore};

/// Role a node plays in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// The single control-plane node ("driver"/"master" in naming).
    Coordinator,
    /// One of N nodes joining the coordinator.
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coordinator => "coordinator",
            Self::Worker => "worker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "coordinator" => Some(Self::Coordinator),
            "worker" => Some(Self::Worker),
            _ => None,
        }
    }
}

/// One provisioned node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// VM name, unique within the cluster.
    pub name: String,
    /// Public address attached to the node.
    pub address: IpAddr,
    /// Login user for remote configuration.
    pub user: String,
    pub role: NodeRole,
}

impl NodeRecord {
    /// Numeric suffix of a worker name (`demo-worker-3` -> 3).
    ///
    /// Returns `None` for coordinator nodes or names without a trailing
    /// `-<n>` segment.
    pub fn worker_index(&self) -> Option<u32> {
        if self.role != NodeRole::Worker {
            return None;
        }
        self.name.rsplit('-').next()?.parse().ok()
    }
}

/// Which half of the cluster a security group fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupScope {
    CoordinatorGroup,
    WorkerGroup,
}

impl GroupScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoordinatorGroup => "coordinator",
            Self::WorkerGroup => "worker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "coordinator" => Some(Self::CoordinatorGroup),
            "worker" => Some(Self::WorkerGroup),
            _ => None,
        }
    }
}

/// A security group recorded for later teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupRecord {
    pub name: String,
    pub scope: GroupScope,
}

/// The persisted aggregate for one cluster instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterTopology {
    pub nodes: Vec<NodeRecord>,
    pub security_groups: Vec<SecurityGroupRecord>,
}

impl ClusterTopology {
    /// The coordinator record, if one was persisted.
    pub fn coordinator(&self) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.role == NodeRole::Coordinator)
    }

    /// All worker records, in persisted order.
    pub fn workers(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.iter().filter(|n| n.role == NodeRole::Worker)
    }
}
