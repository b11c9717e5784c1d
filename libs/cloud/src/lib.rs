//! Cloud resource API seam.
//!
//! Everything skylift needs from the provider's resource manager, behind one
//! trait: security-group and firewall-rule CRUD, subnet lookup, static
//! public addressing, network interfaces, disks, VMs, and SSH key assets.
//! Each call is assumed to have already polled its underlying long-running
//! operation to completion; retry and authentication live on the other side
//! of the seam.
//!
//! ## Modules
//!
//! - `api`: the `CloudApi` trait and its request/response types
//! - `rules`: validated firewall-rule model and the default rule sets
//! - `azcli`: production implementation shelling out to the `az` binary
//! - `mock`: in-memory implementation with failure injection, for tests

pub mod api;
pub mod azcli;
pub mod mock;
pub mod rules;

pub use api::{
    CloudApi, CloudError, NicInfo, OsImage, PublicAddress, SshKey, VmDescription, VmRequest,
};
pub use azcli::AzCliCloud;
pub use mock::MockCloud;
pub use rules::{
    default_coordinator_rules, default_worker_rules, Access, Direction, FirewallRule, Protocol,
};
