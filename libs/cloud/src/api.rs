//! The `CloudApi` trait and its request/response types.

use std::net::IpAddr;

use async_trait::async_trait;
use thiserror::Error;

use crate::rules::FirewallRule;

/// Errors from cloud resource operations.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("invalid firewall rule: {0}")]
    InvalidRule(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{op} failed for {name}: {message}")]
    Operation {
        op: &'static str,
        name: String,
        message: String,
    },
}

impl CloudError {
    pub fn operation(op: &'static str, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Operation {
            op,
            name: name.into(),
            message: message.into(),
        }
    }
}

/// OS image reference for VM creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsImage {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl Default for OsImage {
    /// Ubuntu 22.04 LTS gen2, the distribution every install script targets.
    fn default() -> Self {
        Self {
            publisher: "canonical".to_string(),
            offer: "0001-com-ubuntu-server-jammy".to_string(),
            sku: "22_04-lts-gen2".to_string(),
            version: "latest".to_string(),
        }
    }
}

/// A static public address allocation.
#[derive(Debug, Clone)]
pub struct PublicAddress {
    pub id: String,
    pub address: IpAddr,
}

/// A resolved network interface.
#[derive(Debug, Clone)]
pub struct NicInfo {
    pub id: String,
    pub name: String,
    pub private_address: IpAddr,
    /// Name of the attached public address, if one is bound.
    pub public_address_name: Option<String>,
    /// Name of the attached security group, if one is bound.
    pub security_group_name: Option<String>,
}

/// An SSH public-key asset from the provider's key store.
#[derive(Debug, Clone)]
pub struct SshKey {
    pub name: String,
    pub public_key: String,
}

/// Parameters for VM creation.
///
/// Authentication is always key-based Linux login; password auth is
/// disabled. The OS disk is a fixed 32 GiB StandardSSD created from the
/// image, and the given NIC is the sole primary interface.
#[derive(Debug, Clone)]
pub struct VmRequest {
    pub name: String,
    pub region: String,
    pub instance_size: String,
    pub image: OsImage,
    pub admin_user: String,
    pub ssh_public_key: String,
    pub nic_id: String,
}

impl VmRequest {
    /// OS disk name derived from the VM name, used again at teardown.
    pub fn os_disk_name(&self) -> String {
        format!("{}disk", self.name)
    }
}

/// A VM as seen when resolving it for teardown.
#[derive(Debug, Clone)]
pub struct VmDescription {
    pub name: String,
    pub os_disk_name: String,
    pub nic_name: String,
}

/// Provider resource operations.
///
/// Every method blocks until the underlying long-running operation has
/// completed; implementations own polling, retry, and authentication.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Create-or-update a security group, returning its id.
    async fn ensure_security_group(
        &self,
        resource_group: &str,
        name: &str,
        region: &str,
    ) -> Result<String, CloudError>;

    /// Resolve an existing security group by name, returning its id.
    async fn get_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<String, CloudError>;

    /// Create-or-update one firewall rule on a group.
    async fn apply_rule(
        &self,
        resource_group: &str,
        group_name: &str,
        rule: &FirewallRule,
    ) -> Result<(), CloudError>;

    async fn delete_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError>;

    /// Resolve a subnet by (resource group, vnet, subnet), returning its id.
    async fn get_subnet(
        &self,
        vnet_resource_group: &str,
        vnet_name: &str,
        subnet_name: &str,
    ) -> Result<String, CloudError>;

    /// Allocate a new static public address.
    async fn create_public_address(
        &self,
        resource_group: &str,
        name: &str,
        region: &str,
    ) -> Result<PublicAddress, CloudError>;

    async fn delete_public_address(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError>;

    /// Create a network interface bound to subnet, public address, and group.
    async fn create_network_interface(
        &self,
        resource_group: &str,
        name: &str,
        region: &str,
        subnet_id: &str,
        public_address_id: &str,
        security_group_id: &str,
    ) -> Result<String, CloudError>;

    async fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NicInfo, CloudError>;

    async fn delete_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError>;

    /// Resolve an SSH public-key asset from the provider key store.
    async fn get_ssh_key(&self, resource_group: &str, name: &str) -> Result<SshKey, CloudError>;

    async fn create_vm(&self, resource_group: &str, request: &VmRequest)
        -> Result<(), CloudError>;

    /// Resolve a VM's dependent resource names for teardown.
    async fn describe_vm(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VmDescription, CloudError>;

    async fn power_off_vm(&self, resource_group: &str, name: &str) -> Result<(), CloudError>;

    async fn delete_vm(&self, resource_group: &str, name: &str) -> Result<(), CloudError>;

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<(), CloudError>;

    /// Private address of the VM's primary NIC.
    async fn get_private_address(
        &self,
        resource_group: &str,
        vm_name: &str,
    ) -> Result<IpAddr, CloudError>;
}
