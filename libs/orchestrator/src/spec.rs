//! Validated cluster description.
//!
//! `ClusterSpec` captures everything a create needs up front, and every
//! derived resource name lives here so create and delete agree on them.

use skylift_cloud::{FirewallRule, OsImage};

use crate::error::ClusterError;

/// Inputs for creating a cluster.
///
/// Optional fields fall back to their coordinator-side or resource-group
/// counterparts; see the accessor methods.
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    /// Base name; every resource name is derived from it.
    pub name: String,
    pub worker_count: u32,
    pub coordinator_size: String,
    /// Worker VM size; defaults to `coordinator_size`.
    pub worker_size: Option<String>,
    pub resource_group: String,
    /// Resource group holding the vnet; defaults to `resource_group`.
    pub vnet_resource_group: Option<String>,
    pub vnet_name: String,
    pub subnet_name: String,
    /// Name of the SSH public-key asset in the provider key store.
    pub ssh_key_name: String,
    pub region: String,
    pub coordinator_user: String,
    /// Worker login user; defaults to `coordinator_user`.
    pub worker_user: Option<String>,
    /// Caller's public address, used as the source prefix of default rules.
    pub caller_ip: String,
    /// Pre-existing coordinator security group to reuse instead of creating one.
    pub coordinator_group: Option<String>,
    /// Pre-existing worker security group; must be set together with
    /// `coordinator_group`.
    pub worker_group: Option<String>,
    pub image: OsImage,
    /// Explicit coordinator rules; defaults to the standard set.
    pub coordinator_rules: Option<Vec<FirewallRule>>,
    /// Explicit worker rules; defaults to the standard set.
    pub worker_rules: Option<Vec<FirewallRule>>,
}

impl ClusterSpec {
    /// Reject inconsistent input before any cloud call is made.
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.name.is_empty() {
            return Err(ClusterError::Configuration(
                "cluster name is empty".to_string(),
            ));
        }
        if self.resource_group.is_empty() {
            return Err(ClusterError::Configuration(
                "resource group is empty".to_string(),
            ));
        }
        if self.region.is_empty() {
            return Err(ClusterError::Configuration("region is empty".to_string()));
        }
        if self.coordinator_user.is_empty() {
            return Err(ClusterError::Configuration(
                "coordinator user is empty".to_string(),
            ));
        }
        if self.caller_ip.is_empty() {
            return Err(ClusterError::Configuration(
                "caller public address is empty".to_string(),
            ));
        }
        // Reusing groups is all-or-nothing: one half of the pair alone would
        // leave the other half created with a derived name, and delete would
        // then sweep a group the operator expected to keep.
        if self.coordinator_group.is_some() != self.worker_group.is_some() {
            return Err(ClusterError::Configuration(
                "coordinator and worker security groups must be provided together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn worker_size(&self) -> &str {
        self.worker_size.as_deref().unwrap_or(&self.coordinator_size)
    }

    pub fn vnet_resource_group(&self) -> &str {
        self.vnet_resource_group
            .as_deref()
            .unwrap_or(&self.resource_group)
    }

    pub fn worker_user(&self) -> &str {
        self.worker_user.as_deref().unwrap_or(&self.coordinator_user)
    }

    /// Whether the security groups pre-exist and must survive delete.
    pub fn reuses_groups(&self) -> bool {
        self.coordinator_group.is_some()
    }

    pub fn coordinator_name(&self) -> String {
        format!("{}-master", self.name)
    }

    pub fn worker_name(&self, index: u32) -> String {
        format!("{}-worker-{}", self.name, index)
    }

    pub fn coordinator_group_name(&self) -> String {
        self.coordinator_group
            .clone()
            .unwrap_or_else(|| format!("{}-sg-coordinator", self.name))
    }

    pub fn worker_group_name(&self) -> String {
        self.worker_group
            .clone()
            .unwrap_or_else(|| format!("{}-sg-worker", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn spec() -> ClusterSpec {
        ClusterSpec {
            name: "demo".to_string(),
            worker_count: 2,
            coordinator_size: "Standard_B2s".to_string(),
            worker_size: None,
            resource_group: "rg".to_string(),
            vnet_resource_group: None,
            vnet_name: "vnet".to_string(),
            subnet_name: "subnet".to_string(),
            ssh_key_name: "ops-key".to_string(),
            region: "westeurope".to_string(),
            coordinator_user: "azureuser".to_string(),
            worker_user: None,
            caller_ip: "203.0.113.7".to_string(),
            coordinator_group: None,
            worker_group: None,
            image: OsImage::default(),
            coordinator_rules: None,
            worker_rules: None,
        }
    }

    #[test]
    fn test_defaults_fall_back_to_coordinator_side() {
        let s = spec();
        assert_eq!(s.worker_size(), "Standard_B2s");
        assert_eq!(s.worker_user(), "azureuser");
        assert_eq!(s.vnet_resource_group(), "rg");
    }

    #[test]
    fn test_derived_names() {
        let s = spec();
        assert_eq!(s.coordinator_name(), "demo-master");
        assert_eq!(s.worker_name(3), "demo-worker-3");
        assert_eq!(s.coordinator_group_name(), "demo-sg-coordinator");
        assert_eq!(s.worker_group_name(), "demo-sg-worker");
    }

    #[test]
    fn test_one_sided_group_pair_is_rejected() {
        let mut s = spec();
        s.coordinator_group = Some("existing-sg".to_string());
        let err = s.validate().unwrap_err();
        assert!(matches!(err, ClusterError::Configuration(_)));

        s.worker_group = Some("existing-worker-sg".to_string());
        assert!(s.validate().is_ok());
        assert_eq!(s.coordinator_group_name(), "existing-sg");
    }

    #[rstest]
    #[case::name(|s: &mut ClusterSpec| s.name.clear())]
    #[case::resource_group(|s: &mut ClusterSpec| s.resource_group.clear())]
    #[case::region(|s: &mut ClusterSpec| s.region.clear())]
    #[case::user(|s: &mut ClusterSpec| s.coordinator_user.clear())]
    #[case::caller_ip(|s: &mut ClusterSpec| s.caller_ip.clear())]
    fn test_empty_required_field_is_rejected(#[case] blank: fn(&mut ClusterSpec)) {
        let mut s = spec();
        blank(&mut s);
        assert!(matches!(
            s.validate(),
            Err(ClusterError::Configuration(_))
        ));
    }
}
