//! Per-node provisioning and teardown over the cloud API.
//!
//! Provisioning walks the resource chain for one node: security group,
//! firewall rules, subnet, static public address, network interface, SSH
//! key, VM. A failed node yields a failure sentinel instead of an error so
//! a batch always reports every sibling's outcome. Teardown is best-effort
//! and accumulates sub-step failures rather than stopping at the first one.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{error, info, warn};

use skylift_cloud::{CloudApi, CloudError, FirewallRule, OsImage, VmRequest};

/// Upper bound on concurrently provisioning nodes.
const DEFAULT_FAN_OUT: usize = 4;

/// Everything needed to provision one node.
#[derive(Debug, Clone)]
pub struct NodeParams {
    pub name: String,
    pub resource_group: String,
    pub region: String,
    pub vnet_resource_group: String,
    pub vnet_name: String,
    pub subnet_name: String,
    pub ssh_key_name: String,
    pub instance_size: String,
    pub admin_user: String,
    pub image: OsImage,
    /// Security group the node's NIC attaches to.
    pub group_name: String,
    /// The group belongs to the caller: resolve it read-only instead of
    /// create-or-update, and never touch its rules.
    pub reuse_group: bool,
    /// Rules ensured on the group before the node is built.
    pub rules: Vec<FirewallRule>,
}

impl NodeParams {
    pub fn public_address_name(&self) -> String {
        format!("{}-ip", self.name)
    }

    pub fn nic_name(&self) -> String {
        format!("{}-nic", self.name)
    }
}

/// Result of provisioning one node.
///
/// `ok = false` marks a failure sentinel: the node's name is known but no
/// usable address exists and no partial cleanup has been attempted.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub ok: bool,
    pub name: String,
    pub address: Option<IpAddr>,
}

/// Builds and tears down single nodes against a `CloudApi`.
pub struct NodeProvisioner {
    cloud: Arc<dyn CloudApi>,
    fan_out: usize,
}

impl NodeProvisioner {
    pub fn new(cloud: Arc<dyn CloudApi>) -> Self {
        Self {
            cloud,
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    /// Override the worker fan-out bound.
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    /// Provision one node end to end.
    ///
    /// Individual rule failures are logged and skipped; any other step
    /// failure aborts this node and yields `ok = false`.
    pub async fn provision_node(&self, params: &NodeParams) -> NodeOutcome {
        match self.provision_inner(params).await {
            Ok(address) => {
                info!(node = %params.name, address = %address, "Node provisioned");
                NodeOutcome {
                    ok: true,
                    name: params.name.clone(),
                    address: Some(address),
                }
            }
            Err(err) => {
                error!(node = %params.name, error = %err, "Node provisioning failed");
                NodeOutcome {
                    ok: false,
                    name: params.name.clone(),
                    address: None,
                }
            }
        }
    }

    async fn provision_inner(&self, params: &NodeParams) -> Result<IpAddr, CloudError> {
        let rg = &params.resource_group;

        let group_id = if params.reuse_group {
            self.cloud.get_security_group(rg, &params.group_name).await?
        } else {
            self.cloud
                .ensure_security_group(rg, &params.group_name, &params.region)
                .await?
        };
        for rule in &params.rules {
            if let Err(err) = self.cloud.apply_rule(rg, &params.group_name, rule).await {
                warn!(
                    group = %params.group_name,
                    rule = %rule.name,
                    error = %err,
                    "Firewall rule not applied"
                );
            }
        }

        let subnet_id = self
            .cloud
            .get_subnet(
                &params.vnet_resource_group,
                &params.vnet_name,
                &params.subnet_name,
            )
            .await?;

        let public = self
            .cloud
            .create_public_address(rg, &params.public_address_name(), &params.region)
            .await?;

        let nic_id = self
            .cloud
            .create_network_interface(
                rg,
                &params.nic_name(),
                &params.region,
                &subnet_id,
                &public.id,
                &group_id,
            )
            .await?;

        let key = self.cloud.get_ssh_key(rg, &params.ssh_key_name).await?;

        let request = VmRequest {
            name: params.name.clone(),
            region: params.region.clone(),
            instance_size: params.instance_size.clone(),
            image: params.image.clone(),
            admin_user: params.admin_user.clone(),
            ssh_public_key: key.public_key,
            nic_id,
        };
        self.cloud.create_vm(rg, &request).await?;

        Ok(public.address)
    }

    /// Provision a batch of nodes with bounded concurrency.
    ///
    /// Returns the batch flag (true iff every node succeeded) and one
    /// outcome per requested node, in request order. A failed sibling never
    /// cancels in-flight nodes.
    pub async fn provision_workers(&self, nodes: Vec<NodeParams>) -> (bool, Vec<NodeOutcome>) {
        let mut indexed: Vec<(usize, NodeOutcome)> = stream::iter(nodes.into_iter().enumerate())
            .map(|(index, params)| async move { (index, self.provision_node(&params).await) })
            .buffer_unordered(self.fan_out)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let outcomes: Vec<NodeOutcome> = indexed.into_iter().map(|(_, o)| o).collect();
        let ok = outcomes.iter().all(|o| o.ok);
        (ok, outcomes)
    }

    /// Tear down one node and everything hanging off it, best-effort.
    ///
    /// Order: power off, VM, NIC, OS disk, public address, then the node's
    /// security group unless it appears in `retained_groups` (groups shared
    /// by several nodes are swept once by the caller instead). Sub-step
    /// failures are logged and returned, never raised.
    pub async fn teardown_node(
        &self,
        resource_group: &str,
        name: &str,
        retained_groups: &HashSet<String>,
    ) -> Vec<String> {
        let mut failures = Vec::new();
        let rg = resource_group;

        // Resolve dependent resource names while the VM and NIC still exist;
        // fall back to the provisioning conventions if they are already gone.
        let described = match self.cloud.describe_vm(rg, name).await {
            Ok(description) => Some(description),
            Err(err) => {
                warn!(node = %name, error = %err, "VM not resolvable, using derived names");
                None
            }
        };
        let nic_name = described
            .as_ref()
            .map(|d| d.nic_name.clone())
            .unwrap_or_else(|| format!("{}-nic", name));
        let os_disk_name = described
            .as_ref()
            .map(|d| d.os_disk_name.clone())
            .unwrap_or_else(|| format!("{}disk", name));

        let nic = self.cloud.get_network_interface(rg, &nic_name).await.ok();
        let public_address_name = nic
            .as_ref()
            .and_then(|n| n.public_address_name.clone())
            .unwrap_or_else(|| format!("{}-ip", name));
        let group_name = nic.as_ref().and_then(|n| n.security_group_name.clone());

        if described.is_some() {
            if let Err(err) = self.cloud.power_off_vm(rg, name).await {
                warn!(node = %name, error = %err, "Power off failed");
                failures.push(format!("power off {}: {}", name, err));
            }
            if let Err(err) = self.cloud.delete_vm(rg, name).await {
                failures.push(format!("delete vm {}: {}", name, err));
            }
        }

        if let Err(err) = self.cloud.delete_network_interface(rg, &nic_name).await {
            failures.push(format!("delete nic {}: {}", nic_name, err));
        }
        if let Err(err) = self.cloud.delete_disk(rg, &os_disk_name).await {
            failures.push(format!("delete disk {}: {}", os_disk_name, err));
        }
        if let Err(err) = self.cloud.delete_public_address(rg, &public_address_name).await {
            failures.push(format!("delete public address {}: {}", public_address_name, err));
        }

        if let Some(group) = group_name {
            if retained_groups.contains(&group) {
                info!(node = %name, group = %group, "Security group retained");
            } else if let Some(failure) = self.teardown_security_group(rg, &group).await {
                failures.push(failure);
            }
        }

        if failures.is_empty() {
            info!(node = %name, "Node torn down");
        } else {
            warn!(node = %name, failures = failures.len(), "Node teardown incomplete");
        }
        failures
    }

    /// Delete one security group; the failure is logged and returned.
    pub async fn teardown_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Option<String> {
        match self.cloud.delete_security_group(resource_group, name).await {
            Ok(()) => {
                info!(group = %name, "Security group deleted");
                None
            }
            Err(err) => {
                warn!(group = %name, error = %err, "Security group delete failed");
                Some(format!("delete security group {}: {}", name, err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skylift_cloud::{default_worker_rules, MockCloud};

    fn params(name: &str) -> NodeParams {
        NodeParams {
            name: name.to_string(),
            resource_group: "rg".to_string(),
            region: "westeurope".to_string(),
            vnet_resource_group: "rg".to_string(),
            vnet_name: "vnet".to_string(),
            subnet_name: "subnet".to_string(),
            ssh_key_name: "ops-key".to_string(),
            instance_size: "Standard_B2s".to_string(),
            admin_user: "azureuser".to_string(),
            image: OsImage::default(),
            group_name: "demo-sg-worker".to_string(),
            reuse_group: false,
            rules: default_worker_rules("203.0.113.7").unwrap(),
        }
    }

    #[tokio::test]
    async fn test_provision_node_builds_full_chain() {
        let cloud = Arc::new(MockCloud::new());
        let provisioner = NodeProvisioner::new(cloud.clone());

        let outcome = provisioner.provision_node(&params("demo-worker-1")).await;

        assert!(outcome.ok);
        assert!(outcome.address.is_some());
        assert_eq!(cloud.vm_names(), vec!["demo-worker-1"]);
        assert_eq!(cloud.rules_for("demo-sg-worker").len(), 2);

        let ops = cloud.operations();
        let pos = |op: &str| ops.iter().position(|o| o.starts_with(op)).unwrap();
        assert!(pos("ensure_security_group") < pos("get_subnet"));
        assert!(pos("create_public_address") < pos("create_network_interface"));
        assert!(pos("create_network_interface") < pos("create_vm"));
    }

    #[tokio::test]
    async fn test_reused_group_is_resolved_read_only() {
        let cloud = Arc::new(MockCloud::new());
        cloud
            .ensure_security_group("rg", "pre-worker-sg", "westeurope")
            .await
            .unwrap();
        let provisioner = NodeProvisioner::new(cloud.clone());

        let mut p = params("demo-worker-1");
        p.group_name = "pre-worker-sg".to_string();
        p.reuse_group = true;
        p.rules = Vec::new();
        let outcome = provisioner.provision_node(&p).await;

        assert!(outcome.ok);
        // The caller's group was looked up, never re-issued or re-ruled.
        let ops = cloud.operations();
        assert_eq!(
            ops.iter().filter(|o| o.starts_with("ensure_security_group")).count(),
            1 // the seeding call above
        );
        assert!(ops.iter().any(|o| o == "get_security_group pre-worker-sg"));
        assert!(cloud.rules_for("pre-worker-sg").is_empty());
    }

    #[tokio::test]
    async fn test_rule_failure_is_not_fatal() {
        let cloud = Arc::new(MockCloud::new());
        cloud.fail_rule_apply_for("AllowWorkerUi");
        let provisioner = NodeProvisioner::new(cloud.clone());

        let outcome = provisioner.provision_node(&params("demo-worker-1")).await;

        assert!(outcome.ok);
        // The failing rule is skipped; the node is still built.
        assert_eq!(cloud.rules_for("demo-sg-worker").len(), 1);
        assert_eq!(cloud.vm_names(), vec!["demo-worker-1"]);
    }

    #[tokio::test]
    async fn test_batch_reports_every_sibling() {
        let cloud = Arc::new(MockCloud::new());
        cloud.fail_vm_create_for("demo-worker-2");
        let provisioner = NodeProvisioner::new(cloud.clone());

        let batch = vec![
            params("demo-worker-1"),
            params("demo-worker-2"),
            params("demo-worker-3"),
        ];
        let (ok, outcomes) = provisioner.provision_workers(batch).await;

        assert!(!ok);
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| !o.ok).count(), 1);
        assert!(!outcomes[1].ok);
        assert_eq!(outcomes[1].name, "demo-worker-2");
        // Siblings were not cancelled by the failure.
        assert_eq!(cloud.vm_names(), vec!["demo-worker-1", "demo-worker-3"]);
    }

    #[tokio::test]
    async fn test_teardown_releases_everything_in_order() {
        let cloud = Arc::new(MockCloud::new());
        let provisioner = NodeProvisioner::new(cloud.clone());
        provisioner.provision_node(&params("demo-worker-1")).await;

        let failures = provisioner
            .teardown_node("rg", "demo-worker-1", &HashSet::new())
            .await;

        assert!(failures.is_empty());
        assert!(cloud.vm_names().is_empty());
        assert!(cloud.security_group_names().is_empty());

        let ops = cloud.operations();
        let pos = |op: &str| ops.iter().rposition(|o| o.starts_with(op)).unwrap();
        assert!(pos("power_off_vm") < pos("delete_vm"));
        assert!(pos("delete_vm") < pos("delete_network_interface"));
        assert!(pos("delete_network_interface") < pos("delete_disk"));
        assert!(pos("delete_disk") < pos("delete_public_address"));
        assert!(pos("delete_public_address") < pos("delete_security_group"));
    }

    #[tokio::test]
    async fn test_teardown_retains_listed_groups() {
        let cloud = Arc::new(MockCloud::new());
        let provisioner = NodeProvisioner::new(cloud.clone());
        provisioner.provision_node(&params("demo-worker-1")).await;

        let retained: HashSet<String> = ["demo-sg-worker".to_string()].into();
        let failures = provisioner
            .teardown_node("rg", "demo-worker-1", &retained)
            .await;

        assert!(failures.is_empty());
        assert_eq!(cloud.security_group_names(), vec!["demo-sg-worker"]);
    }

    #[tokio::test]
    async fn test_teardown_continues_past_power_off_failure() {
        let cloud = Arc::new(MockCloud::new());
        cloud.fail_power_off_for("demo-worker-1");
        let provisioner = NodeProvisioner::new(cloud.clone());
        provisioner.provision_node(&params("demo-worker-1")).await;

        let failures = provisioner
            .teardown_node("rg", "demo-worker-1", &HashSet::new())
            .await;

        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("power off"));
        assert!(cloud.vm_names().is_empty());
    }
}
