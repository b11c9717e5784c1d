//! Production `CloudApi` backed by the Azure CLI.
//!
//! Every operation shells out to `az`, which owns authentication (use
//! `az login` beforehand) and long-running-operation polling, so each call
//! here returns only once the resource change has completed. Resource ids
//! are extracted with `--query`/tsv output; richer shapes are read as JSON.
//!
//! Field casing in `az` JSON output has shifted between CLI versions
//! (`privateIPAddress` vs `privateIpAddress`), so lookups try both.

use std::net::IpAddr;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::api::{
    CloudApi, CloudError, NicInfo, PublicAddress, SshKey, VmDescription, VmRequest,
};
use crate::rules::FirewallRule;

/// `CloudApi` implementation shelling out to the `az` binary.
pub struct AzCliCloud {
    binary: String,
}

impl AzCliCloud {
    pub fn new() -> Self {
        Self {
            binary: "az".to_string(),
        }
    }

    /// Use a different binary path, e.g. for a pinned CLI install.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, op: &'static str, name: &str, args: &[&str]) -> Result<String, CloudError> {
        debug!(op = op, name = %name, "Invoking az");

        let output = Command::new(&self.binary)
            .args(args)
            .arg("--only-show-errors")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CloudError::operation(op, name, format!("failed to spawn az: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("ResourceNotFound") || stderr.contains("could not be found") {
                return Err(CloudError::NotFound {
                    kind: op,
                    name: name.to_string(),
                });
            }
            return Err(CloudError::operation(op, name, stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run_json(
        &self,
        op: &'static str,
        name: &str,
        args: &[&str],
    ) -> Result<Value, CloudError> {
        let stdout = self.run(op, name, args).await?;
        serde_json::from_str(&stdout)
            .map_err(|e| CloudError::operation(op, name, format!("unparseable az output: {e}")))
    }
}

impl Default for AzCliCloud {
    fn default() -> Self {
        Self::new()
    }
}

/// Last path segment of an ARM resource id.
fn id_leaf(id: &str) -> String {
    id.rsplit('/').next().unwrap_or(id).to_string()
}

fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(k).and_then(Value::as_str))
}

fn parse_addr(op: &'static str, name: &str, s: &str) -> Result<IpAddr, CloudError> {
    s.parse()
        .map_err(|_| CloudError::operation(op, name, format!("bad address {s:?}")))
}

#[async_trait]
impl CloudApi for AzCliCloud {
    async fn ensure_security_group(
        &self,
        resource_group: &str,
        name: &str,
        region: &str,
    ) -> Result<String, CloudError> {
        let id = self
            .run(
                "ensure_security_group",
                name,
                &[
                    "network", "nsg", "create",
                    "-g", resource_group,
                    "-n", name,
                    "-l", region,
                    "--query", "NewNSG.id",
                    "-o", "tsv",
                ],
            )
            .await?;
        info!(group = %name, "Security group ensured");
        Ok(id)
    }

    async fn get_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<String, CloudError> {
        self.run(
            "get_security_group",
            name,
            &[
                "network", "nsg", "show",
                "-g", resource_group,
                "-n", name,
                "--query", "id",
                "-o", "tsv",
            ],
        )
        .await
    }

    async fn apply_rule(
        &self,
        resource_group: &str,
        group_name: &str,
        rule: &FirewallRule,
    ) -> Result<(), CloudError> {
        let priority = rule.priority.to_string();
        self.run(
            "apply_rule",
            &rule.name,
            &[
                "network", "nsg", "rule", "create",
                "-g", resource_group,
                "--nsg-name", group_name,
                "-n", &rule.name,
                "--priority", &priority,
                "--protocol", rule.protocol.as_str(),
                "--direction", rule.direction.as_str(),
                "--access", rule.access.as_str(),
                "--source-address-prefixes", &rule.source_prefix,
                "--source-port-ranges", &rule.source_port_range,
                "--destination-address-prefixes", &rule.dest_prefix,
                "--destination-port-ranges", &rule.dest_port_range,
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_security_group(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        self.run(
            "delete_security_group",
            name,
            &["network", "nsg", "delete", "-g", resource_group, "-n", name],
        )
        .await?;
        Ok(())
    }

    async fn get_subnet(
        &self,
        vnet_resource_group: &str,
        vnet_name: &str,
        subnet_name: &str,
    ) -> Result<String, CloudError> {
        self.run(
            "get_subnet",
            subnet_name,
            &[
                "network", "vnet", "subnet", "show",
                "-g", vnet_resource_group,
                "--vnet-name", vnet_name,
                "-n", subnet_name,
                "--query", "id",
                "-o", "tsv",
            ],
        )
        .await
    }

    async fn create_public_address(
        &self,
        resource_group: &str,
        name: &str,
        region: &str,
    ) -> Result<PublicAddress, CloudError> {
        let op = "create_public_address";
        let value = self
            .run_json(
                op,
                name,
                &[
                    "network", "public-ip", "create",
                    "-g", resource_group,
                    "-n", name,
                    "-l", region,
                    "--sku", "Standard",
                    "--allocation-method", "Static",
                    "--query", "publicIp",
                    "-o", "json",
                ],
            )
            .await?;

        let id = str_field(&value, &["id"])
            .ok_or_else(|| CloudError::operation(op, name, "missing public address id"))?
            .to_string();
        let address = str_field(&value, &["ipAddress"])
            .ok_or_else(|| CloudError::operation(op, name, "address not yet allocated"))?;

        Ok(PublicAddress {
            id,
            address: parse_addr(op, name, address)?,
        })
    }

    async fn delete_public_address(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        self.run(
            "delete_public_address",
            name,
            &["network", "public-ip", "delete", "-g", resource_group, "-n", name],
        )
        .await?;
        Ok(())
    }

    async fn create_network_interface(
        &self,
        resource_group: &str,
        name: &str,
        region: &str,
        subnet_id: &str,
        public_address_id: &str,
        security_group_id: &str,
    ) -> Result<String, CloudError> {
        self.run(
            "create_network_interface",
            name,
            &[
                "network", "nic", "create",
                "-g", resource_group,
                "-n", name,
                "-l", region,
                "--subnet", subnet_id,
                "--public-ip-address", public_address_id,
                "--network-security-group", security_group_id,
                "--query", "NewNIC.id",
                "-o", "tsv",
            ],
        )
        .await
    }

    async fn get_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<NicInfo, CloudError> {
        let op = "get_network_interface";
        let value = self
            .run_json(
                op,
                name,
                &["network", "nic", "show", "-g", resource_group, "-n", name, "-o", "json"],
            )
            .await?;

        let id = str_field(&value, &["id"])
            .ok_or_else(|| CloudError::operation(op, name, "missing nic id"))?
            .to_string();

        let ip_config = value
            .get("ipConfigurations")
            .and_then(|c| c.get(0))
            .ok_or_else(|| CloudError::operation(op, name, "nic has no ip configuration"))?;
        let private = str_field(ip_config, &["privateIPAddress", "privateIpAddress"])
            .ok_or_else(|| CloudError::operation(op, name, "missing private address"))?;

        let public_address_name = ip_config
            .get("publicIPAddress")
            .or_else(|| ip_config.get("publicIpAddress"))
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
            .map(id_leaf);
        let security_group_name = value
            .get("networkSecurityGroup")
            .and_then(|g| g.get("id"))
            .and_then(Value::as_str)
            .map(id_leaf);

        Ok(NicInfo {
            id,
            name: name.to_string(),
            private_address: parse_addr(op, name, private)?,
            public_address_name,
            security_group_name,
        })
    }

    async fn delete_network_interface(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        self.run(
            "delete_network_interface",
            name,
            &["network", "nic", "delete", "-g", resource_group, "-n", name],
        )
        .await?;
        Ok(())
    }

    async fn get_ssh_key(&self, resource_group: &str, name: &str) -> Result<SshKey, CloudError> {
        let public_key = self
            .run(
                "get_ssh_key",
                name,
                &[
                    "sshkey", "show",
                    "-g", resource_group,
                    "-n", name,
                    "--query", "publicKey",
                    "-o", "tsv",
                ],
            )
            .await?;
        Ok(SshKey {
            name: name.to_string(),
            public_key,
        })
    }

    async fn create_vm(
        &self,
        resource_group: &str,
        request: &VmRequest,
    ) -> Result<(), CloudError> {
        let image = format!(
            "{}:{}:{}:{}",
            request.image.publisher, request.image.offer, request.image.sku, request.image.version
        );
        let os_disk_name = request.os_disk_name();

        self.run(
            "create_vm",
            &request.name,
            &[
                "vm", "create",
                "-g", resource_group,
                "-n", &request.name,
                "-l", &request.region,
                "--image", &image,
                "--size", &request.instance_size,
                "--admin-username", &request.admin_user,
                "--ssh-key-values", &request.ssh_public_key,
                "--nics", &request.nic_id,
                "--os-disk-name", &os_disk_name,
                "--os-disk-size-gb", "32",
                "--storage-sku", "StandardSSD_LRS",
            ],
        )
        .await?;
        info!(vm = %request.name, size = %request.instance_size, "VM created");
        Ok(())
    }

    async fn describe_vm(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<VmDescription, CloudError> {
        let op = "describe_vm";
        let value = self
            .run_json(
                op,
                name,
                &["vm", "show", "-g", resource_group, "-n", name, "-o", "json"],
            )
            .await?;

        let os_disk_name = value
            .get("storageProfile")
            .and_then(|s| s.get("osDisk"))
            .and_then(|d| d.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| CloudError::operation(op, name, "missing os disk name"))?
            .to_string();
        let nic_name = value
            .get("networkProfile")
            .and_then(|n| n.get("networkInterfaces"))
            .and_then(|n| n.get(0))
            .and_then(|n| n.get("id"))
            .and_then(Value::as_str)
            .map(id_leaf)
            .ok_or_else(|| CloudError::operation(op, name, "missing nic reference"))?;

        Ok(VmDescription {
            name: name.to_string(),
            os_disk_name,
            nic_name,
        })
    }

    async fn power_off_vm(&self, resource_group: &str, name: &str) -> Result<(), CloudError> {
        // Deallocate rather than stop so compute billing ends too.
        self.run(
            "power_off_vm",
            name,
            &["vm", "deallocate", "-g", resource_group, "-n", name],
        )
        .await?;
        Ok(())
    }

    async fn delete_vm(&self, resource_group: &str, name: &str) -> Result<(), CloudError> {
        self.run(
            "delete_vm",
            name,
            &["vm", "delete", "-g", resource_group, "-n", name, "--yes"],
        )
        .await?;
        Ok(())
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<(), CloudError> {
        self.run(
            "delete_disk",
            name,
            &["disk", "delete", "-g", resource_group, "-n", name, "--yes"],
        )
        .await?;
        Ok(())
    }

    async fn get_private_address(
        &self,
        resource_group: &str,
        vm_name: &str,
    ) -> Result<IpAddr, CloudError> {
        let op = "get_private_address";
        let address = self
            .run(
                op,
                vm_name,
                &[
                    "vm", "list-ip-addresses",
                    "-g", resource_group,
                    "-n", vm_name,
                    "--query", "[0].virtualMachine.network.privateIpAddresses[0]",
                    "-o", "tsv",
                ],
            )
            .await?;
        if address.is_empty() {
            return Err(CloudError::operation(op, vm_name, "no private address reported"));
        }
        parse_addr(op, vm_name, &address)
    }
}
