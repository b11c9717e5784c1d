//! In-memory cloud implementation for testing and development.
//!
//! Resolves every lookup against synthesized resources, records created
//! resources, and supports per-resource failure injection so tests can
//! exercise partial-failure paths.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::api::{
    CloudApi, CloudError, NicInfo, PublicAddress, SshKey, VmDescription, VmRequest,
};
use crate::rules::FirewallRule;

#[derive(Default)]
struct State {
    security_groups: HashMap<String, Vec<FirewallRule>>,
    public_addresses: HashMap<String, PublicAddress>,
    nics: HashMap<String, NicInfo>,
    vms: HashMap<String, VmDescription>,
    disks: HashSet<String>,
    address_counter: u8,
    operations: Vec<String>,
}

/// Failure switches, all off by default.
#[derive(Default)]
struct Failures {
    vm_create: HashSet<String>,
    rule_apply: HashSet<String>,
    group_delete: HashSet<String>,
    power_off: HashSet<String>,
    subnet_lookup: bool,
    ssh_key_lookup: bool,
}

/// Mock cloud provider.
pub struct MockCloud {
    state: Mutex<State>,
    failures: Mutex<Failures>,
}

impl MockCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            failures: Mutex::new(Failures::default()),
        }
    }

    /// Make `create_vm` fail for the given VM name.
    pub fn fail_vm_create_for(&self, name: &str) {
        self.failures.lock().unwrap().vm_create.insert(name.to_string());
    }

    /// Make `apply_rule` fail for the given rule name.
    pub fn fail_rule_apply_for(&self, rule_name: &str) {
        self.failures.lock().unwrap().rule_apply.insert(rule_name.to_string());
    }

    /// Make `delete_security_group` fail for the given group name.
    pub fn fail_group_delete_for(&self, name: &str) {
        self.failures.lock().unwrap().group_delete.insert(name.to_string());
    }

    /// Make `power_off_vm` fail for the given VM name.
    pub fn fail_power_off_for(&self, name: &str) {
        self.failures.lock().unwrap().power_off.insert(name.to_string());
    }

    /// Make subnet lookups fail.
    pub fn fail_subnet_lookups(&self) {
        self.failures.lock().unwrap().subnet_lookup = true;
    }

    /// Make SSH key lookups fail.
    pub fn fail_ssh_key_lookups(&self) {
        self.failures.lock().unwrap().ssh_key_lookup = true;
    }

    /// Every operation performed, in order ("create_vm demo-worker-1", ...).
    pub fn operations(&self) -> Vec<String> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Names of security groups currently alive.
    pub fn security_group_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.state.lock().unwrap().security_groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Rules currently applied to a group.
    pub fn rules_for(&self, group_name: &str) -> Vec<FirewallRule> {
        self.state
            .lock()
            .unwrap()
            .security_groups
            .get(group_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Names of VMs currently alive.
    pub fn vm_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().unwrap().vms.keys().cloned().collect();
        names.sort();
        names
    }

    fn record(state: &mut State, op: &str, name: &str) {
        state.operations.push(format!("{} {}", op, name));
    }

    fn next_public_address(state: &mut State) -> IpAddr {
        state.address_counter += 1;
        format!("198.51.100.{}", state.address_counter).parse().unwrap()
    }

    fn next_private_address(state: &mut State) -> IpAddr {
        format!("10.0.0.{}", state.address_counter).parse().unwrap()
    }
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudApi for MockCloud {
    async fn ensure_security_group(
        &self,
        _resource_group: &str,
        name: &str,
        _region: &str,
    ) -> Result<String, CloudError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "ensure_security_group", name);
        state.security_groups.entry(name.to_string()).or_default();
        info!(group = %name, "[MOCK] Security group ensured");
        Ok(format!("sg-id/{}", name))
    }

    async fn get_security_group(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> Result<String, CloudError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "get_security_group", name);
        if state.security_groups.contains_key(name) {
            Ok(format!("sg-id/{}", name))
        } else {
            Err(CloudError::NotFound {
                kind: "security group",
                name: name.to_string(),
            })
        }
    }

    async fn apply_rule(
        &self,
        _resource_group: &str,
        group_name: &str,
        rule: &FirewallRule,
    ) -> Result<(), CloudError> {
        if self.failures.lock().unwrap().rule_apply.contains(&rule.name) {
            return Err(CloudError::operation("apply_rule", &rule.name, "injected failure"));
        }

        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "apply_rule", &rule.name);
        let rules = state
            .security_groups
            .get_mut(group_name)
            .ok_or(CloudError::NotFound {
                kind: "security group",
                name: group_name.to_string(),
            })?;
        rules.retain(|r| r.name != rule.name);
        rules.push(rule.clone());
        debug!(group = %group_name, rule = %rule.name, "[MOCK] Rule applied");
        Ok(())
    }

    async fn delete_security_group(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        if self.failures.lock().unwrap().group_delete.contains(name) {
            return Err(CloudError::operation(
                "delete_security_group",
                name,
                "injected failure",
            ));
        }

        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "delete_security_group", name);
        state.security_groups.remove(name);
        info!(group = %name, "[MOCK] Security group deleted");
        Ok(())
    }

    async fn get_subnet(
        &self,
        _vnet_resource_group: &str,
        vnet_name: &str,
        subnet_name: &str,
    ) -> Result<String, CloudError> {
        if self.failures.lock().unwrap().subnet_lookup {
            return Err(CloudError::NotFound {
                kind: "subnet",
                name: subnet_name.to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "get_subnet", subnet_name);
        Ok(format!("subnet-id/{}/{}", vnet_name, subnet_name))
    }

    async fn create_public_address(
        &self,
        _resource_group: &str,
        name: &str,
        _region: &str,
    ) -> Result<PublicAddress, CloudError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "create_public_address", name);
        let address = PublicAddress {
            id: format!("pip-id/{}", name),
            address: Self::next_public_address(&mut state),
        };
        state.public_addresses.insert(name.to_string(), address.clone());
        Ok(address)
    }

    async fn delete_public_address(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "delete_public_address", name);
        state.public_addresses.remove(name);
        Ok(())
    }

    async fn create_network_interface(
        &self,
        _resource_group: &str,
        name: &str,
        _region: &str,
        _subnet_id: &str,
        public_address_id: &str,
        security_group_id: &str,
    ) -> Result<String, CloudError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "create_network_interface", name);

        let public_address_name = public_address_id.rsplit('/').next().map(str::to_string);
        let security_group_name = security_group_id.rsplit('/').next().map(str::to_string);

        let nic = NicInfo {
            id: format!("nic-id/{}", name),
            name: name.to_string(),
            private_address: Self::next_private_address(&mut state),
            public_address_name,
            security_group_name,
        };
        let id = nic.id.clone();
        state.nics.insert(name.to_string(), nic);
        Ok(id)
    }

    async fn get_network_interface(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> Result<NicInfo, CloudError> {
        let state = self.state.lock().unwrap();
        state.nics.get(name).cloned().ok_or(CloudError::NotFound {
            kind: "network interface",
            name: name.to_string(),
        })
    }

    async fn delete_network_interface(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "delete_network_interface", name);
        state.nics.remove(name);
        Ok(())
    }

    async fn get_ssh_key(&self, _resource_group: &str, name: &str) -> Result<SshKey, CloudError> {
        if self.failures.lock().unwrap().ssh_key_lookup {
            return Err(CloudError::NotFound {
                kind: "ssh key",
                name: name.to_string(),
            });
        }

        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "get_ssh_key", name);
        Ok(SshKey {
            name: name.to_string(),
            public_key: format!("ssh-ed25519 AAAAMOCKKEY {}", name),
        })
    }

    async fn create_vm(
        &self,
        _resource_group: &str,
        request: &VmRequest,
    ) -> Result<(), CloudError> {
        if self.failures.lock().unwrap().vm_create.contains(&request.name) {
            return Err(CloudError::operation("create_vm", &request.name, "injected failure"));
        }

        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "create_vm", &request.name);

        let nic_name = request
            .nic_id
            .rsplit('/')
            .next()
            .unwrap_or(&request.nic_id)
            .to_string();
        let description = VmDescription {
            name: request.name.clone(),
            os_disk_name: request.os_disk_name(),
            nic_name,
        };
        state.disks.insert(description.os_disk_name.clone());
        state.vms.insert(request.name.clone(), description);

        info!(vm = %request.name, size = %request.instance_size, "[MOCK] VM created");
        Ok(())
    }

    async fn describe_vm(
        &self,
        _resource_group: &str,
        name: &str,
    ) -> Result<VmDescription, CloudError> {
        let state = self.state.lock().unwrap();
        state.vms.get(name).cloned().ok_or(CloudError::NotFound {
            kind: "vm",
            name: name.to_string(),
        })
    }

    async fn power_off_vm(&self, _resource_group: &str, name: &str) -> Result<(), CloudError> {
        if self.failures.lock().unwrap().power_off.contains(name) {
            return Err(CloudError::operation("power_off_vm", name, "injected failure"));
        }

        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "power_off_vm", name);
        if state.vms.contains_key(name) {
            Ok(())
        } else {
            Err(CloudError::NotFound {
                kind: "vm",
                name: name.to_string(),
            })
        }
    }

    async fn delete_vm(&self, _resource_group: &str, name: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "delete_vm", name);
        state.vms.remove(name);
        Ok(())
    }

    async fn delete_disk(&self, _resource_group: &str, name: &str) -> Result<(), CloudError> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "delete_disk", name);
        state.disks.remove(name);
        Ok(())
    }

    async fn get_private_address(
        &self,
        _resource_group: &str,
        vm_name: &str,
    ) -> Result<IpAddr, CloudError> {
        let state = self.state.lock().unwrap();
        let vm = state.vms.get(vm_name).ok_or(CloudError::NotFound {
            kind: "vm",
            name: vm_name.to_string(),
        })?;
        let nic = state.nics.get(&vm.nic_name).ok_or(CloudError::NotFound {
            kind: "network interface",
            name: vm.nic_name.clone(),
        })?;
        Ok(nic.private_address)
    }
}
