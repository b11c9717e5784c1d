//! Whole-cluster lifecycle operations.
//!
//! `ClusterOrchestrator` drives a cluster through its life: create the
//! resources, persist the topology, configure and start the nodes, publish
//! their records, and eventually sweep everything away. Each operation loads
//! the persisted topology as its source of truth; a terminal failure aborts
//! the remaining steps of that operation and nothing is rolled back
//! automatically.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use skylift_cloud::{
    default_coordinator_rules, default_worker_rules, CloudApi, CloudError, FirewallRule,
};
use skylift_dns::{DnsApi, DnsPublisher};
use skylift_remote::RemoteConfigurator;
use skylift_topology::{
    ClusterTopology, GroupScope, NodeRecord, NodeRole, SecurityGroupRecord, TopologyStore,
};

use crate::error::ClusterError;
use crate::provision::{NodeOutcome, NodeParams, NodeProvisioner};
use crate::spec::ClusterSpec;

/// Pauses between orchestrated phases, giving freshly booted nodes time to
/// finish cloud-init and service daemons time to bind.
#[derive(Debug, Clone, Copy)]
pub struct SettleDelays {
    pub after_create: Duration,
    pub after_install: Duration,
    pub after_start: Duration,
    pub after_publish: Duration,
}

impl Default for SettleDelays {
    fn default() -> Self {
        Self {
            after_create: Duration::from_secs(60),
            after_install: Duration::from_secs(15),
            after_start: Duration::from_secs(15),
            after_publish: Duration::from_secs(15),
        }
    }
}

impl SettleDelays {
    /// No pauses. Used by tests.
    pub fn zero() -> Self {
        Self {
            after_create: Duration::ZERO,
            after_install: Duration::ZERO,
            after_start: Duration::ZERO,
            after_publish: Duration::ZERO,
        }
    }
}

/// Per-node outcomes of a create.
#[derive(Debug)]
pub struct CreateReport {
    pub coordinator: NodeOutcome,
    pub workers: Vec<NodeOutcome>,
}

impl CreateReport {
    /// True iff the coordinator and every worker provisioned successfully.
    pub fn ok(&self) -> bool {
        self.coordinator.ok && self.workers.iter().all(|w| w.ok)
    }
}

/// Drives cluster lifecycle operations over the collaborator seams.
pub struct ClusterOrchestrator {
    cloud: Arc<dyn CloudApi>,
    provisioner: NodeProvisioner,
    store: Arc<dyn TopologyStore>,
    configurator: RemoteConfigurator,
    dns: Arc<dyn DnsApi>,
    delays: SettleDelays,
}

impl ClusterOrchestrator {
    pub fn new(
        cloud: Arc<dyn CloudApi>,
        store: Arc<dyn TopologyStore>,
        configurator: RemoteConfigurator,
        dns: Arc<dyn DnsApi>,
    ) -> Self {
        let provisioner = NodeProvisioner::new(Arc::clone(&cloud));
        Self {
            cloud,
            provisioner,
            store,
            configurator,
            dns,
            delays: SettleDelays::default(),
        }
    }

    /// Override the inter-phase settle delays.
    pub fn with_delays(mut self, delays: SettleDelays) -> Self {
        self.delays = delays;
        self
    }

    /// Create the cluster: coordinator first, then workers, then persist.
    ///
    /// Only successfully provisioned nodes are persisted, so every later
    /// operation works against nodes that actually exist. A failed
    /// coordinator aborts before any worker is attempted; failed workers are
    /// reported but do not undo their successful siblings.
    pub async fn create(&self, spec: &ClusterSpec) -> Result<CreateReport, ClusterError> {
        spec.validate()?;

        // Reused groups belong to the caller: they must resolve before any
        // resource is created in them, and their rules are left untouched.
        // Default rules attach only to freshly synthesized groups.
        let (coordinator_rules, worker_rules) = if spec.reuses_groups() {
            self.cloud
                .get_security_group(&spec.resource_group, &spec.coordinator_group_name())
                .await?;
            self.cloud
                .get_security_group(&spec.resource_group, &spec.worker_group_name())
                .await?;
            (Vec::new(), Vec::new())
        } else {
            let coordinator_rules = match &spec.coordinator_rules {
                Some(rules) => rules.clone(),
                None => default_coordinator_rules(&spec.caller_ip)?,
            };
            let worker_rules = match &spec.worker_rules {
                Some(rules) => rules.clone(),
                None => default_worker_rules(&spec.caller_ip)?,
            };
            (coordinator_rules, worker_rules)
        };

        info!(cluster = %spec.name, workers = spec.worker_count, "Creating cluster");

        let coordinator = self
            .provisioner
            .provision_node(&self.node_params(
                spec,
                spec.coordinator_name(),
                spec.coordinator_group_name(),
                coordinator_rules,
                spec.coordinator_size.clone(),
                spec.coordinator_user.clone(),
            ))
            .await;

        if !coordinator.ok {
            error!(cluster = %spec.name, "Coordinator failed, aborting before workers");
            return Ok(CreateReport {
                coordinator,
                workers: Vec::new(),
            });
        }

        let worker_batch: Vec<NodeParams> = (1..=spec.worker_count)
            .map(|index| {
                self.node_params(
                    spec,
                    spec.worker_name(index),
                    spec.worker_group_name(),
                    worker_rules.clone(),
                    spec.worker_size().to_string(),
                    spec.worker_user().to_string(),
                )
            })
            .collect();
        let (workers_ok, workers) = self.provisioner.provision_workers(worker_batch).await;
        if !workers_ok {
            warn!(
                cluster = %spec.name,
                failed = workers.iter().filter(|w| !w.ok).count(),
                "Some workers failed to provision"
            );
        }

        let topology = self.topology_from(spec, &coordinator, &workers);
        self.store.save(&topology)?;
        info!(
            cluster = %spec.name,
            nodes = topology.nodes.len(),
            "Topology persisted"
        );

        Ok(CreateReport {
            coordinator,
            workers,
        })
    }

    /// Tear down every recorded node and group, then clear the snapshot.
    ///
    /// Sub-step failures are accumulated, never fatal: one stuck VM must not
    /// leave the rest of the cluster billed forever. The snapshot is cleared
    /// even when failures occurred, and they are reported at the end.
    pub async fn delete(&self, spec: &ClusterSpec) -> Result<(), ClusterError> {
        let topology = self.store.load()?;
        info!(
            cluster = %spec.name,
            nodes = topology.nodes.len(),
            "Deleting cluster"
        );

        // Groups are shared across nodes; retain them during per-node
        // teardown and sweep them exactly once afterwards.
        let retained: HashSet<String> = topology
            .security_groups
            .iter()
            .map(|g| g.name.clone())
            .collect();

        let mut failures = Vec::new();
        for node in &topology.nodes {
            failures.extend(
                self.provisioner
                    .teardown_node(&spec.resource_group, &node.name, &retained)
                    .await,
            );
        }
        for group in &topology.security_groups {
            if let Some(failure) = self
                .provisioner
                .teardown_security_group(&spec.resource_group, &group.name)
                .await
            {
                failures.push(failure);
            }
        }

        self.store.clear()?;

        if failures.is_empty() {
            info!(cluster = %spec.name, "Cluster deleted");
            Ok(())
        } else {
            Err(ClusterError::PartialTeardown(failures))
        }
    }

    /// Template and run the install scripts on every node.
    pub async fn install_dependencies(
        &self,
        spec: &ClusterSpec,
        scripts_dir: &Path,
        zone: &str,
        pattern: &str,
    ) -> Result<(), ClusterError> {
        let topology = self.store.load()?;
        for node in &topology.nodes {
            let private = self
                .cloud
                .get_private_address(&spec.resource_group, &node.name)
                .await?;
            self.configurator
                .install_dependencies(node, private, scripts_dir, zone, pattern)
                .await?;
        }
        Ok(())
    }

    /// Start the coordinator, then join every worker to it.
    pub async fn start(&self, spec: &ClusterSpec) -> Result<(), ClusterError> {
        let topology = self.store.load()?;
        let coordinator = topology.coordinator().ok_or_else(|| {
            ClusterError::Configuration("topology has no coordinator record".to_string())
        })?;

        // Workers join over the private network, not the public address.
        let coordinator_private = self
            .cloud
            .get_private_address(&spec.resource_group, &coordinator.name)
            .await?;

        self.configurator.start_coordinator(coordinator).await?;
        for worker in topology.workers() {
            self.configurator
                .start_worker(worker, coordinator_private)
                .await?;
        }
        info!(cluster = %spec.name, "Cluster services started");
        Ok(())
    }

    /// Publish an A record for every node under the zone.
    pub async fn publish_dns(&self, pattern: &str, zone: &str) -> Result<(), ClusterError> {
        let topology = self.store.load()?;
        let publisher = DnsPublisher::new(Arc::clone(&self.dns), pattern, zone);
        let published = publisher.publish(&topology.nodes).await?;
        info!(records = published.len(), zone = %zone, "DNS records published");
        Ok(())
    }

    /// Install the devops credential on every node.
    pub async fn configure_devops(&self, devops_key: &Path) -> Result<(), ClusterError> {
        let topology = self.store.load()?;
        for node in &topology.nodes {
            self.configurator
                .inject_devops_credential(node, devops_key)
                .await?;
        }
        Ok(())
    }

    /// Run the full pipeline: create, install, start, publish, devops.
    ///
    /// Any phase failure aborts the remaining phases.
    pub async fn orchestrate_all(
        &self,
        spec: &ClusterSpec,
        scripts_dir: &Path,
        zone: &str,
        pattern: &str,
        devops_key: &Path,
    ) -> Result<(), ClusterError> {
        let report = self.create(spec).await?;
        if !report.ok() {
            return Err(ClusterError::Provisioning(CloudError::operation(
                "create",
                &spec.name,
                "one or more nodes failed to provision",
            )));
        }
        tokio::time::sleep(self.delays.after_create).await;

        self.install_dependencies(spec, scripts_dir, zone, pattern)
            .await?;
        tokio::time::sleep(self.delays.after_install).await;

        self.start(spec).await?;
        tokio::time::sleep(self.delays.after_start).await;

        self.publish_dns(pattern, zone).await?;
        tokio::time::sleep(self.delays.after_publish).await;

        self.configure_devops(devops_key).await?;
        info!(cluster = %spec.name, "Cluster fully orchestrated");
        Ok(())
    }

    fn node_params(
        &self,
        spec: &ClusterSpec,
        name: String,
        group_name: String,
        rules: Vec<FirewallRule>,
        instance_size: String,
        admin_user: String,
    ) -> NodeParams {
        NodeParams {
            name,
            resource_group: spec.resource_group.clone(),
            region: spec.region.clone(),
            vnet_resource_group: spec.vnet_resource_group().to_string(),
            vnet_name: spec.vnet_name.clone(),
            subnet_name: spec.subnet_name.clone(),
            ssh_key_name: spec.ssh_key_name.clone(),
            instance_size,
            admin_user,
            image: spec.image.clone(),
            group_name,
            reuse_group: spec.reuses_groups(),
            rules,
        }
    }

    fn topology_from(
        &self,
        spec: &ClusterSpec,
        coordinator: &NodeOutcome,
        workers: &[NodeOutcome],
    ) -> ClusterTopology {
        let mut nodes = Vec::new();
        if let (true, Some(address)) = (coordinator.ok, coordinator.address) {
            nodes.push(NodeRecord {
                name: coordinator.name.clone(),
                address,
                user: spec.coordinator_user.clone(),
                role: NodeRole::Coordinator,
            });
        }
        for worker in workers {
            if let (true, Some(address)) = (worker.ok, worker.address) {
                nodes.push(NodeRecord {
                    name: worker.name.clone(),
                    address,
                    user: spec.worker_user().to_string(),
                    role: NodeRole::Worker,
                });
            }
        }

        ClusterTopology {
            nodes,
            security_groups: vec![
                SecurityGroupRecord {
                    name: spec.coordinator_group_name(),
                    scope: GroupScope::CoordinatorGroup,
                },
                SecurityGroupRecord {
                    name: spec.worker_group_name(),
                    scope: GroupScope::WorkerGroup,
                },
            ],
        }
    }
}
