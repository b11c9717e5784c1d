//! Hostname derivation and idempotent record publishing.

use std::sync::Arc;

use tracing::{info, warn};

use skylift_topology::{NodeRecord, NodeRole};

use crate::api::{DnsApi, DnsError, DnsRecord, RecordSpec};

/// Fully qualified hostname for a node under the cluster's zone.
///
/// The coordinator publishes as `{pattern}.driver.{zone}`; worker N as
/// `{pattern}.worker.{N}.{zone}`.
pub fn node_hostname(pattern: &str, zone: &str, node: &NodeRecord) -> Option<String> {
    match node.role {
        NodeRole::Coordinator => Some(format!("{pattern}.driver.{zone}")),
        NodeRole::Worker => {
            let index = node.worker_index()?;
            Some(format!("{pattern}.worker.{index}.{zone}"))
        }
    }
}

/// Publishes node A records through a provider API.
pub struct DnsPublisher {
    api: Arc<dyn DnsApi>,
    pattern: String,
    zone: String,
}

impl DnsPublisher {
    pub fn new(api: Arc<dyn DnsApi>, pattern: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            api,
            pattern: pattern.into(),
            zone: zone.into(),
        }
    }

    /// Create or update a single A record so that `name` resolves to `address`.
    ///
    /// If a record with the same name and type already exists, the first match
    /// is updated in place; otherwise a new record is created. Running this
    /// twice with the same inputs converges to the same zone contents.
    pub async fn upsert_address(&self, name: &str, address: &str) -> Result<DnsRecord, DnsError> {
        let spec = RecordSpec::address(name, address);
        let existing = self.api.list_records(name, "A").await?;

        let record = match existing.first() {
            Some(current) => {
                info!(name = %name, address = %address, id = %current.id, "Updating DNS record");
                self.api.update_record(&current.id, &spec).await?
            }
            None => {
                info!(name = %name, address = %address, "Creating DNS record");
                self.api.create_record(&spec).await?
            }
        };
        Ok(record)
    }

    /// Publish records for every node, returning the upserted records.
    ///
    /// Workers whose names do not carry a trailing index cannot be mapped to a
    /// hostname and are skipped with a warning.
    pub async fn publish(&self, nodes: &[NodeRecord]) -> Result<Vec<DnsRecord>, DnsError> {
        let mut published = Vec::with_capacity(nodes.len());
        for node in nodes {
            let Some(name) = node_hostname(&self.pattern, &self.zone, node) else {
                warn!(node = %node.name, "Node has no derivable hostname, skipping DNS record");
                continue;
            };
            let record = self.upsert_address(&name, &node.address.to_string()).await?;
            published.push(record);
        }
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDns;

    fn node(name: &str, address: &str, role: NodeRole) -> NodeRecord {
        NodeRecord {
            name: name.to_string(),
            address: address.parse().unwrap(),
            user: "ubuntu".to_string(),
            role,
        }
    }

    #[tokio::test]
    async fn test_publish_creates_records_for_all_nodes() {
        let api = Arc::new(MockDns::new());
        let publisher = DnsPublisher::new(api.clone(), "demo", "example.com");

        let nodes = vec![
            node("demo-master", "203.0.113.1", NodeRole::Coordinator),
            node("demo-worker-1", "203.0.113.2", NodeRole::Worker),
            node("demo-worker-2", "203.0.113.3", NodeRole::Worker),
        ];

        let published = publisher.publish(&nodes).await.unwrap();
        assert_eq!(published.len(), 3);

        assert_eq!(
            api.content_of("demo.driver.example.com").as_deref(),
            Some("203.0.113.1")
        );
        assert_eq!(
            api.content_of("demo.worker.1.example.com").as_deref(),
            Some("203.0.113.2")
        );
        assert_eq!(
            api.content_of("demo.worker.2.example.com").as_deref(),
            Some("203.0.113.3")
        );
    }

    #[tokio::test]
    async fn test_publish_twice_updates_in_place() {
        let api = Arc::new(MockDns::new());
        let publisher = DnsPublisher::new(api.clone(), "demo", "example.com");

        publisher
            .upsert_address("demo.driver.example.com", "203.0.113.1")
            .await
            .unwrap();
        publisher
            .upsert_address("demo.driver.example.com", "203.0.113.99")
            .await
            .unwrap();

        assert_eq!(api.record_count(), 1);
        assert_eq!(
            api.content_of("demo.driver.example.com").as_deref(),
            Some("203.0.113.99")
        );
    }

    #[tokio::test]
    async fn test_records_are_unproxied_with_short_ttl() {
        let api = Arc::new(MockDns::new());
        let publisher = DnsPublisher::new(api.clone(), "demo", "example.com");

        let record = publisher
            .upsert_address("demo.driver.example.com", "203.0.113.1")
            .await
            .unwrap();

        assert_eq!(record.ttl, 120);
        assert!(!record.proxied);
        assert_eq!(record.record_type, "A");
    }

    #[tokio::test]
    async fn test_worker_without_index_is_skipped() {
        let api = Arc::new(MockDns::new());
        let publisher = DnsPublisher::new(api.clone(), "demo", "example.com");

        let nodes = vec![node("stray", "203.0.113.5", NodeRole::Worker)];
        let published = publisher.publish(&nodes).await.unwrap();

        assert!(published.is_empty());
        assert_eq!(api.record_count(), 0);
    }
}
