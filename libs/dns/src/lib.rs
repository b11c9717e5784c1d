//! DNS record publishing for cluster nodes.
//!
//! Maps provisioned nodes to stable hostnames under a delegated zone and
//! upserts A records through a provider API. The provider seam is the
//! [`DnsApi`] trait; [`CloudflareApi`] is the HTTP implementation and
//! [`MockDns`] the in-memory one for tests.

pub mod api;
pub mod cloudflare;
pub mod mock;
pub mod publish;

pub use api::{DnsApi, DnsError, DnsRecord, RecordSpec};
pub use cloudflare::CloudflareApi;
pub use mock::MockDns;
pub use publish::{node_hostname, DnsPublisher};
