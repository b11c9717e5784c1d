//! Provider-neutral DNS record types and the API seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors from DNS provider operations.
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("DNS API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DNS API rejected {op} for {name}: {message}")]
    Rejected {
        op: &'static str,
        name: String,
        message: String,
    },

    #[error("Malformed DNS API response: {0}")]
    Malformed(String),
}

/// An existing record as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

/// A record to create or update.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RecordSpec {
    /// An unproxied A record with the zone-standard TTL, tagged so operators
    /// can tell managed records apart in the zone dashboard.
    pub fn address(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_type: "A".to_string(),
            content: content.into(),
            ttl: 120,
            proxied: false,
            comment: Some("managed by skylift".to_string()),
        }
    }
}

/// DNS provider operations needed for publishing.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// List records matching a fully qualified name and record type.
    async fn list_records(&self, name: &str, record_type: &str)
        -> Result<Vec<DnsRecord>, DnsError>;

    /// Create a new record.
    async fn create_record(&self, spec: &RecordSpec) -> Result<DnsRecord, DnsError>;

    /// Replace an existing record's content in place.
    async fn update_record(&self, id: &str, spec: &RecordSpec) -> Result<DnsRecord, DnsError>;
}
