//! Cloudflare DNS records API client.
//!
//! Speaks the `/zones/{zone_id}/dns_records` endpoints with a bearer token.
//! Every response carries a `success` flag and an `errors` array alongside
//! `result`; a `success: false` body is surfaced as [`DnsError::Rejected`]
//! even when the HTTP status is 2xx.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::api::{DnsApi, DnsError, DnsRecord, RecordSpec};

const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Cloudflare API client scoped to a single zone.
pub struct CloudflareApi {
    client: reqwest::Client,
    base_url: String,
    zone_id: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

impl CloudflareApi {
    pub fn new(zone_id: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, zone_id, api_token)
    }

    /// Point the client at a different endpoint. Used by tests.
    pub fn with_base_url(
        base_url: impl Into<String>,
        zone_id: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            zone_id: zone_id.into(),
            api_token: api_token.into(),
        }
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, self.zone_id)
    }

    fn unwrap_envelope<T>(
        envelope: Envelope<T>,
        op: &'static str,
        name: &str,
    ) -> Result<T, DnsError> {
        if !envelope.success {
            let message = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(DnsError::Rejected {
                op,
                name: name.to_string(),
                message,
            });
        }
        envelope
            .result
            .ok_or_else(|| DnsError::Malformed(format!("{op} response missing result")))
    }
}

#[async_trait]
impl DnsApi for CloudflareApi {
    async fn list_records(
        &self,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<DnsRecord>, DnsError> {
        debug!(name = %name, record_type = %record_type, "Listing DNS records");

        let response = self
            .client
            .get(self.records_url())
            .bearer_auth(&self.api_token)
            .query(&[("name", name), ("type", record_type)])
            .send()
            .await?;

        let envelope: Envelope<Vec<DnsRecord>> = response.json().await?;
        Self::unwrap_envelope(envelope, "list", name)
    }

    async fn create_record(&self, spec: &RecordSpec) -> Result<DnsRecord, DnsError> {
        debug!(name = %spec.name, content = %spec.content, "Creating DNS record");

        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(spec)
            .send()
            .await?;

        let envelope: Envelope<DnsRecord> = response.json().await?;
        Self::unwrap_envelope(envelope, "create", &spec.name)
    }

    async fn update_record(&self, id: &str, spec: &RecordSpec) -> Result<DnsRecord, DnsError> {
        debug!(id = %id, name = %spec.name, content = %spec.content, "Updating DNS record");

        let url = format!("{}/{}", self.records_url(), id);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(spec)
            .send()
            .await?;

        let envelope: Envelope<DnsRecord> = response.json().await?;
        Self::unwrap_envelope(envelope, "update", &spec.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record_json(id: &str, name: &str, content: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "type": "A",
            "content": content,
            "ttl": 120,
            "proxied": false
        })
    }

    #[tokio::test]
    async fn test_list_records_sends_token_and_filters() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/zones/zone123/dns_records"))
            .and(query_param("name", "cluster.driver.example.com"))
            .and(query_param("type", "A"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "errors": [],
                "result": [record_json("rec1", "cluster.driver.example.com", "203.0.113.9")]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = CloudflareApi::with_base_url(server.uri(), "zone123", "tok");
        let records = api
            .list_records("cluster.driver.example.com", "A")
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "rec1");
        assert_eq!(records[0].content, "203.0.113.9");
    }

    #[tokio::test]
    async fn test_create_record_posts_spec() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/zones/zone123/dns_records"))
            .and(body_partial_json(json!({
                "name": "cluster.worker.1.example.com",
                "type": "A",
                "content": "203.0.113.10",
                "ttl": 120,
                "proxied": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "errors": [],
                "result": record_json("rec2", "cluster.worker.1.example.com", "203.0.113.10")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = CloudflareApi::with_base_url(server.uri(), "zone123", "tok");
        let spec = RecordSpec::address("cluster.worker.1.example.com", "203.0.113.10");
        let record = api.create_record(&spec).await.unwrap();

        assert_eq!(record.id, "rec2");
    }

    #[tokio::test]
    async fn test_update_record_puts_to_record_id() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/zones/zone123/dns_records/rec1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "errors": [],
                "result": record_json("rec1", "cluster.driver.example.com", "203.0.113.77")
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = CloudflareApi::with_base_url(server.uri(), "zone123", "tok");
        let spec = RecordSpec::address("cluster.driver.example.com", "203.0.113.77");
        let record = api.update_record("rec1", &spec).await.unwrap();

        assert_eq!(record.content, "203.0.113.77");
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/zones/zone123/dns_records"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": [{"code": 81057, "message": "Record already exists."}],
                "result": null
            })))
            .mount(&server)
            .await;

        let api = CloudflareApi::with_base_url(server.uri(), "zone123", "tok");
        let spec = RecordSpec::address("cluster.driver.example.com", "203.0.113.9");
        let err = api.create_record(&spec).await.unwrap_err();

        match err {
            DnsError::Rejected { op, message, .. } => {
                assert_eq!(op, "create");
                assert!(message.contains("81057"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
