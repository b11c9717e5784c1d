//! In-memory DNS provider for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::api::{DnsApi, DnsError, DnsRecord, RecordSpec};

#[derive(Default)]
struct State {
    records: Vec<DnsRecord>,
    next_id: u64,
    fail_creates: bool,
}

/// Mock provider keeping records in a Vec.
#[derive(Default)]
pub struct MockDns {
    state: Mutex<State>,
}

impl MockDns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every create call fail.
    pub fn fail_creates(&self) {
        self.state.lock().unwrap().fail_creates = true;
    }

    /// Content of the record with the given name, if any.
    pub fn content_of(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.content.clone())
    }

    /// Total number of records in the zone.
    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }
}

#[async_trait]
impl DnsApi for MockDns {
    async fn list_records(
        &self,
        name: &str,
        record_type: &str,
    ) -> Result<Vec<DnsRecord>, DnsError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .records
            .iter()
            .filter(|r| r.name == name && r.record_type == record_type)
            .cloned()
            .collect())
    }

    async fn create_record(&self, spec: &RecordSpec) -> Result<DnsRecord, DnsError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_creates {
            return Err(DnsError::Rejected {
                op: "create",
                name: spec.name.clone(),
                message: "[MOCK] create disabled".to_string(),
            });
        }

        state.next_id += 1;
        let record = DnsRecord {
            id: format!("rec-{}", state.next_id),
            name: spec.name.clone(),
            record_type: spec.record_type.clone(),
            content: spec.content.clone(),
            ttl: spec.ttl,
            proxied: spec.proxied,
        };
        debug!(name = %record.name, id = %record.id, "[MOCK] created DNS record");
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update_record(&self, id: &str, spec: &RecordSpec) -> Result<DnsRecord, DnsError> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| DnsError::Rejected {
                op: "update",
                name: spec.name.clone(),
                message: format!("[MOCK] no record with id {id}"),
            })?;

        record.name = spec.name.clone();
        record.content = spec.content.clone();
        record.ttl = spec.ttl;
        record.proxied = spec.proxied;
        Ok(record.clone())
    }
}
