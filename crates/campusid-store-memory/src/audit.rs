//! Recording audit sink.

use async_trait::async_trait;
use tokio::sync::Mutex;

use campusid_auth::audit::{AuditRecord, AuditSink};
use campusid_auth::storage::StorageError;

/// Audit sink that keeps every record in memory.
///
/// Useful in tests asserting on issuance/usage events and in development
/// servers that dump the trail on shutdown.
#[derive(Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the recorded events.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    /// Drops all recorded events.
    pub async fn clear(&self) {
        self.records.lock().await.clear();
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), StorageError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_records_accumulate() {
        let sink = RecordingAuditSink::new();
        sink.record(AuditRecord::Issuance {
            request_id: Uuid::new_v4(),
            client_id: "grade-sync".to_string(),
            token_id: "jti-1".to_string(),
            claims: Map::new(),
            at: OffsetDateTime::now_utc(),
        })
        .await
        .unwrap();

        assert_eq!(sink.records().await.len(), 1);
        sink.clear().await;
        assert!(sink.records().await.is_empty());
    }
}
