//! Token audit trail.
//!
//! Disabled by default. When enabled, issuance events snapshot the full
//! claim set and usage events record how a token (or code) fared. An
//! audit-write failure degrades to "unrecorded": it is logged at `warn`
//! and the request proceeds.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::storage::StorageError;

/// An audit event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum AuditRecord {
    /// A token was issued.
    Issuance {
        /// Correlation id of the originating request.
        request_id: Uuid,
        /// Client the token was issued to.
        client_id: String,
        /// Token id (`jti`).
        token_id: String,
        /// Full claim snapshot at issuance.
        claims: Map<String, Value>,
        /// When the event happened.
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
    /// A token or code was presented.
    Usage {
        /// Correlation id of the originating request.
        request_id: Uuid,
        /// Token or code id.
        token_id: String,
        /// "ok" or "rejected".
        status: String,
        /// Error detail for rejected presentations.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Requester IP, when known.
        #[serde(skip_serializing_if = "Option::is_none")]
        remote_addr: Option<IpAddr>,
        /// When the event happened.
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
}

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one event.
    async fn record(&self, record: AuditRecord) -> Result<(), StorageError>;
}

/// Records audit events when auditing is enabled.
pub struct AuditRecorder {
    enabled: bool,
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    /// Creates a recorder. Inert when `config.enabled` is false.
    #[must_use]
    pub fn new(config: &AuditConfig, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            enabled: config.enabled,
            sink,
        }
    }

    /// Records a token issuance.
    pub async fn record_issuance(
        &self,
        request_id: Uuid,
        client_id: &str,
        token_id: &str,
        claims: &Map<String, Value>,
    ) {
        if !self.enabled {
            return;
        }
        self.write(AuditRecord::Issuance {
            request_id,
            client_id: client_id.to_string(),
            token_id: token_id.to_string(),
            claims: claims.clone(),
            at: OffsetDateTime::now_utc(),
        })
        .await;
    }

    /// Records a token or code presentation.
    pub async fn record_usage(
        &self,
        request_id: Uuid,
        token_id: &str,
        status: &str,
        error: Option<&str>,
        remote_addr: Option<IpAddr>,
    ) {
        if !self.enabled {
            return;
        }
        self.write(AuditRecord::Usage {
            request_id,
            token_id: token_id.to_string(),
            status: status.to_string(),
            error: error.map(str::to_string),
            remote_addr,
            at: OffsetDateTime::now_utc(),
        })
        .await;
    }

    async fn write(&self, record: AuditRecord) {
        if let Err(e) = self.sink.record(record).await {
            tracing::warn!(error = %e, "audit write failed, event unrecorded");
        }
    }
}
