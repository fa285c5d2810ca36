//! Ephemeral keyed flow store.
//!
//! Pending authorizations and minted codes live here. Single-use semantics
//! rest entirely on the store's atomicity: create-only `put` guards against
//! key collision, and `delete` reports whether *this* call removed the key,
//! so two concurrent redemptions of one code resolve without any
//! application-level locking.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::StorageError;

/// Atomic keyed storage with TTL.
///
/// Values expire after their TTL and are then indistinguishable from
/// never-written keys. All cross-step coordination of the redirect flow
/// goes through this trait so any step can be served by any process
/// instance.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Stores `value` under `key` with the given TTL.
    ///
    /// With `create_only` set, the write fails with
    /// [`StorageError::AlreadyExists`] if the key is live. All stage 1-2
    /// writes of fresh keys use create-only mode.
    async fn put(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
        create_only: bool,
    ) -> Result<(), StorageError>;

    /// Returns the live value under `key`, or `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Deletes `key`. Idempotent; returns `true` only if this call removed
    /// a live key. Exactly one of any set of concurrent deletes for the
    /// same key observes `true`.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}
